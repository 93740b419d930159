//! Integration tests for mapping passes
//!
//! Covers whole passes through the public API:
//! - Identity resolution and idempotent re-mapping
//! - Declaration order and absent values
//! - Dynamic mapping selection
//! - Forced collection mapping of nested dictionaries
//! - Partial failure isolation


use mapweave_core::{
    AttributeType, AttributeValue, CollectionKind, DynamicMapping, EntityDescription, Error, FetchCache,
    ManagedDataSource, MappedValue, Mapper, MappingConfig, MappingErrorCode, MappingMatcher, MappingOperation,
    MappingsDictionary, ObjectGraph, ObjectMapping, ObjectSerializer, RelationshipValue, Schema,
    TransientDataSource,
};
use mapweave_core::{transformer::built_in, validation};
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// IDENTITY
// ============================================================================

#[test]
fn test_existing_object_updated_in_place() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let existing = graph.insert("User").unwrap();
    graph.set_attribute(existing, "user_id", AttributeValue::Integer(31337)).unwrap();
    graph.set_attribute(existing, "name", "Old Name".into()).unwrap();

    let provider = MappingsDictionary::new().with_root(test_support::identified_user_mapping(&schema));
    let data_source = test_support::managed_data_source();
    let result = test_support::map(&mut graph, &json!({"id": 31337, "name": "Blake"}), &provider, &data_source);

    assert_eq!(result.first_object(), Some(existing));
    assert_eq!(graph.len(), 1);
    assert_eq!(test_support::string_attribute(&graph, existing, "name").as_deref(), Some("Blake"));
}

#[test]
fn test_unseen_identity_allocates_exactly_one_object() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let provider = MappingsDictionary::new().with_key_path("users", test_support::identified_user_mapping(&schema));
    let data_source = test_support::managed_data_source();

    let payload = json!({"users": [{"id": 1, "name": "a"}, {"id": 1, "name": "b"}]});
    let result = test_support::map(&mut graph, &payload, &provider, &data_source);

    assert_eq!(graph.objects_of("User").count(), 1);
    let objects = result.objects();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0], objects[1]);
    assert_eq!(test_support::string_attribute(&graph, objects[0], "name").as_deref(), Some("b"));
}

#[test]
fn test_mapping_twice_is_idempotent() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let provider = MappingsDictionary::new().with_key_path("users", test_support::identified_user_mapping(&schema));
    let data_source = test_support::managed_data_source();
    let payload = json!({"users": [
        {"id": 1, "name": "Blake", "email": "blake@example.com", "age": "30"},
        {"id": 2, "name": "Rachit"}
    ]});

    let first = test_support::map(&mut graph, &payload, &provider, &data_source);
    let after_first: Vec<_> = first.objects().iter().map(|id| test_support::attributes_of(&graph, *id)).collect();
    let second = test_support::map(&mut graph, &payload, &provider, &data_source);
    let after_second: Vec<_> = second.objects().iter().map(|id| test_support::attributes_of(&graph, *id)).collect();

    assert_eq!(first.objects(), second.objects());
    assert_eq!(after_first, after_second);
    assert_eq!(graph.len(), 2);
}

#[test]
fn test_transformed_identity_is_idempotent() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let login = built_in::map_values([("blake", "blake@example.com")], None);
    let user = ObjectMapping::builder("User")
        .attribute_with_transformer("login", "email", login)
        .attribute("name", "name")
        .identification_attributes(["email"])
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(user);
    let data_source = test_support::managed_data_source();
    let payload = json!({"login": "blake", "name": "Blake"});

    let first = test_support::map(&mut graph, &payload, &provider, &data_source);
    let second = test_support::map(&mut graph, &payload, &provider, &data_source);

    assert_eq!(graph.len(), 1);
    assert_eq!(first.first_object(), second.first_object());
    let object = second.first_object().unwrap();
    assert_eq!(
        test_support::string_attribute(&graph, object, "email").as_deref(),
        Some("blake@example.com")
    );
}

#[test]
fn test_rejected_owner_leaves_identified_cat_untouched() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let existing = graph.insert("Cat").unwrap();
    graph.set_attribute(existing, "cat_id", AttributeValue::Integer(4)).unwrap();
    graph.set_attribute(existing, "name", "Asia".into()).unwrap();

    let cat = ObjectMapping::builder("Cat")
        .attribute("id", "cat_id")
        .attribute("name", "name")
        .identification_attributes(["cat_id"])
        .build(&schema)
        .unwrap();
    let user = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .relationship("cats", "cats", cat)
        .validator(validation::required(["name"]))
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(user);
    let data_source = test_support::managed_data_source();

    let result = test_support::map(&mut graph, &json!({"id": 1, "cats": [{"id": 4, "name": "Roy"}]}), &provider, &data_source);

    assert!(result.has_errors());
    assert!(result.first_object().is_none());
    assert_eq!(graph.len(), 1);
    assert_eq!(test_support::string_attribute(&graph, existing, "name").as_deref(), Some("Asia"));
}

#[test]
fn test_nested_identity_shares_objects_across_parents() {
    let schema = test_support::schema();
    let cat = ObjectMapping::builder("Cat")
        .attribute("id", "cat_id")
        .attribute("name", "name")
        .identification_attributes(["cat_id"])
        .build(&schema)
        .unwrap();
    let user = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .relationship("cats", "cats", cat)
        .identification_attributes(["user_id"])
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_key_path("users", user);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();
    let payload = json!({"users": [
        {"id": 1, "cats": [{"id": 10, "name": "Asia"}, {"id": 11, "name": "Roy"}]},
        {"id": 2, "cats": [{"id": 10, "name": "Asia"}]}
    ]});

    let result = test_support::map(&mut graph, &payload, &provider, &data_source);
    assert!(result.errors().is_empty(), "{:?}", result.errors());
    assert_eq!(graph.objects_of("Cat").count(), 2);

    let users = result.objects();
    let first_cats = graph.relationship(users[0], "cats").unwrap().object_ids();
    let second_cats = graph.relationship(users[1], "cats").unwrap().object_ids();
    assert!(first_cats.contains(&second_cats[0]));
}

#[test]
fn test_fetch_cache_backed_identity() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let existing = graph.insert("User").unwrap();
    graph.set_attribute(existing, "user_id", AttributeValue::Integer(5)).unwrap();

    let provider = MappingsDictionary::new().with_root(test_support::identified_user_mapping(&schema));
    let data_source = ManagedDataSource::new(Arc::new(FetchCache::new()));
    let result = test_support::map(&mut graph, &json!({"id": "5", "name": "x"}), &provider, &data_source);
    assert_eq!(result.first_object(), Some(existing));
}

#[test]
fn test_identity_without_cache_is_configuration_error() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let provider = MappingsDictionary::new().with_root(test_support::identified_user_mapping(&schema));
    let data_source = ManagedDataSource::without_cache();
    let config = MappingConfig::default();

    let result = Mapper::new(&json!({"id": 1}), &provider, &data_source, &config).execute(&mut graph);
    assert!(matches!(result, Err(Error::NilIdentityCache { ref entity, .. }) if entity == "User"));
    assert!(graph.is_empty());
}

// ============================================================================
// PROPERTY ORDER AND ABSENT VALUES
// ============================================================================

#[test]
fn test_later_declaration_wins() {
    let schema = test_support::schema();
    let mapping = ObjectMapping::builder("User")
        .attribute("nickname", "name")
        .attribute("full_name", "name")
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let result = test_support::map(
        &mut graph,
        &json!({"full_name": "Blake Watters", "nickname": "blake"}),
        &provider,
        &data_source,
    );
    let user = result.first_object().unwrap();
    assert_eq!(test_support::string_attribute(&graph, user, "name").as_deref(), Some("Blake Watters"));
}

#[test]
fn test_absent_key_preserves_prior_value() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let provider = MappingsDictionary::new().with_root(test_support::identified_user_mapping(&schema));
    let data_source = test_support::managed_data_source();

    let user = test_support::map(
        &mut graph,
        &json!({"id": 1, "name": "Blake", "email": "blake@example.com"}),
        &provider,
        &data_source,
    )
    .first_object()
    .unwrap();
    test_support::map(&mut graph, &json!({"id": 1, "name": "Blake W"}), &provider, &data_source);

    assert_eq!(test_support::string_attribute(&graph, user, "name").as_deref(), Some("Blake W"));
    assert_eq!(
        test_support::string_attribute(&graph, user, "email").as_deref(),
        Some("blake@example.com")
    );
}

#[test]
fn test_explicit_null_clears_value() {
    let schema = test_support::schema();
    let mut graph = ObjectGraph::new(Arc::clone(&schema));
    let provider = MappingsDictionary::new().with_root(test_support::identified_user_mapping(&schema));
    let data_source = test_support::managed_data_source();

    let user = test_support::map(&mut graph, &json!({"id": 1, "email": "x@example.com"}), &provider, &data_source)
        .first_object()
        .unwrap();
    test_support::map(&mut graph, &json!({"id": 1, "email": null}), &provider, &data_source);
    assert_eq!(graph.attribute(user, "email"), Some(&AttributeValue::Null));
}

// ============================================================================
// DYNAMIC MAPPING
// ============================================================================

fn typed_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new()
            .with_entity(EntityDescription::new("A").attribute("value", AttributeType::String))
            .unwrap()
            .with_entity(EntityDescription::new("B").attribute("value", AttributeType::String))
            .unwrap(),
    )
}

#[test]
fn test_dynamic_mapping_selects_by_type() {
    let schema = typed_schema();
    let a = ObjectMapping::builder("A").attribute("value", "value").build(&schema).unwrap();
    let b = ObjectMapping::builder("B").attribute("value", "value").build(&schema).unwrap();
    let dynamic = DynamicMapping::new()
        .matcher(MappingMatcher::key_path("type", "A", a).unwrap())
        .matcher(MappingMatcher::key_path("type", "B", b).unwrap());
    let provider = MappingsDictionary::new().with_key_path("items", dynamic);
    let mut graph = ObjectGraph::new(schema);
    let config = MappingConfig::default();

    let payload = json!({"items": [{"type": "B", "value": "b"}, {"type": "C", "value": "c"}]});
    let result = Mapper::new(&payload, &provider, &TransientDataSource, &config)
        .execute(&mut graph)
        .unwrap();

    assert_eq!(result.count(), 1);
    let mapped = result.first_object().unwrap();
    assert_eq!(graph.record(mapped).unwrap().entity, "B");
    assert_eq!(result.error_count(), 1);
    assert_eq!(result.errors()[0].code, MappingErrorCode::UnableToDetermineMapping);
    assert_eq!(result.errors()[0].key_path.as_deref(), Some("items[1]"));
    assert_eq!(graph.len(), 1);
}

#[test]
fn test_dynamic_pattern_matcher() {
    let schema = typed_schema();
    let a = ObjectMapping::builder("A").attribute("value", "value").build(&schema).unwrap();
    let b = ObjectMapping::builder("B").attribute("value", "value").build(&schema).unwrap();
    let dynamic = DynamicMapping::new()
        .matcher(MappingMatcher::pattern("kind", "^alpha", a).unwrap())
        .matcher(MappingMatcher::predicate(|_| true, b));
    let provider = MappingsDictionary::new().with_root(dynamic);
    let mut graph = ObjectGraph::new(schema);
    let config = MappingConfig::default();

    let payload = json!([{"kind": "alpha-1", "value": "x"}, {"kind": "beta", "value": "y"}]);
    let result = Mapper::new(&payload, &provider, &TransientDataSource, &config)
        .execute(&mut graph)
        .unwrap();
    let entities: Vec<_> = result
        .objects()
        .iter()
        .map(|id| graph.record(*id).unwrap().entity.clone())
        .collect();
    assert_eq!(entities, vec!["A".to_string(), "B".to_string()]);
}

// ============================================================================
// COLLECTION MAPPING
// ============================================================================

#[test]
fn test_force_collection_maps_each_key() {
    let schema = test_support::schema();
    let mapping = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .attribute("email", "email")
        .map_key_of_nested_dictionary_to("name")
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_key_path("users", mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();
    let payload = json!({"users": {
        "blake": {"id": 31337, "email": "blake@example.com"},
        "rachit": {"id": 7, "email": "rachit@example.com"}
    }});

    let result = test_support::map(&mut graph, &payload, &provider, &data_source);

    let Some(MappedValue::Collection(users)) = result.get(Some("users")) else {
        panic!("expected a collection");
    };
    assert_eq!(users.len(), 2);
    assert_eq!(test_support::string_attribute(&graph, users[0], "name").as_deref(), Some("blake"));
    assert_eq!(test_support::string_attribute(&graph, users[1], "name").as_deref(), Some("rachit"));
    assert_eq!(graph.attribute(users[1], "user_id"), Some(&AttributeValue::Integer(7)));
    assert!(graph.attribute(users[0], "blake").is_none());
}

#[test]
fn test_nested_key_used_as_identity() {
    let schema = test_support::schema();
    let mapping = ObjectMapping::builder("User")
        .attribute("email", "email")
        .map_key_of_nested_dictionary_to("name")
        .identification_attributes(["name"])
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_key_path("users", mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    test_support::map(&mut graph, &json!({"users": {"blake": {"email": "a"}}}), &provider, &data_source);
    test_support::map(&mut graph, &json!({"users": {"blake": {"email": "b"}}}), &provider, &data_source);

    let users: Vec<_> = graph.objects_of("User").map(|r| r.id).collect();
    assert_eq!(users.len(), 1);
    assert_eq!(test_support::string_attribute(&graph, users[0], "email").as_deref(), Some("b"));
}

#[test]
fn test_root_key_path_descends() {
    let schema = test_support::schema();
    let mapping = ObjectMapping::builder("User")
        .attribute("name", "name")
        .root_key_path("data.user")
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let result = test_support::map(&mut graph, &json!({"data": {"user": {"name": "Blake"}}}), &provider, &data_source);
    let user = result.first_object().unwrap();
    assert_eq!(test_support::string_attribute(&graph, user, "name").as_deref(), Some("Blake"));
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_partial_failure_isolated_to_one_error() {
    let schema = test_support::schema();
    let mapping = ObjectMapping::builder("User")
        .attribute("birthdate", "birth_date")
        .attribute("name", "name")
        .attribute("age", "age")
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let payload = json!({"birthdate": "not a date", "name": "Blake", "age": 30});
    let result = test_support::map(&mut graph, &payload, &provider, &data_source);

    assert_eq!(result.error_count(), 1);
    assert_eq!(result.errors()[0].code, MappingErrorCode::TypeMismatch);
    assert_eq!(result.errors()[0].key_path.as_deref(), Some("birthdate"));
    assert!(result.is_partial());

    let user = result.first_object().unwrap();
    assert_eq!(test_support::string_attribute(&graph, user, "name").as_deref(), Some("Blake"));
    assert_eq!(graph.attribute(user, "age"), Some(&AttributeValue::Integer(30)));
    assert!(graph.attribute(user, "birth_date").is_none());
}

#[test]
fn test_failed_sibling_does_not_stop_collection() {
    let schema = test_support::schema();
    let mapping = ObjectMapping::builder("User")
        .attribute("name", "name")
        .attribute("age", "age")
        .validator(mapweave_core::validation::required(["name"]))
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_key_path("users", mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let payload = json!({"users": [{"name": "a"}, {"age": 3}, {"name": "c"}]});
    let result = test_support::map(&mut graph, &payload, &provider, &data_source);

    assert_eq!(result.count(), 2);
    assert_eq!(result.error_count(), 1);
    assert_eq!(result.errors()[0].code, MappingErrorCode::ValidationFailure);
    assert_eq!(graph.objects_of("User").count(), 2);
}

#[test]
fn test_scalar_root_is_not_traversable() {
    let schema = test_support::schema();
    let provider = MappingsDictionary::new().with_root(test_support::identified_user_mapping(&schema));
    let mut graph = ObjectGraph::new(schema);
    let config = MappingConfig::default();
    let result = Mapper::new(&json!("hello"), &provider, &TransientDataSource, &config).execute(&mut graph);
    assert!(matches!(result, Err(Error::UnmappableRepresentation { .. })));
}

// ============================================================================
// RELATIONSHIPS AND SERIALIZATION
// ============================================================================

#[test]
fn test_nested_relationships_and_key_path_destinations() {
    let schema = test_support::schema();
    let address = ObjectMapping::builder("Address")
        .attribute("city", "city")
        .build(&schema)
        .unwrap();
    let mapping = ObjectMapping::builder("User")
        .attribute("name", "name")
        .relationship("address", "address", address)
        .attribute("state", "address.state")
        .attribute("interests", "interests")
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let payload = json!({
        "name": "Blake",
        "address": {"city": "Carrboro"},
        "state": "NC",
        "interests": ["Hacking", "Running", "Hacking"]
    });
    let result = test_support::map(&mut graph, &payload, &provider, &data_source);
    assert!(result.errors().is_empty(), "{:?}", result.errors());

    let user = result.first_object().unwrap();
    let Some(RelationshipValue::ToOne(Some(address))) = graph.relationship(user, "address") else {
        panic!("address missing");
    };
    assert_eq!(test_support::string_attribute(&graph, *address, "state").as_deref(), Some("NC"));
    assert_eq!(
        graph.attribute(user, "interests"),
        Some(&AttributeValue::OrderedSet(vec!["Hacking".into(), "Running".into()]))
    );
}

#[test]
fn test_round_trip_through_serializer() {
    let schema = test_support::schema();
    let cat = ObjectMapping::builder("Cat").attribute("name", "name").build(&schema).unwrap();
    let mapping = ObjectMapping::builder("User")
        .attribute("name", "name")
        .attribute("birthdate", "birth_date")
        .relationship("cats", "cats", cat)
        .build(&schema)
        .unwrap();
    let mut graph = ObjectGraph::new(schema);
    let user = graph.insert("User").unwrap();
    let config = MappingConfig::default();
    let payload = json!({"name": "Blake", "birthdate": "1982-11-27T00:00:00Z", "cats": [{"name": "Asia"}]});

    MappingOperation::new(&payload, Some(user), Arc::clone(&mapping), &TransientDataSource, &config)
        .perform(&mut graph)
        .unwrap();
    let serialized = ObjectSerializer::new(&graph, &config).serialize(user, &mapping).unwrap();
    assert_eq!(serialized, payload);
}

#[test]
fn test_independent_passes_on_separate_threads() {
    let schema = test_support::schema();
    let provider = Arc::new(MappingsDictionary::new().with_key_path("users", test_support::identified_user_mapping(&schema)));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let schema = Arc::clone(&schema);
            let provider = Arc::clone(&provider);
            std::thread::spawn(move || {
                let mut graph = ObjectGraph::new(schema);
                let data_source = test_support::managed_data_source();
                let users: Vec<_> = (0..10).map(|i| json!({"id": t * 100 + i, "name": "x"})).collect();
                let payload = json!({ "users": users });
                test_support::map(&mut graph, &payload, provider.as_ref(), &data_source).count()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 10);
    }
}

#[test]
fn test_ordered_collections_keep_representation_order() {
    let schema = test_support::schema();
    let friend = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .identification_attributes(["user_id"])
        .build(&schema)
        .unwrap();
    let mapping = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .relationship("friends", "friends", friend)
        .identification_attributes(["user_id"])
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_root(mapping);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let payload = json!({"id": 1, "friends": [{"id": 4}, {"id": 2}, {"id": 3}]});
    let user = test_support::map(&mut graph, &payload, &provider, &data_source)
        .first_object()
        .unwrap();
    let Some(RelationshipValue::ToMany { kind, objects }) = graph.relationship(user, "friends") else {
        panic!("friends missing");
    };
    assert_eq!(*kind, CollectionKind::OrderedSet);
    let ids: Vec<_> = objects.iter().map(|id| graph.attribute(*id, "user_id").cloned()).collect();
    assert_eq!(
        ids,
        vec![
            Some(AttributeValue::Integer(4)),
            Some(AttributeValue::Integer(2)),
            Some(AttributeValue::Integer(3))
        ]
    );
}
