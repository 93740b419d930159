//! Integration tests for relationship connections
//!
//! Connections run after the mapping pass, so objects mapped anywhere in the
//! pass can be found, and not finding anything is a normal outcome.


use mapweave_core::{
    AttributeValue, CollectionKind, ConnectedValue, ConnectionDescription, ConnectionMatcher, ConnectionOperation,
    ConnectionQueue, FetchCache, InMemoryCache, MappedValue, MappingErrorCode, MappingsDictionary, ObjectGraph,
    ObjectMapping, RelationshipValue,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[test]
fn test_to_one_foreign_key_without_match_is_no_value() {
    let schema = test_support::schema();
    let cats = ObjectMapping::builder("Cat")
        .attribute("id", "cat_id")
        .attribute("owner", "owner_id")
        .connection(ConnectionDescription::foreign_key("owner", &["owner_id"], &["user_id"]).unwrap())
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new().with_key_path("cats", cats);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();

    let result = test_support::map(&mut graph, &json!({"cats": [{"id": 1, "owner": 99}]}), &provider, &data_source);

    assert!(!result.has_errors());
    let report = &result.connection_reports()[0];
    assert_eq!(report.connections["owner"], ConnectedValue::NoValue);
    let cat = result.first_object().unwrap();
    assert_eq!(graph.relationship(cat, "owner"), Some(&RelationshipValue::ToOne(None)));
}

#[test]
fn test_foreign_key_resolves_objects_mapped_later_in_pass() {
    let schema = test_support::schema();
    let cats = ObjectMapping::builder("Cat")
        .attribute("id", "cat_id")
        .attribute("owner", "owner_id")
        .connection(ConnectionDescription::foreign_key("owner", &["owner_id"], &["user_id"]).unwrap())
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new()
        .with_key_path("cats", cats)
        .with_key_path("users", test_support::identified_user_mapping(&schema));
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();
    let payload = json!({
        "cats": [{"id": 1, "owner": 31337}, {"id": 2, "owner": 31337}],
        "users": [{"id": 31337, "name": "Blake"}]
    });

    let result = test_support::map(&mut graph, &payload, &provider, &data_source);

    let Some(MappedValue::Collection(users)) = result.get(Some("users")) else {
        panic!("users not mapped");
    };
    let blake = users[0];
    assert_eq!(result.connection_reports().len(), 2);
    for report in result.connection_reports() {
        assert_eq!(report.connections["owner"], ConnectedValue::Object(blake));
    }
}

#[test]
fn test_to_many_key_path_preserves_collection_kind() {
    let schema = test_support::schema();
    let members = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .identification_attributes(["user_id"])
        .build(&schema)
        .unwrap();
    let teams = ObjectMapping::builder("Team")
        .attribute("id", "team_id")
        .relationship("members", "members", members)
        .identification_attributes(["team_id"])
        .build(&schema)
        .unwrap();
    // a user's friends are read through the team relationship
    let users = ObjectMapping::builder("User")
        .attribute("id", "user_id")
        .attribute("team", "team_id")
        .identification_attributes(["user_id"])
        .connection(ConnectionDescription::foreign_key("team", &["team_id"], &["team_id"]).unwrap())
        .build(&schema)
        .unwrap();
    let provider = MappingsDictionary::new()
        .with_key_path("teams", teams)
        .with_key_path("users", users);
    let mut graph = ObjectGraph::new(schema);
    let data_source = test_support::managed_data_source();
    let payload = json!({
        "teams": [{"id": 1, "members": [{"id": 3}, {"id": 2}]}],
        "users": [{"id": 2, "team": 1}]
    });
    let result = test_support::map(&mut graph, &payload, &provider, &data_source);
    assert!(!result.has_errors(), "{:?}", result.errors());

    let user = match result.get(Some("users")) {
        Some(MappedValue::Collection(ids)) => ids[0],
        other => panic!("unexpected {:?}", other),
    };
    let team_members: Vec<_> = match result.get(Some("teams")) {
        Some(MappedValue::Collection(ids)) => graph.relationship(ids[0], "members").unwrap().object_ids(),
        other => panic!("unexpected {:?}", other),
    };

    let report = ConnectionOperation::new(user, vec![ConnectionDescription::key_path("friends", "team.members").unwrap()])
        .perform(&mut graph, &FetchCache)
        .unwrap();

    // friends is an ordered set; the team's member order is kept
    assert_eq!(
        report.connections["friends"],
        ConnectedValue::Collection {
            kind: CollectionKind::OrderedSet,
            objects: team_members.clone(),
        }
    );
    let Some(RelationshipValue::ToMany { kind, objects }) = graph.relationship(user, "friends") else {
        panic!("friends not connected");
    };
    assert_eq!(*kind, CollectionKind::OrderedSet);
    assert_eq!(objects, &team_members);
}

#[test]
fn test_empty_to_many_is_not_an_error() {
    let mut graph = test_support::graph();
    let user = graph.insert("User").unwrap();
    graph
        .set_attribute(
            user,
            "friend_ids",
            AttributeValue::Array(vec![AttributeValue::Integer(5), AttributeValue::Integer(6)]),
        )
        .unwrap();

    let connection = ConnectionDescription::foreign_key("friends", &["friend_ids"], &["user_id"]).unwrap();
    let report = ConnectionOperation::new(user, vec![connection])
        .perform(&mut graph, &InMemoryCache::new())
        .unwrap();

    assert!(report.errors.is_empty());
    assert_eq!(
        report.connections["friends"],
        ConnectedValue::Collection {
            kind: CollectionKind::OrderedSet,
            objects: vec![],
        }
    );
}

#[test]
fn test_composite_foreign_key_requires_every_pair() {
    let mut graph = test_support::graph();
    let matching = graph.insert("User").unwrap();
    graph.set_attribute(matching, "user_id", AttributeValue::Integer(1)).unwrap();
    graph.set_attribute(matching, "team_id", AttributeValue::Integer(9)).unwrap();
    let partial = graph.insert("User").unwrap();
    graph.set_attribute(partial, "user_id", AttributeValue::Integer(1)).unwrap();
    graph.set_attribute(partial, "team_id", AttributeValue::Integer(8)).unwrap();

    let cat = graph.insert("Cat").unwrap();
    graph.set_attribute(cat, "owner_id", AttributeValue::Integer(1)).unwrap();
    graph.set_attribute(cat, "cat_id", AttributeValue::Integer(9)).unwrap();

    let connection = ConnectionDescription::foreign_key("owner", &["owner_id", "cat_id"], &["user_id", "team_id"]).unwrap();
    let report = ConnectionOperation::new(cat, vec![connection])
        .perform(&mut graph, &InMemoryCache::new())
        .unwrap();
    assert_eq!(report.connections["owner"], ConnectedValue::Object(matching));
}

#[test]
fn test_arity_mismatch_rejected_at_construction() {
    let err = ConnectionDescription::foreign_key("owner", &["a", "b"], &["c"]).unwrap_err();
    assert!(matches!(err, mapweave_core::Error::InvalidConnection { .. }));
}

#[test]
fn test_unknown_relationship_rejected_when_mapping_built() {
    let schema = test_support::schema();
    let result = ObjectMapping::builder("Cat")
        .attribute("id", "cat_id")
        .connection(ConnectionDescription::foreign_key("breeder", &["owner_id"], &["user_id"]).unwrap())
        .build(&schema);
    assert!(result.is_err());
}

#[test]
fn test_matcher_and_completion_callback() {
    let mut graph = test_support::graph();
    let owner = graph.insert("User").unwrap();
    graph.set_attribute(owner, "user_id", AttributeValue::Integer(1)).unwrap();
    let cat = graph.insert("Cat").unwrap();
    graph.set_attribute(cat, "owner_id", AttributeValue::Integer(1)).unwrap();
    graph.set_attribute(cat, "name", "Asia".into()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let connection = ConnectionDescription::foreign_key("owner", &["owner_id"], &["user_id"])
        .unwrap()
        .with_matcher(ConnectionMatcher::key_path("name", "Asia").unwrap());

    let mut queue = ConnectionQueue::new();
    queue.enqueue(
        ConnectionOperation::new(cat, vec![connection])
            .on_completion(move |values| sink.lock().unwrap().push(values.clone())),
    );
    queue.mark_pass_complete();
    let reports = queue.drain(&mut graph, &FetchCache).unwrap();

    assert_eq!(reports[0].connections["owner"], ConnectedValue::Object(owner));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["owner"], ConnectedValue::Object(owner));
}

#[test]
fn test_key_path_to_scalar_reports_invalid_connection() {
    let mut graph = test_support::graph();
    let user = graph.insert("User").unwrap();
    graph.set_attribute(user, "name", "Blake".into()).unwrap();

    let report = ConnectionOperation::new(user, vec![ConnectionDescription::key_path("team", "name").unwrap()])
        .perform(&mut graph, &FetchCache)
        .unwrap();
    assert_eq!(report.errors[0].code, MappingErrorCode::InvalidConnection);
}
