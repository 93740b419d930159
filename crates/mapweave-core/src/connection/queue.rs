//! Deferred connection operations of one mapping pass
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::operation::{ConnectionOperation, ConnectionReport};
use crate::cache::IdentityCache;
use crate::error::{Error, MappingError, MappingErrorCode, Result};
use crate::object::ObjectGraph;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Holds connection operations until the pass that produced them completes
///
/// Operations run in enqueue order, which callers must not rely on.
#[derive(Debug, Default)]
pub struct ConnectionQueue {
    pending: VecDeque<ConnectionOperation>,
    pass_complete: bool,
}

impl ConnectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer an operation until the pass completes
    pub fn enqueue(&mut self, operation: ConnectionOperation) {
        self.pending.push_back(operation);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Signal that every mapping operation of the pass has finished
    pub fn mark_pass_complete(&mut self) {
        self.pass_complete = true;
    }

    pub fn is_pass_complete(&self) -> bool {
        self.pass_complete
    }

    /// Run every pending operation. Fails without running anything when the
    /// pass has not completed.
    ///
    /// An operation that fails is reported with an `InvalidConnection`
    /// condition and the rest still run. A cancelled operation stops the
    /// drain; it and everything after it stay queued.
    pub fn drain(&mut self, graph: &mut ObjectGraph, cache: &dyn IdentityCache) -> Result<Vec<ConnectionReport>> {
        if !self.pass_complete {
            return Err(Error::InvalidState {
                message: format!("{} connection operations wait for an unfinished mapping pass", self.pending.len()),
            });
        }

        debug!(pending = self.pending.len(), "running deferred connections");
        let mut reports = Vec::with_capacity(self.pending.len());
        while let Some(operation) = self.pending.pop_front() {
            if operation.is_cancelled() {
                debug!(remaining = self.pending.len() + 1, "connection drain cancelled");
                self.pending.push_front(operation);
                break;
            }
            let object = operation.object();
            match operation.perform(graph, cache) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(object = %object, error = %e, "connection operation failed");
                    reports.push(ConnectionReport {
                        object: Some(object),
                        errors: vec![MappingError::new(MappingErrorCode::InvalidConnection, None, e.to_string())],
                        ..Default::default()
                    });
                }
            }
        }
        Ok(reports)
    }
}
