//! # CacheInvalidator
//!
//! Keyed invalidation on write (`spec.md` §4.9). A subject is one of
//! `org_tree`, `entity_graph`, `oncall:<scope>`, or `membership:<group>`,
//! scoped to a tenant. The only subscriber the single-node core actually
//! caches for is [`crate::graph::GraphEngine`]; `OnCallResolver` and
//! `GroupWorkflow` recompute from `Store` on every call, so their subjects
//! exist in the key space for symmetry with the spec and so a future cache
//! (or a multi-instance broadcast layer, left to the deployment
//! collaborator) has somewhere to subscribe without a key-space migration.

use crate::common::Id;
use crate::graph::GraphEngine;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    OrgTree,
    EntityGraph,
    OnCall(Id),
    Membership(Id),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::OrgTree => write!(f, "org_tree"),
            Subject::EntityGraph => write!(f, "entity_graph"),
            Subject::OnCall(scope) => write!(f, "oncall:{scope}"),
            Subject::Membership(group) => write!(f, "membership:{group}"),
        }
    }
}

pub struct CacheInvalidator {
    /// Invalidation keys produced since startup, for introspection and
    /// tests; not consulted for correctness (invalidation is applied
    /// synchronously to `GraphEngine` below).
    log: parking_lot::Mutex<Vec<(Id, Subject)>>,
}

impl Default for CacheInvalidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheInvalidator {
    pub fn new() -> Self {
        Self {
            log: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Called by `Pipeline` after a structural mutation (entity, dependency,
    /// organization, membership) commits. `org_tree`/`entity_graph` subjects
    /// drop `GraphEngine`'s per-tenant snapshot; other subjects are recorded
    /// but have no cache to drop in the single-node core.
    pub fn invalidate(&self, graph: &GraphEngine<'_>, tenant_id: Id, subject: Subject) {
        tracing::debug!(tenant_id, subject = %subject, "cache invalidation");
        match &subject {
            Subject::OrgTree | Subject::EntityGraph => graph.invalidate(tenant_id),
            Subject::OnCall(_) | Subject::Membership(_) => {}
        }
        self.log.lock().push((tenant_id, subject));
    }

    pub fn history(&self) -> Vec<(Id, Subject)> {
        self.log.lock().clone()
    }
}
