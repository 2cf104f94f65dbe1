//! Per-tenant adjacency snapshot.
//!
//! `GraphEngine` never walks `Store` tables directly for a traversal; it
//! batch-loads one `Snapshot` per tenant on first query (`spec.md` §9's
//! "lazy loaders producing N+1 patterns" guidance: load the whole adjacency
//! view in one pass rather than per-node fetches) and keeps it until
//! `CacheInvalidator` tells it the tenant changed.

use crate::common::Id;
use crate::store::model::DependencyType;
use crate::store::Store;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub org_parent: HashMap<Id, Option<Id>>,
    pub org_children: HashMap<Id, Vec<Id>>,
    pub org_names: HashMap<Id, String>,

    pub entity_org: HashMap<Id, Id>,
    pub entity_names: HashMap<Id, String>,

    /// Every outbound edge, regardless of type.
    pub dep_out: HashMap<Id, Vec<(Id, DependencyType)>>,
    pub dep_in: HashMap<Id, Vec<(Id, DependencyType)>>,

    /// Outbound edges restricted to the hard subgraph
    /// (`runtime`/`network`/`application`/`database`).
    pub hard_out: HashMap<Id, Vec<Id>>,
}

impl Snapshot {
    pub fn build(store: &Store, tenant_id: Id) -> Self {
        let mut org_parent = HashMap::new();
        let mut org_children: HashMap<Id, Vec<Id>> = HashMap::new();
        let mut org_names = HashMap::new();

        for org in store.organizations.list_by(|o| o.tenant_id == tenant_id) {
            org_parent.insert(org.id, org.parent_id);
            org_names.insert(org.id, org.name.clone());
            if let Some(parent) = org.parent_id {
                org_children.entry(parent).or_default().push(org.id);
            }
        }

        let mut entity_org = HashMap::new();
        let mut entity_names = HashMap::new();
        for entity in store.entities.list_by(|e| e.tenant_id == tenant_id) {
            entity_org.insert(entity.id, entity.organization_id);
            entity_names.insert(entity.id, entity.name.clone());
        }

        let mut dep_out: HashMap<Id, Vec<(Id, DependencyType)>> = HashMap::new();
        let mut dep_in: HashMap<Id, Vec<(Id, DependencyType)>> = HashMap::new();
        let mut hard_out: HashMap<Id, Vec<Id>> = HashMap::new();
        for dep in store.dependencies.list_by(|d| d.tenant_id == tenant_id) {
            dep_out
                .entry(dep.source_entity_id)
                .or_default()
                .push((dep.target_entity_id, dep.dependency_type));
            dep_in
                .entry(dep.target_entity_id)
                .or_default()
                .push((dep.source_entity_id, dep.dependency_type));
            if dep.dependency_type.is_hard() {
                hard_out
                    .entry(dep.source_entity_id)
                    .or_default()
                    .push(dep.target_entity_id);
            }
        }

        Self {
            org_parent,
            org_children,
            org_names,
            entity_org,
            entity_names,
            dep_out,
            dep_in,
            hard_out,
        }
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &Id> {
        self.entity_names.keys()
    }
}
