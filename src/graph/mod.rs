//! # GraphEngine
//!
//! In-memory views over the per-tenant organization tree and entity
//! dependency graph (`spec.md` §4.4): traversal, betweenness-style
//! analytics, and incremental cycle detection on the "hard" subgraph
//! (`runtime`/`network`/`application`/`database` dependency types, which
//! must remain acyclic).
//!
//! The engine batch-loads one [`snapshot::Snapshot`] per tenant from
//! [`crate::store::Store`] on first query and keeps it until
//! [`crate::cache_invalidator::CacheInvalidator`] calls [`GraphEngine::invalidate`]
//! for that tenant — the "consistent snapshot" guarantee in `spec.md` §4.4:
//! a traversal always sees a snapshot that corresponds to some committed
//! point in time, never a half-applied mutation.

pub mod analytics;
pub mod snapshot;
pub mod traversal;

pub use analytics::AnalyzeResult;
pub use snapshot::Snapshot;
pub use traversal::{Direction, ImpactNode};

use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::DependencyType;
use crate::store::Store;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

pub struct GraphEngine<'s> {
    store: &'s Store,
    cache: dashmap::DashMap<Id, Arc<RwLock<Snapshot>>>,
    max_hierarchy_depth: u32,
    analyze_sampling_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkTopology {
    pub nodes: Vec<Id>,
    pub edges: Vec<(Id, Id)>,
}

impl<'s> GraphEngine<'s> {
    pub fn new(store: &'s Store, max_hierarchy_depth: u32, analyze_sampling_threshold: usize) -> Self {
        Self {
            store,
            cache: dashmap::DashMap::new(),
            max_hierarchy_depth,
            analyze_sampling_threshold,
        }
    }

    fn snapshot(&self, tenant_id: Id) -> Arc<RwLock<Snapshot>> {
        self.cache
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(RwLock::new(Snapshot::build(self.store, tenant_id))))
            .clone()
    }

    /// Drops the cached snapshot for `tenant_id`; the next query rebuilds it
    /// from `Store`. The sole entry point any other component may use to
    /// affect this cache, per `spec.md` §4.9 ("GraphEngine caches ... only
    /// written by the invalidator holding the cache's exclusive lock").
    pub fn invalidate(&self, tenant_id: Id) {
        self.cache.remove(&tenant_id);
    }

    pub fn children(&self, tenant_id: Id, org: Id, recursive: bool) -> Vec<Id> {
        let snap = self.snapshot(tenant_id);
        let guard = snap.read();
        traversal::children(&guard, org, recursive)
    }

    pub fn hierarchy(&self, tenant_id: Id, org: Id) -> Result<Vec<Id>> {
        let snap = self.snapshot(tenant_id);
        let guard = snap.read();
        traversal::hierarchy(&guard, org, self.max_hierarchy_depth)
    }

    /// Incremental cycle check for a prospective edge `src -> dst` of
    /// `dep_type`. If `dep_type` is in the hard subgraph, runs DFS/BFS from
    /// `dst` restricted to hard edges; if `src` is reachable, the edge would
    /// close a cycle and is rejected with the cycle path named, per
    /// `spec.md` §4.4 and the boundary behavior in §8.
    pub fn check_would_create_cycle(
        &self,
        tenant_id: Id,
        src: Id,
        dst: Id,
        dep_type: DependencyType,
    ) -> Result<()> {
        if !dep_type.is_hard() {
            return Ok(());
        }
        let snap = self.snapshot(tenant_id);
        let guard = snap.read();
        // `dst` reaching `src` over hard edges means the prospective `src ->
        // dst` edge would close a cycle. The reachable path already runs
        // `dst -> ... -> src`; the full cycle is the new edge's source
        // followed by that path, so it starts and ends at `src`
        // (`spec.md` §8 scenario 2: `["C","A","B","C"]` for `C -> A` over
        // `A -> B -> C`).
        if let Some(reachable) = traversal::hard_reachable(&guard, dst, src) {
            let mut cycle_path = vec![src];
            cycle_path.extend(reachable);
            return Err(ElderError::WouldCreateCycle {
                path: cycle_path.into_iter().map(|id| id.to_string()).collect(),
            });
        }
        Ok(())
    }

    pub fn impact(
        &self,
        tenant_id: Id,
        entity: Id,
        direction: Direction,
        max_depth: u32,
        mut deadline_check: impl FnMut() -> Result<()>,
    ) -> Result<Vec<ImpactNode>> {
        let snap = self.snapshot(tenant_id);
        let guard = snap.read();
        traversal::impact(&guard, entity, direction, max_depth, &mut deadline_check)
    }

    pub fn path(
        &self,
        tenant_id: Id,
        source: Id,
        target: Id,
        edge_filter: impl Fn(DependencyType) -> bool,
    ) -> Option<Vec<Id>> {
        let snap = self.snapshot(tenant_id);
        let guard = snap.read();
        traversal::path(&guard, source, target, edge_filter)
    }

    /// `analyze(scope)`: `scope` is every entity belonging to `org` (and,
    /// recursively, its descendant organizations) within `tenant_id`.
    pub fn analyze(&self, tenant_id: Id, org: Option<Id>) -> AnalyzeResult {
        let snap = self.snapshot(tenant_id);
        let guard = snap.read();

        let scope: Vec<Id> = match org {
            None => guard.entity_ids().copied().collect(),
            Some(org_id) => {
                let mut orgs = vec![org_id];
                orgs.extend(traversal::children(&guard, org_id, true));
                let org_set: HashSet<Id> = orgs.into_iter().collect();
                guard
                    .entity_ids()
                    .copied()
                    .filter(|id| {
                        guard
                            .entity_org
                            .get(id)
                            .map(|o| org_set.contains(o))
                            .unwrap_or(false)
                    })
                    .collect()
            }
        };

        let is_acyclic = self.hard_subgraph_is_acyclic(&guard, &scope);
        analytics::analyze(&guard, &scope, is_acyclic, self.analyze_sampling_threshold)
    }

    fn hard_subgraph_is_acyclic(&self, snap: &Snapshot, scope: &[Id]) -> bool {
        let in_scope: HashSet<Id> = scope.iter().copied().collect();
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();

        fn visit(
            node: Id,
            snap: &Snapshot,
            in_scope: &HashSet<Id>,
            visiting: &mut HashSet<Id>,
            done: &mut HashSet<Id>,
        ) -> bool {
            if done.contains(&node) {
                return true;
            }
            if !visiting.insert(node) {
                return false;
            }
            for &next in snap.hard_out.get(&node).into_iter().flatten() {
                if in_scope.contains(&next) && !visit(next, snap, in_scope, visiting, done) {
                    return false;
                }
            }
            visiting.remove(&node);
            done.insert(node);
            true
        }

        for &node in scope {
            if !visit(node, snap, &in_scope, &mut visiting, &mut done) {
                return false;
            }
        }
        true
    }

    /// Nodes and edges restricted to `network`-type entities and their
    /// `network` dependencies, for visualization consumers (`spec.md`
    /// §4.4).
    pub fn network_topology(&self, tenant_id: Id, org: Id, include_children: bool) -> NetworkTopology {
        use crate::store::model::EntityType;

        let snap = self.snapshot(tenant_id);
        let guard = snap.read();

        let mut orgs = vec![org];
        if include_children {
            orgs.extend(traversal::children(&guard, org, true));
        }
        let org_set: HashSet<Id> = orgs.into_iter().collect();

        let network_entities: HashSet<Id> = self
            .store
            .entities
            .list_by(|e| {
                e.tenant_id == tenant_id
                    && org_set.contains(&e.organization_id)
                    && e.entity_type == EntityType::Network
            })
            .into_iter()
            .map(|e| e.id)
            .collect();

        let mut edges = Vec::new();
        for &node in &network_entities {
            for (dst, ty) in guard.dep_out.get(&node).into_iter().flatten() {
                if *ty == DependencyType::Network && network_entities.contains(dst) {
                    edges.push((node, *dst));
                }
            }
        }

        NetworkTopology {
            nodes: network_entities.into_iter().collect(),
            edges,
        }
    }
}

#[allow(dead_code)]
fn _assert_send_sync<T: Send + Sync>() {}
#[allow(dead_code)]
fn _assertions() {
    _assert_send_sync::<HashMap<Id, Id>>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::*;

    fn org(id: Id, tenant_id: Id, parent_id: Option<Id>, name: &str) -> Organization {
        Organization {
            id,
            tenant_id,
            revision: 1,
            village_id: format!("00a1-{id:04x}-00000000"),
            parent_id,
            name: name.to_string(),
            org_type: OrganizationType::Organization,
            owner_identity_id: None,
            owner_group_id: None,
            ldap_dn: None,
            saml_group: None,
        }
    }

    fn entity(id: Id, tenant_id: Id, org_id: Id, name: &str) -> Entity {
        Entity {
            id,
            tenant_id,
            revision: 1,
            village_id: format!("00a1-0000-{id:08x}"),
            organization_id: org_id,
            entity_type: EntityType::Compute,
            name: name.to_string(),
            attributes: Default::default(),
            tags: Default::default(),
            is_active: true,
        }
    }

    fn dependency(id: Id, tenant_id: Id, src: Id, dst: Id, ty: DependencyType) -> Dependency {
        Dependency {
            id,
            tenant_id,
            revision: 1,
            source_entity_id: src,
            target_entity_id: dst,
            dependency_type: ty,
            metadata: Default::default(),
        }
    }

    #[test]
    fn impact_scenario_from_spec_walkthrough() {
        let store = Store::new();
        store.organizations.insert(org(1, 1, None, "Eng")).unwrap();
        store.organizations.insert(org(2, 1, Some(1), "Platform")).unwrap();
        store.entities.insert(entity(10, 1, 2, "web-01")).unwrap();
        store.entities.insert(entity(11, 1, 2, "db-01")).unwrap();
        store
            .dependencies
            .insert(dependency(100, 1, 10, 11, DependencyType::Runtime))
            .unwrap();

        let engine = GraphEngine::new(&store, 64, 5000);
        let result = engine
            .impact(1, 10, Direction::Downstream, 5, || Ok(()))
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].entity_id, 10);
        assert_eq!(result[0].depth, 0);
        assert_eq!(result[1].entity_id, 11);
        assert_eq!(result[1].depth, 1);
        assert_eq!(result[1].via_edge, Some(DependencyType::Runtime));
    }

    #[test]
    fn cycle_attempt_is_rejected_with_path() {
        let store = Store::new();
        store.organizations.insert(org(1, 1, None, "Eng")).unwrap();
        store.entities.insert(entity(1, 1, 1, "A")).unwrap();
        store.entities.insert(entity(2, 1, 1, "B")).unwrap();
        store.entities.insert(entity(3, 1, 1, "C")).unwrap();
        store.dependencies.insert(dependency(1, 1, 1, 2, DependencyType::Runtime)).unwrap();
        store.dependencies.insert(dependency(2, 1, 2, 3, DependencyType::Runtime)).unwrap();

        let engine = GraphEngine::new(&store, 64, 5000);
        let err = engine
            .check_would_create_cycle(1, 3, 1, DependencyType::Runtime)
            .unwrap_err();
        assert_eq!(err.reason_code(), "cycle");
        // `spec.md` §8 scenario 2: attempting `C -> A` over `A -> B -> C`
        // must report the cycle starting at the new edge's source, `C`.
        match err {
            ElderError::WouldCreateCycle { path } => assert_eq!(path, vec!["3", "1", "2", "3"]),
            other => panic!("expected WouldCreateCycle, got {other:?}"),
        }
    }

    #[test]
    fn invalidate_forces_snapshot_rebuild() {
        let store = Store::new();
        store.organizations.insert(org(1, 1, None, "Eng")).unwrap();
        let engine = GraphEngine::new(&store, 64, 5000);
        assert_eq!(engine.children(1, 1, false).len(), 0);

        store.organizations.insert(org(2, 1, Some(1), "Platform")).unwrap();
        // Stale cache still reports no children until invalidated.
        assert_eq!(engine.children(1, 1, false).len(), 0);
        engine.invalidate(1);
        assert_eq!(engine.children(1, 1, false).len(), 1);
    }

    #[test]
    fn network_topology_restricted_to_network_entities_and_edges() {
        let store = Store::new();
        store.organizations.insert(org(1, 1, None, "Eng")).unwrap();
        let mut net_a = entity(1, 1, 1, "vpc-a");
        net_a.entity_type = EntityType::Network;
        let mut net_b = entity(2, 1, 1, "vpc-b");
        net_b.entity_type = EntityType::Network;
        store.entities.insert(net_a).unwrap();
        store.entities.insert(net_b).unwrap();
        store.entities.insert(entity(3, 1, 1, "web-01")).unwrap();
        store.dependencies.insert(dependency(1, 1, 1, 2, DependencyType::Network)).unwrap();
        store.dependencies.insert(dependency(2, 1, 1, 3, DependencyType::Runtime)).unwrap();

        let engine = GraphEngine::new(&store, 64, 5000);
        let topo = engine.network_topology(1, 1, true);
        assert_eq!(topo.nodes.len(), 2);
        assert_eq!(topo.edges, vec![(1, 2)]);
    }
}
