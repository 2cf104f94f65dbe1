//! BFS/DFS traversal primitives over a `Snapshot`: org-tree descent,
//! cycle detection, impact analysis, and shortest path.

use super::snapshot::Snapshot;
use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::DependencyType;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Downstream,
    Upstream,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactNode {
    pub entity_id: Id,
    pub depth: u32,
    /// The edge type first reached this node through, `None` for the source.
    pub via_edge: Option<DependencyType>,
}

/// Descendants of `org`, BFS order, tie-broken by `(name, id)` at each
/// frontier layer so the result is deterministic across calls.
pub fn children(snapshot: &Snapshot, org: Id, recursive: bool) -> Vec<Id> {
    let mut direct: Vec<Id> = snapshot
        .org_children
        .get(&org)
        .cloned()
        .unwrap_or_default();
    sort_by_name_then_id(snapshot, &mut direct);

    if !recursive {
        return direct;
    }

    let mut out = Vec::new();
    let mut queue: VecDeque<Id> = direct.into_iter().collect();
    let mut seen: HashSet<Id> = queue.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        out.push(node);
        let mut next: Vec<Id> = snapshot
            .org_children
            .get(&node)
            .cloned()
            .unwrap_or_default();
        sort_by_name_then_id(snapshot, &mut next);
        for child in next {
            if seen.insert(child) {
                queue.push_back(child);
            }
        }
    }
    out
}

fn sort_by_name_then_id(snapshot: &Snapshot, ids: &mut [Id]) {
    ids.sort_by(|a, b| {
        let name_a = snapshot.org_names.get(a).map(String::as_str).unwrap_or("");
        let name_b = snapshot.org_names.get(b).map(String::as_str).unwrap_or("");
        name_a.cmp(name_b).then(a.cmp(b))
    });
}

/// Path from the tenant root to `org`, closest-to-root first. Denies a walk
/// deeper than `max_depth`, which should never legitimately occur and
/// indicates a corrupted tree.
pub fn hierarchy(snapshot: &Snapshot, org: Id, max_depth: u32) -> Result<Vec<Id>> {
    let mut path = Vec::new();
    let mut current = Some(org);
    let mut depth = 0u32;
    while let Some(node) = current {
        if depth > max_depth {
            return Err(ElderError::DepthExceeded(format!(
                "organization {org} hierarchy exceeds max depth {max_depth}"
            )));
        }
        path.push(node);
        current = snapshot.org_parent.get(&node).copied().flatten();
        depth += 1;
    }
    path.reverse();
    Ok(path)
}

/// True if `target` is reachable from `source` following only hard-subgraph
/// edges. Used by `add_edge` to reject edges that would create a cycle
/// before the edge is ever persisted.
pub fn hard_reachable(snapshot: &Snapshot, source: Id, target: Id) -> Option<Vec<Id>> {
    let mut queue = VecDeque::new();
    let mut came_from: std::collections::HashMap<Id, Id> = std::collections::HashMap::new();
    queue.push_back(source);
    let mut seen = HashSet::new();
    seen.insert(source);
    while let Some(node) = queue.pop_front() {
        if node == target {
            let mut path = vec![target];
            let mut cur = target;
            while let Some(prev) = came_from.get(&cur) {
                path.push(*prev);
                cur = *prev;
            }
            path.reverse();
            return Some(path);
        }
        for &next in snapshot.hard_out.get(&node).into_iter().flatten() {
            if seen.insert(next) {
                came_from.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

/// BFS impact set from `entity` under `direction`, capped at `max_depth`
/// frontier layers. Dedupes by node (first-reach depth wins) but is
/// otherwise tolerant of cycles outside the hard subgraph, per `spec.md`
/// §4.4. `deadline_check` is invoked once per expanded frontier layer.
pub fn impact(
    snapshot: &Snapshot,
    entity: Id,
    direction: Direction,
    max_depth: u32,
    mut deadline_check: impl FnMut() -> Result<()>,
) -> Result<Vec<ImpactNode>> {
    let mut out = vec![ImpactNode {
        entity_id: entity,
        depth: 0,
        via_edge: None,
    }];
    if max_depth == 0 {
        return Ok(out);
    }

    let mut visited = HashSet::new();
    visited.insert(entity);
    let mut frontier = vec![entity];
    let mut depth = 0u32;

    while !frontier.is_empty() && depth < max_depth {
        deadline_check()?;
        depth += 1;
        let mut next_frontier = Vec::new();
        for node in &frontier {
            let neighbors = neighbors_for(snapshot, *node, direction);
            for (next, edge) in neighbors {
                if visited.insert(next) {
                    out.push(ImpactNode {
                        entity_id: next,
                        depth,
                        via_edge: Some(edge),
                    });
                    next_frontier.push(next);
                }
            }
        }
        frontier = next_frontier;
    }
    Ok(out)
}

fn neighbors_for(snapshot: &Snapshot, node: Id, direction: Direction) -> Vec<(Id, DependencyType)> {
    match direction {
        Direction::Downstream => snapshot.dep_out.get(&node).cloned().unwrap_or_default(),
        Direction::Upstream => snapshot.dep_in.get(&node).cloned().unwrap_or_default(),
        Direction::Both => {
            let mut both = snapshot.dep_out.get(&node).cloned().unwrap_or_default();
            both.extend(snapshot.dep_in.get(&node).cloned().unwrap_or_default());
            both
        }
    }
}

/// Shortest unweighted path from `source` to `target` restricted to edges
/// passing `edge_filter`. Ties are broken lexicographically by the sequence
/// of node ids explored, since BFS neighbor order is the sorted adjacency
/// list.
pub fn path(
    snapshot: &Snapshot,
    source: Id,
    target: Id,
    edge_filter: impl Fn(DependencyType) -> bool,
) -> Option<Vec<Id>> {
    if source == target {
        return Some(vec![source]);
    }
    let mut queue = VecDeque::new();
    let mut came_from: std::collections::HashMap<Id, Id> = std::collections::HashMap::new();
    queue.push_back(source);
    let mut seen = HashSet::new();
    seen.insert(source);

    while let Some(node) = queue.pop_front() {
        let mut neighbors: Vec<Id> = snapshot
            .dep_out
            .get(&node)
            .into_iter()
            .flatten()
            .filter(|(_, ty)| edge_filter(*ty))
            .map(|(id, _)| *id)
            .collect();
        neighbors.sort_unstable();
        for next in neighbors {
            if seen.insert(next) {
                came_from.insert(next, node);
                if next == target {
                    let mut result = vec![target];
                    let mut cur = target;
                    while let Some(prev) = came_from.get(&cur) {
                        result.push(*prev);
                        cur = *prev;
                    }
                    result.reverse();
                    return Some(result);
                }
                queue.push_back(next);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::snapshot::Snapshot;
    use std::collections::HashMap;

    fn blank_snapshot() -> Snapshot {
        Snapshot {
            org_parent: HashMap::new(),
            org_children: HashMap::new(),
            org_names: HashMap::new(),
            entity_org: HashMap::new(),
            entity_names: HashMap::new(),
            dep_out: HashMap::new(),
            dep_in: HashMap::new(),
            hard_out: HashMap::new(),
        }
    }

    #[test]
    fn impact_zero_depth_returns_only_source() {
        let mut snap = blank_snapshot();
        snap.dep_out.insert(1, vec![(2, DependencyType::Runtime)]);
        let result = impact(&snap, 1, Direction::Downstream, 0, || Ok(())).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entity_id, 1);
    }

    #[test]
    fn impact_follows_chain_and_dedupes() {
        let mut snap = blank_snapshot();
        snap.dep_out.insert(1, vec![(2, DependencyType::Runtime)]);
        snap.dep_out.insert(2, vec![(3, DependencyType::Runtime)]);
        snap.dep_out.insert(3, vec![(1, DependencyType::Related)]);
        let result = impact(&snap, 1, Direction::Downstream, 5, || Ok(())).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[1].entity_id, 2);
        assert_eq!(result[1].depth, 1);
        assert_eq!(result[2].entity_id, 3);
        assert_eq!(result[2].depth, 2);
    }

    #[test]
    fn hard_reachable_finds_cycle_path() {
        let mut snap = blank_snapshot();
        snap.hard_out.insert(1, vec![2]);
        snap.hard_out.insert(2, vec![3]);
        snap.hard_out.insert(3, vec![1]);
        let found = hard_reachable(&snap, 3, 1).unwrap();
        assert_eq!(found, vec![3, 1]);
    }

    #[test]
    fn path_breaks_ties_lexicographically() {
        let mut snap = blank_snapshot();
        snap.dep_out.insert(1, vec![(3, DependencyType::Runtime), (2, DependencyType::Runtime)]);
        snap.dep_out.insert(2, vec![(4, DependencyType::Runtime)]);
        snap.dep_out.insert(3, vec![(4, DependencyType::Runtime)]);
        let found = path(&snap, 1, 4, |_| true).unwrap();
        assert_eq!(found, vec![1, 2, 4]);
    }

    #[test]
    fn hierarchy_denies_past_max_depth() {
        let mut snap = blank_snapshot();
        for i in 1..=5u64 {
            snap.org_parent.insert(i, if i == 1 { None } else { Some(i - 1) });
        }
        let err = hierarchy(&snap, 5, 2).unwrap_err();
        assert_eq!(err.reason_code(), "depth_exceeded");
        assert!(hierarchy(&snap, 5, 10).is_ok());
    }
}
