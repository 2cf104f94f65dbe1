//! Generic table handle over a sharded concurrent map.
//!
//! Every entity in `store::model` gets its storage for free by implementing
//! `StoreRecord`. `Table<T>` exposes the primitives `spec.md` §4.1 asks for:
//! `get`, `list_by`, `insert`, `update_if_revision`, `delete`, each enforcing
//! uniqueness/FK/revision invariants at the call site rather than through a
//! query planner.

use super::model::StoreRecord;
use crate::common::Id;
use crate::error::{ElderError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, page_size_max: u32) -> Result<Self> {
        if per_page == 0 || per_page > page_size_max {
            return Err(ElderError::Validation(format!(
                "per_page must be between 1 and {page_size_max}"
            )));
        }
        if page == 0 {
            return Err(ElderError::Validation("page is 1-indexed".to_string()));
        }
        Ok(Self { page, per_page })
    }

    fn window(&self, len: usize) -> (usize, usize) {
        let start = ((self.page - 1) as usize) * (self.per_page as usize);
        let end = (start + self.per_page as usize).min(len);
        (start.min(len), end)
    }
}

pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u32 {
        if self.per_page == 0 {
            0
        } else {
            ((self.total as u32) + self.per_page - 1) / self.per_page
        }
    }
}

/// A table of records of type `T`, keyed by `id`. Rows are stored behind a
/// `DashMap` for sharded concurrent access; the `next_id` counter hands out
/// monotonically increasing internal ids (distinct from Village-IDs, which
/// `village_id::VillageIdAllocator` mints separately).
pub struct Table<T: StoreRecord> {
    rows: DashMap<Id, T>,
    next_id: AtomicU64,
}

impl<T: StoreRecord> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StoreRecord> Table<T> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> Id {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self, id: Id) -> Option<T> {
        self.rows.get(&id).map(|r| r.clone())
    }

    pub fn list_by(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        self.rows
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn paginate(
        &self,
        predicate: impl FnMut(&T) -> bool,
        pagination: &Pagination,
        mut sort_key: impl FnMut(&T, &T) -> std::cmp::Ordering,
    ) -> Page<T> {
        let mut matched = self.list_by(predicate);
        matched.sort_by(|a, b| sort_key(a, b));
        let total = matched.len();
        let (start, end) = pagination.window(total);
        Page {
            items: matched[start..end].to_vec(),
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        }
    }

    /// Inserts a brand-new row. The caller must have already allocated `id`
    /// (via `next_id` or the Village-ID allocator's internal counter) and set
    /// `revision` to 1.
    pub fn insert(&self, row: T) -> Result<T> {
        let id = row.id();
        if self.rows.contains_key(&id) {
            return Err(ElderError::UniqueViolation(format!(
                "row with id {id} already exists"
            )));
        }
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    /// Replaces a row only if `expected_revision` matches the row's current
    /// revision; bumps the stored revision by one on success. This is the
    /// optimistic-concurrency primitive every mutating endpoint goes through.
    pub fn update_if_revision(
        &self,
        id: Id,
        expected_revision: u64,
        mutate: impl FnOnce(&mut T),
    ) -> Result<T> {
        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("id {id}")))?;
        if entry.revision() != expected_revision {
            return Err(ElderError::StaleRevision {
                expected: expected_revision,
                found: entry.revision(),
            });
        }
        mutate(&mut entry);
        let next_rev = entry.revision() + 1;
        entry.set_revision(next_rev);
        Ok(entry.clone())
    }

    pub fn delete(&self, id: Id) -> Result<T> {
        self.rows
            .remove(&id)
            .map(|(_, row)| row)
            .ok_or_else(|| ElderError::ResourceMissing(format!("id {id}")))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
