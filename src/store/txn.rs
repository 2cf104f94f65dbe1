//! Transaction handle.
//!
//! `StoreTxn` is the unit every Pipeline step shares: reads see the
//! transaction's own writes, and on `commit()` every queued mutation becomes
//! visible atomically; on `rollback()` (explicit or via `Drop` without a
//! prior `commit`) every queued mutation is undone in reverse order. Because
//! the reference `Store` applies each table mutation immediately and records
//! its inverse, "commit" for a well-behaved transaction is a no-op marker —
//! the atomicity guarantee lives in the undo log, not in a second pass.

use super::model::StoreRecord;
use super::table::Table;
use crate::common::{CorrelationId, Id};
use crate::error::{ElderError, Result};
use std::time::{Duration, Instant};

type Undo<'s> = Box<dyn FnOnce() + Send + 's>;

pub struct StoreTxn<'s> {
    correlation_id: CorrelationId,
    deadline: Option<Instant>,
    undo_log: Vec<Undo<'s>>,
    finished: bool,
}

impl<'s> StoreTxn<'s> {
    pub fn new(correlation_id: CorrelationId, timeout: Option<Duration>) -> Self {
        Self {
            correlation_id,
            deadline: timeout.map(|d| Instant::now() + d),
            undo_log: Vec::new(),
            finished: false,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Checked by every long-running traversal at each expanded frontier
    /// layer, and by Store before taking a row lock.
    pub fn check_deadline(&self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ElderError::CancelledByDeadline);
            }
        }
        Ok(())
    }

    pub fn insert<T: StoreRecord>(&mut self, table: &'s Table<T>, row: T) -> Result<T> {
        self.check_deadline()?;
        let inserted = table.insert(row)?;
        let id = inserted.id();
        self.undo_log.push(Box::new(move || {
            let _ = table.delete(id);
        }));
        Ok(inserted)
    }

    pub fn update_if_revision<T: StoreRecord>(
        &mut self,
        table: &'s Table<T>,
        id: Id,
        expected_revision: u64,
        mutate: impl FnOnce(&mut T),
    ) -> Result<T> {
        self.check_deadline()?;
        let before = table
            .get(id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("id {id}")))?;
        let updated = table.update_if_revision(id, expected_revision, mutate)?;
        self.undo_log.push(Box::new(move || {
            let restored_id = before.id();
            let target_revision = before.revision() + 1;
            let _ = table.update_if_revision(restored_id, target_revision, |row| {
                *row = before;
            });
        }));
        Ok(updated)
    }

    pub fn delete<T: StoreRecord>(&mut self, table: &'s Table<T>, id: Id) -> Result<T> {
        self.check_deadline()?;
        let removed = table.delete(id)?;
        let to_restore = removed.clone();
        self.undo_log.push(Box::new(move || {
            let _ = table.insert(to_restore);
        }));
        Ok(removed)
    }

    /// Marks the transaction as successfully finished; no further rollback
    /// happens on `Drop`.
    pub fn commit(mut self) {
        self.finished = true;
    }

    /// Explicit rollback: undoes every queued mutation in reverse order.
    pub fn rollback(mut self) {
        self.unwind();
        self.finished = true;
    }

    fn unwind(&mut self) {
        while let Some(undo) = self.undo_log.pop() {
            undo();
        }
    }
}

impl<'s> Drop for StoreTxn<'s> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                "transaction dropped without commit or rollback; rolling back"
            );
            self.unwind();
        }
    }
}

/// Retries a Store operation while it fails with `Deadlock`, using
/// exponential backoff with jitter, bounded by `max_attempts` and by the
/// caller's own deadline (checked by the operation itself via
/// `StoreTxn::check_deadline`).
pub fn with_deadlock_retry<T>(
    max_attempts: u32,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    use rand::Rng;
    let mut attempt = 0;
    loop {
        match op() {
            Err(ElderError::Deadlock) if attempt + 1 < max_attempts => {
                attempt += 1;
                let base_ms = 5u64 * (1 << attempt.min(10));
                let jitter_ms = rand::rng().random_range(0..base_ms.max(1));
                std::thread::sleep(Duration::from_millis(base_ms + jitter_ms));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::Tenant;

    fn tenant(id: Id) -> Tenant {
        Tenant {
            id,
            tenant_id: id,
            revision: 1,
            village_tenant_code: "00a1".to_string(),
            name: "t".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn rollback_undoes_insert() {
        let table: Table<Tenant> = Table::new();
        {
            let mut txn = StoreTxn::new(uuid::Uuid::new_v4(), None);
            txn.insert(&table, tenant(1)).unwrap();
            txn.rollback();
        }
        assert!(table.get(1).is_none());
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let table: Table<Tenant> = Table::new();
        {
            let mut txn = StoreTxn::new(uuid::Uuid::new_v4(), None);
            txn.insert(&table, tenant(1)).unwrap();
        }
        assert!(table.get(1).is_none());
    }

    #[test]
    fn commit_keeps_changes() {
        let table: Table<Tenant> = Table::new();
        {
            let mut txn = StoreTxn::new(uuid::Uuid::new_v4(), None);
            txn.insert(&table, tenant(1)).unwrap();
            txn.commit();
        }
        assert!(table.get(1).is_some());
    }

    #[test]
    fn deadline_exceeded_surfaces_cancellation() {
        let table: Table<Tenant> = Table::new();
        let mut txn = StoreTxn::new(uuid::Uuid::new_v4(), Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(2));
        let err = txn.insert(&table, tenant(1)).unwrap_err();
        assert_eq!(err.reason_code(), "cancelled_by_deadline");
    }
}
