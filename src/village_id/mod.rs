//! # IdAllocator
//!
//! Mints and resolves **Village-IDs**: `TTTT-OOOO-IIIIIIII` in lowercase hex
//! (16 + 16 + 32 bits). `TTTT` is stable per tenant lifetime, `OOOO` is
//! stable per organization lifetime (`0000` for tenant-level or non-org
//! resources), and `IIIIIIII` is a monotonically increasing counter within
//! `(tenant, organization)` (`00000000` for organization-level rows
//! themselves). Village-IDs are immutable once allocated: moving an entity
//! between organizations never changes its id.

use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::VillageIdKind;
use crate::store::Store;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static VILLAGE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)^[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{8}$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VillageIdResolution {
    pub kind: VillageIdKind,
    pub internal_id: Id,
    /// Canonical user-facing path, e.g. `/entities/{id}`.
    pub redirect_path: String,
}

fn canonical_path(kind: VillageIdKind, internal_id: Id) -> String {
    let segment = match kind {
        VillageIdKind::Tenant => "tenants",
        VillageIdKind::Organization => "organizations",
        VillageIdKind::Entity => "entities",
        VillageIdKind::Dependency => "dependencies",
        VillageIdKind::Identity => "identities",
        VillageIdKind::Issue => "issues",
    };
    format!("/{segment}/{internal_id}")
}

pub struct VillageIdAllocator<'s> {
    store: &'s Store,
}

impl<'s> VillageIdAllocator<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Mints a fresh Village-ID for `(kind, tenant, organization)`. The
    /// per-bucket resource counter is incremented atomically by the Store;
    /// exactly-once-per-commit is a property of that counter, not of this
    /// allocator, since the caller's transaction controls whether the row
    /// the id is attached to ever becomes visible.
    pub fn allocate(
        &self,
        kind: VillageIdKind,
        tenant_village_code: &str,
        organization_village_code: Option<&str>,
        tenant_id: Id,
        organization_id: Id,
    ) -> String {
        let org_code = organization_village_code.unwrap_or("0000");
        let counter = self.store.next_resource_counter(tenant_id, organization_id);
        let village_id = format!("{tenant_village_code}-{org_code}-{counter:08x}");
        debug_assert!(VILLAGE_ID_PATTERN.is_match(&village_id));
        let _ = kind;
        village_id
    }

    /// Records the lookup row so `resolve()` is O(1); called once per
    /// allocation, after the owning row itself has been inserted into the
    /// same transaction.
    pub fn register(&self, village_id: &str, kind: VillageIdKind, internal_id: Id, tenant_id: Id) {
        self.store.village_id_lookup.insert(
            village_id.to_lowercase(),
            crate::store::model::VillageIdLookup {
                village_id: village_id.to_lowercase(),
                kind,
                internal_id,
                tenant_id,
            },
        );
    }

    /// Validates the pattern (case-insensitive) and resolves to the resource
    /// kind, internal id, and canonical redirect path.
    pub fn resolve(&self, village_id: &str) -> Result<VillageIdResolution> {
        if !VILLAGE_ID_PATTERN.is_match(village_id) {
            return Err(ElderError::Malformed(village_id.to_string()));
        }
        let key = village_id.to_lowercase();
        let lookup = self
            .store
            .village_id_lookup
            .get(&key)
            .ok_or_else(|| ElderError::VillageIdUnknown(village_id.to_string()))?;
        Ok(VillageIdResolution {
            kind: lookup.kind,
            internal_id: lookup.internal_id,
            redirect_path: canonical_path(lookup.kind, lookup.internal_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::VillageIdKind;

    #[test]
    fn allocate_then_resolve_round_trips() {
        let store = Store::new();
        let allocator = VillageIdAllocator::new(&store);
        let village_id = allocator.allocate(VillageIdKind::Entity, "00a1", Some("0002"), 1, 2);
        assert_eq!(village_id, "00a1-0002-00000001");
        allocator.register(&village_id, VillageIdKind::Entity, 42, 1);

        let resolved = allocator.resolve(&village_id).unwrap();
        assert_eq!(resolved.internal_id, 42);
        assert_eq!(resolved.kind, VillageIdKind::Entity);
        assert_eq!(resolved.redirect_path, "/entities/42");
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let store = Store::new();
        let allocator = VillageIdAllocator::new(&store);
        allocator.register("00A1-0002-00000001", VillageIdKind::Entity, 42, 1);
        assert!(allocator.resolve("00a1-0002-00000001").is_ok());
    }

    #[test]
    fn malformed_id_is_rejected() {
        let store = Store::new();
        let allocator = VillageIdAllocator::new(&store);
        let err = allocator.resolve("not-a-village-id").unwrap_err();
        assert_eq!(err.reason_code(), "malformed");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = Store::new();
        let allocator = VillageIdAllocator::new(&store);
        let err = allocator.resolve("ffff-ffff-ffffffff").unwrap_err();
        assert_eq!(err.reason_code(), "village_id_unknown");
    }

    #[test]
    fn moving_entity_between_orgs_does_not_change_its_id() {
        // Village-IDs are immutable after allocation; re-registering under a
        // different tenant/org code is not part of the contract of `resolve`.
        let store = Store::new();
        let allocator = VillageIdAllocator::new(&store);
        let village_id = allocator.allocate(VillageIdKind::Entity, "00a1", Some("0002"), 1, 2);
        allocator.register(&village_id, VillageIdKind::Entity, 42, 1);
        let before = allocator.resolve(&village_id).unwrap();
        // No re-allocation call exists for a move; the id is simply kept.
        let after = allocator.resolve(&village_id).unwrap();
        assert_eq!(before, after);
    }
}
