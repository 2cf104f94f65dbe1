//! # Store
//!
//! Transactional, key-addressable persistence over every table in the data
//! model (`spec.md` §3). The reference implementation, `Store`, stands in for
//! the relational backend: a single-process collection of sharded concurrent
//! tables (`DashMap`-backed, see `table::Table`) with row-level
//! optimistic-concurrency (`revision` CAS) instead of row locks, since there
//! is no external lock manager to coordinate with. `begin()` hands out a
//! `StoreTxn` that every Pipeline step shares; `commit`/`rollback` on that
//! handle decide whether the transaction's queued mutations stick.
//!
//! Counter rows backing Village-ID allocation live here too
//! (`village_id_counters`), since `spec.md` §4.2 requires the counter to be
//! locked inside the caller's transaction rather than cached.

pub mod model;
pub mod table;
pub mod txn;

use crate::common::Id;
use dashmap::DashMap;
use model::*;
use parking_lot::Mutex;
use table::Table;

/// `(tenant_id, organization_id)` — `organization_id = 0` for tenant-level
/// counters, per `spec.md` §4.2.
pub type CounterKey = (Id, Id);

pub struct Store {
    pub tenants: Table<Tenant>,
    pub organizations: Table<Organization>,
    pub entities: Table<Entity>,
    pub dependencies: Table<Dependency>,
    pub identities: Table<Identity>,
    pub resource_roles: Table<ResourceRole>,
    pub issues: Table<Issue>,
    pub labels: Table<Label>,
    pub issue_comments: Table<IssueComment>,
    pub milestones: Table<Milestone>,
    pub projects: Table<Project>,
    pub oncall_rotations: Table<OnCallRotation>,
    pub oncall_overrides: Table<OnCallOverride>,
    pub groups: Table<Group>,
    pub memberships: Table<Membership>,
    pub access_requests: Table<AccessRequest>,
    pub audit_records: Table<AuditRecord>,

    /// `village_id` string -> lookup row, for O(1) `IdAllocator::resolve`.
    pub village_id_lookup: DashMap<String, VillageIdLookup>,

    /// Per-`(tenant, org)` next-resource-counter, guarded by a per-bucket
    /// mutex so `allocate()` can increment-and-read atomically.
    village_id_counters: DashMap<CounterKey, Mutex<u32>>,

    /// Next internal tenant code counter (`TTTT`), process-wide.
    next_tenant_code: Mutex<u32>,
    /// Next internal organization code counter (`OOOO`), per tenant.
    next_org_codes: DashMap<Id, Mutex<u32>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            tenants: Table::new(),
            organizations: Table::new(),
            entities: Table::new(),
            dependencies: Table::new(),
            identities: Table::new(),
            resource_roles: Table::new(),
            issues: Table::new(),
            labels: Table::new(),
            issue_comments: Table::new(),
            milestones: Table::new(),
            projects: Table::new(),
            oncall_rotations: Table::new(),
            oncall_overrides: Table::new(),
            groups: Table::new(),
            memberships: Table::new(),
            access_requests: Table::new(),
            audit_records: Table::new(),
            village_id_lookup: DashMap::new(),
            village_id_counters: DashMap::new(),
            next_tenant_code: Mutex::new(1),
            next_org_codes: DashMap::new(),
        }
    }

    /// Starts a new transaction with an optional deadline. The returned
    /// handle borrows every table it touches for its own lifetime; callers
    /// thread it through `pipeline::Context`.
    pub fn begin(&self, correlation_id: uuid::Uuid, timeout: Option<std::time::Duration>) -> txn::StoreTxn<'_> {
        txn::StoreTxn::new(correlation_id, timeout)
    }

    /// Allocates the next 16-bit tenant code (`TTTT`), formatted lowercase hex.
    pub fn next_tenant_code(&self) -> String {
        let mut counter = self.next_tenant_code.lock();
        let code = *counter;
        *counter = counter.wrapping_add(1);
        format!("{:04x}", code & 0xffff)
    }

    /// Allocates the next 16-bit organization code (`OOOO`) within a tenant.
    pub fn next_org_code(&self, tenant_id: Id) -> String {
        let entry = self
            .next_org_codes
            .entry(tenant_id)
            .or_insert_with(|| Mutex::new(1));
        let mut counter = entry.lock();
        let code = *counter;
        *counter = counter.wrapping_add(1);
        format!("{:04x}", code & 0xffff)
    }

    /// Increments and returns the resource counter for `(tenant, org)`,
    /// locked for the duration of the call so two concurrent allocations in
    /// the same bucket never observe the same value.
    pub fn next_resource_counter(&self, tenant_id: Id, organization_id: Id) -> u32 {
        let entry = self
            .village_id_counters
            .entry((tenant_id, organization_id))
            .or_insert_with(|| Mutex::new(0));
        let mut counter = entry.lock();
        *counter += 1;
        *counter
    }
}
