//! Record types persisted by the Store. Every table row carries `id`,
//! `tenant_id`, and `revision`; the `StoreRecord` trait in `super::table`
//! projects those three fields without per-table boilerplate.

use crate::common::{Id, Revision, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Implemented by every row type so `Table<T>` can enforce revision-CAS and
/// tenant isolation without the caller restating those fields per table.
pub trait StoreRecord: Clone + Send + Sync + 'static {
    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);
    fn tenant_id(&self) -> Id;
    fn revision(&self) -> Revision;
    fn set_revision(&mut self, revision: Revision);
}

macro_rules! impl_store_record {
    ($ty:ty) => {
        impl StoreRecord for $ty {
            fn id(&self) -> Id {
                self.id
            }
            fn set_id(&mut self, id: Id) {
                self.id = id;
            }
            fn tenant_id(&self) -> Id {
                self.tenant_id
            }
            fn revision(&self) -> Revision {
                self.revision
            }
            fn set_revision(&mut self, revision: Revision) {
                self.revision = revision;
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: Id,
    /// Tenant-specific only: a tenant owns itself, so `tenant_id == id`.
    pub tenant_id: Id,
    pub revision: Revision,
    pub village_tenant_code: String,
    pub name: String,
    pub is_active: bool,
}
impl_store_record!(Tenant);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrganizationType {
    Department,
    Organization,
    Team,
    Collection,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub village_id: String,
    pub parent_id: Option<Id>,
    pub name: String,
    pub org_type: OrganizationType,
    pub owner_identity_id: Option<Id>,
    pub owner_group_id: Option<Id>,
    pub ldap_dn: Option<String>,
    pub saml_group: Option<String>,
}
impl_store_record!(Organization);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    Compute,
    Network,
    Storage,
    Database,
    User,
    SecurityIssue,
    Service,
    Datacenter,
    Vpc,
    Subnet,
    Application,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub village_id: String,
    pub organization_id: Id,
    pub entity_type: EntityType,
    pub name: String,
    pub attributes: HashMap<String, Value>,
    pub tags: HashSet<String>,
    pub is_active: bool,
}
impl_store_record!(Entity);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DependencyType {
    Runtime,
    Network,
    Application,
    Database,
    Related,
    ParentOf,
}

impl DependencyType {
    /// Edge types whose subgraph must remain acyclic (the "hard subgraph").
    pub fn is_hard(self) -> bool {
        matches!(
            self,
            DependencyType::Runtime
                | DependencyType::Network
                | DependencyType::Application
                | DependencyType::Database
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub source_entity_id: Id,
    pub target_entity_id: Id,
    pub dependency_type: DependencyType,
    pub metadata: HashMap<String, Value>,
}
impl_store_record!(Dependency);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IdentityType {
    Human,
    ServiceAccount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortalRole {
    Viewer,
    Editor,
    Admin,
    SuperAdmin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub village_id: String,
    pub username: String,
    pub email: String,
    pub identity_type: IdentityType,
    pub auth_provider: String,
    pub portal_role: PortalRole,
    pub is_active: bool,
    pub mfa_enabled: bool,
    /// SHA-256 fingerprint of the credential; the credential itself is never
    /// stored here.
    pub credential_fingerprint: Option<String>,
}
impl_store_record!(Identity);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Tenant,
    Organization,
    Entity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Viewer,
    Operator,
    Maintainer,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Effective role is the max, by rank, of `PortalRole` and resource-scoped
    /// `Role` grants; this maps the (smaller) portal-role lattice onto it.
    pub fn from_portal_role(portal: PortalRole) -> Role {
        match portal {
            PortalRole::Viewer => Role::Viewer,
            PortalRole::Editor => Role::Operator,
            PortalRole::Admin => Role::Admin,
            PortalRole::SuperAdmin => Role::SuperAdmin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRole {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub identity_id: Id,
    pub scope_type: ScopeType,
    pub scope_id: Id,
    pub role: Role,
}
impl_store_record!(ResourceRole);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Reopened,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub organization_id: Option<Id>,
    pub title: String,
    pub status: IssueStatus,
    pub priority: u8,
    pub severity: u8,
    pub assignee_id: Option<Id>,
    pub is_incident: bool,
    pub label_ids: HashSet<Id>,
    pub linked_entity_ids: HashSet<Id>,
}
impl_store_record!(Issue);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub name: String,
    pub color: String,
}
impl_store_record!(Label);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueComment {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub issue_id: Id,
    pub author_id: Id,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
impl_store_record!(IssueComment);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MilestoneStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub organization_id: Id,
    pub name: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: MilestoneStatus,
}
impl_store_record!(Milestone);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub organization_id: Id,
    pub name: String,
    pub status: MilestoneStatus,
}
impl_store_record!(Project);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OnCallScopeType {
    Organization,
    Service,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnCallShift {
    pub identity_id: Id,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnCallRotation {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub scope_type: OnCallScopeType,
    pub scope_id: Id,
    pub priority: i32,
    pub shifts: Vec<OnCallShift>,
}
impl_store_record!(OnCallRotation);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnCallOverride {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub scope_type: OnCallScopeType,
    pub scope_id: Id,
    pub identity_id: Id,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
impl_store_record!(OnCallOverride);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ApprovalMode {
    Any,
    All,
    Threshold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GroupProvider {
    Internal,
    Ldap,
    Okta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub name: String,
    pub owner_identity_id: Id,
    pub owner_identity_ids: HashSet<Id>,
    pub approval_mode: ApprovalMode,
    pub approval_threshold: u32,
    pub provider: GroupProvider,
    pub sync_enabled: bool,
}
impl_store_record!(Group);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub group_id: Id,
    pub identity_id: Id,
    pub expires_at: Option<DateTime<Utc>>,
}
impl_store_record!(Membership);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccessRequestState {
    Pending,
    Approved,
    Denied,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRecord {
    pub owner_identity_id: Id,
    pub decision: ApprovalDecision,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessRequest {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub group_id: Id,
    pub requester_id: Id,
    pub reason: String,
    pub state: AccessRequestState,
    pub approvals: Vec<ApprovalRecord>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub membership_id: Option<Id>,
}
impl_store_record!(AccessRequest);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: Id,
    pub tenant_id: Id,
    pub revision: Revision,
    pub timestamp: DateTime<Utc>,
    pub principal_id: Option<Id>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Id,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
    pub outcome: AuditOutcome,
    pub correlation_id: uuid::Uuid,
    pub reason_code: Option<String>,
}
impl_store_record!(AuditRecord);

/// Maps a Village-ID to the internal `(kind, id)` it resolves to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VillageIdKind {
    Tenant,
    Organization,
    Entity,
    Dependency,
    Identity,
    Issue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VillageIdLookup {
    pub village_id: String,
    pub kind: VillageIdKind,
    pub internal_id: Id,
    pub tenant_id: Id,
}
