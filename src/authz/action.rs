//! The (non-exhaustive, per spec) action table mapping a mutation or read to
//! the role rank it requires.

use crate::store::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateOrganization,
    DeleteOrganization,
    ChangeOrganizationParent,
    CreateEntity,
    UpdateEntity,
    DeleteEntity,
    CreateDependency,
    UpdateDependency,
    DeleteDependency,
    ManageIdentity,
    ManageTenantConfig,
    ManageSyncConfig,
    ManageLicensePolicy,
    ReadResource,
    ReadSensitiveField,
    CreateIssue,
    UpdateIssue,
    DeleteIssue,
    /// Milestones, projects, labels, and issue comments are thin CRUD on
    /// secondary tables (`spec.md` §1 Non-goals scope out bespoke
    /// treatment, not existence) — they reuse one action at `operator`
    /// rank rather than growing a bespoke action per resource.
    ManageSecondaryResource,
    ManageResourceRole,
    ManageGroup,
    DecideAccessRequest,
    ManageOnCall,
    ReadOnCall,
    ReadAuditLog,
    PurgeAuditLog,
}

impl Action {
    pub fn required_role(self) -> Role {
        match self {
            Action::ReadResource | Action::ReadOnCall => Role::Viewer,
            Action::ReadSensitiveField => Role::Operator,
            Action::CreateEntity | Action::UpdateEntity | Action::DeleteEntity => Role::Operator,
            Action::CreateDependency | Action::UpdateDependency | Action::DeleteDependency => {
                Role::Operator
            }
            Action::CreateIssue | Action::UpdateIssue => Role::Operator,
            Action::DeleteIssue => Role::Operator,
            Action::ManageSecondaryResource => Role::Operator,
            Action::CreateOrganization
            | Action::DeleteOrganization
            | Action::ChangeOrganizationParent => Role::Maintainer,
            Action::ManageResourceRole => Role::Maintainer,
            Action::ManageGroup => Role::Maintainer,
            Action::ManageOnCall => Role::Maintainer,
            Action::DecideAccessRequest => Role::Operator,
            Action::ReadAuditLog => Role::Operator,
            Action::ManageIdentity
            | Action::ManageTenantConfig
            | Action::ManageSyncConfig
            | Action::ManageLicensePolicy => Role::Admin,
            Action::PurgeAuditLog => Role::Admin,
        }
    }

    /// MFA bypass and cross-tenant reads require `super_admin`, per
    /// `spec.md` §4.3 and the cross-tenant Open Question resolved in
    /// `DESIGN.md` (allowed, but only for `super_admin`).
    pub fn requires_super_admin_for_cross_tenant(self) -> bool {
        true
    }
}
