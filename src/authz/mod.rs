//! # AuthZ
//!
//! Resolves the effective role of a principal against a resource and decides
//! whether an action is authorized. Sits below `GraphEngine` in the
//! layering (`spec.md` §2), so organization-ancestor walks here go straight
//! against `Store` rather than through `GraphEngine`'s cached adjacency —
//! `GraphEngine` depends on `AuthZ`-adjacent concepts, not the reverse.

mod action;

pub use action::Action;

use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::{Identity, PortalRole, Role, ScopeType};
use crate::store::Store;

/// What is being authorized against: the owning tenant plus, for
/// org/entity-scoped resources, the organization chain up to the tenant
/// root (closest ancestor first).
#[derive(Debug, Clone)]
pub struct ResourceScope {
    pub tenant_id: Id,
    pub resource_id: Id,
    pub resource_scope_type: ScopeType,
    /// For `Entity`/`Organization` scopes: the owning organization and its
    /// ancestors, closest first. Empty for tenant-scoped resources.
    pub organization_chain: Vec<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reason(pub &'static str);

pub struct AuthzEngine<'s> {
    store: &'s Store,
}

impl<'s> AuthzEngine<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Walks `parent_id` from `organization_id` to the tenant root, denying
    /// past `max_depth` exactly as `GraphEngine::hierarchy` does — corrupt
    /// trees must not be walked forever by either component.
    pub fn organization_chain(&self, organization_id: Id, max_depth: u32) -> Result<Vec<Id>> {
        let mut chain = Vec::new();
        let mut current = Some(organization_id);
        let mut depth = 0u32;
        while let Some(org_id) = current {
            if depth > max_depth {
                return Err(ElderError::DepthExceeded(format!(
                    "organization {organization_id} exceeds max depth {max_depth}"
                )));
            }
            chain.push(org_id);
            current = self.store.organizations.get(org_id).and_then(|o| o.parent_id);
            depth += 1;
        }
        Ok(chain)
    }

    fn groups_owning_ancestor(&self, organization_chain: &[Id]) -> Vec<Id> {
        organization_chain
            .iter()
            .filter_map(|org_id| self.store.organizations.get(*org_id))
            .filter_map(|org| org.owner_group_id)
            .collect()
    }

    fn identity_is_group_member(&self, identity_id: Id, group_id: Id) -> bool {
        self.store
            .memberships
            .list_by(|m| m.group_id == group_id && m.identity_id == identity_id)
            .into_iter()
            .any(|m| m.expires_at.map(|exp| exp > chrono::Utc::now()).unwrap_or(true))
    }

    /// Effective role: the max, by rank, of the identity's global portal
    /// role, any tenant-scoped grant on the owning tenant, any
    /// organization-scoped grant on the owning organization or an ancestor,
    /// any resource-scoped grant on the exact resource, and any grant
    /// inherited through group ownership of an ancestor organization.
    pub fn effective_role(&self, identity: &Identity, scope: &ResourceScope) -> Result<Role> {
        if identity.tenant_id != scope.tenant_id {
            return Err(ElderError::TenantMismatch);
        }

        let mut best = Role::from_portal_role(identity.portal_role);

        let grants = self
            .store
            .resource_roles
            .list_by(|r| r.identity_id == identity.id && r.tenant_id == scope.tenant_id);

        for grant in &grants {
            let applies = match grant.scope_type {
                ScopeType::Tenant => true,
                ScopeType::Organization => scope.organization_chain.contains(&grant.scope_id),
                ScopeType::Entity => {
                    scope.resource_scope_type == ScopeType::Entity
                        && grant.scope_id == scope.resource_id
                }
            };
            if applies && grant.role > best {
                best = grant.role;
            }
        }

        for group_id in self.groups_owning_ancestor(&scope.organization_chain) {
            if self.identity_is_group_member(identity.id, group_id) {
                if let Some(group) = self.store.groups.get(group_id) {
                    let group_grants = self.store.resource_roles.list_by(|r| {
                        r.tenant_id == scope.tenant_id
                            && r.scope_type == ScopeType::Organization
                            && scope.organization_chain.contains(&r.scope_id)
                            && group.owner_identity_ids.contains(&r.identity_id)
                    });
                    for grant in group_grants {
                        if grant.role > best {
                            best = grant.role;
                        }
                    }
                }
            }
        }

        Ok(best)
    }

    /// Authorizes `action` against `scope` for `identity`, returning a
    /// structured `Forbidden` reason on denial so it can be logged and
    /// returned to the caller verbatim.
    pub fn authorize(&self, identity: &Identity, action: Action, scope: &ResourceScope) -> Result<()> {
        if !identity.is_active {
            return Err(ElderError::Forbidden {
                reason: "identity_inactive".to_string(),
            });
        }

        let role = self.effective_role(identity, scope)?;
        let required = action.required_role();

        if action.requires_super_admin_for_cross_tenant() && identity.tenant_id != scope.tenant_id {
            if role < Role::SuperAdmin {
                return Err(ElderError::Forbidden {
                    reason: "cross_tenant_requires_super_admin".to_string(),
                });
            }
            return Ok(());
        }

        if role < required {
            tracing::info!(
                identity_id = identity.id,
                action = ?action,
                required = ?required,
                effective = ?role,
                "authorization denied"
            );
            return Err(ElderError::Forbidden {
                reason: "no_role_on_scope".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::*;

    fn identity(id: Id, tenant_id: Id, portal_role: PortalRole) -> Identity {
        Identity {
            id,
            tenant_id,
            revision: 1,
            village_id: "00a1-0000-00000001".to_string(),
            username: "i".to_string(),
            email: "i@example.com".to_string(),
            identity_type: IdentityType::Human,
            auth_provider: "internal".to_string(),
            portal_role,
            is_active: true,
            mfa_enabled: false,
            credential_fingerprint: None,
        }
    }

    fn org(id: Id, tenant_id: Id, parent_id: Option<Id>) -> Organization {
        Organization {
            id,
            tenant_id,
            revision: 1,
            village_id: format!("00a1-{id:04x}-00000000"),
            parent_id,
            name: format!("org{id}"),
            org_type: OrganizationType::Organization,
            owner_identity_id: None,
            owner_group_id: None,
            ldap_dn: None,
            saml_group: None,
        }
    }

    #[test]
    fn org_scoped_grant_inherits_to_descendants() {
        let store = Store::new();
        store.organizations.insert(org(1, 1, None)).unwrap(); // Eng
        store.organizations.insert(org(2, 1, Some(1))).unwrap(); // Platform
        let engine = AuthzEngine::new(&store);

        let grant = ResourceRole {
            id: 1,
            tenant_id: 1,
            revision: 1,
            identity_id: 10,
            scope_type: ScopeType::Organization,
            scope_id: 1,
            role: Role::Operator,
        };
        store.resource_roles.insert(grant).unwrap();

        let identity = identity(10, 1, PortalRole::Viewer);
        let chain = engine.organization_chain(2, 64).unwrap();
        assert_eq!(chain, vec![2, 1]);

        let scope = ResourceScope {
            tenant_id: 1,
            resource_id: 99,
            resource_scope_type: ScopeType::Entity,
            organization_chain: chain,
        };
        engine
            .authorize(&identity, Action::CreateEntity, &scope)
            .unwrap();
    }

    #[test]
    fn sibling_org_is_not_authorized() {
        let store = Store::new();
        store.organizations.insert(org(1, 1, None)).unwrap();
        store.organizations.insert(org(2, 1, Some(1))).unwrap();
        store.organizations.insert(org(3, 1, Some(1))).unwrap();
        let engine = AuthzEngine::new(&store);

        store
            .resource_roles
            .insert(ResourceRole {
                id: 1,
                tenant_id: 1,
                revision: 1,
                identity_id: 10,
                scope_type: ScopeType::Organization,
                scope_id: 2,
                role: Role::Operator,
            })
            .unwrap();

        let identity = identity(10, 1, PortalRole::Viewer);
        let chain = engine.organization_chain(3, 64).unwrap();
        let scope = ResourceScope {
            tenant_id: 1,
            resource_id: 1,
            resource_scope_type: ScopeType::Organization,
            organization_chain: chain,
        };
        let err = engine
            .authorize(&identity, Action::UpdateIssue, &scope)
            .unwrap_err();
        assert_eq!(err.reason_code(), "forbidden");
    }
}
