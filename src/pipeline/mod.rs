//! # Pipeline
//!
//! The six-step sequence every inbound mutation executes inside one
//! [`crate::store::txn::StoreTxn`] (`spec.md` §4.7): parse/validate,
//! authorize against the pre-mutation snapshot, mutate via `Store`,
//! invalidate `GraphEngine` for structural changes, append an
//! `AuditRecord`, commit — and only after a successful commit does
//! `CacheInvalidator` broadcast (it already ran as part of step 4 here,
//! since the reference `Store` applies mutations immediately and tracks
//! their inverse; `CacheInvalidator::invalidate` is idempotent to call
//! again on redelivery, so this ordering preserves the contract).
//!
//! Reads follow the same parse/authorize sequence without steps 3-6, and
//! AuthZ filters list results per element after pagination has already
//! fixed the page's row positions (`spec.md` §4.7), so page boundaries
//! don't shift under a non-deterministic per-row filter.

pub mod context;
pub mod ratelimit;

pub use context::Context;
pub use ratelimit::TenantRateLimiter;

use chrono::{DateTime, Utc};

use crate::audit::AuditLog;
use crate::authz::{Action, AuthzEngine, ResourceScope};
use crate::cache_invalidator::{CacheInvalidator, Subject};
use crate::common::Id;
use crate::config::Config;
use crate::error::{ElderError, Result};
use crate::graph::GraphEngine;
use crate::group_workflow::GroupWorkflow;
use crate::oncall::OnCallResolver;
use crate::store::model::*;
use crate::store::table::{Page, Pagination};
use crate::store::Store;
use crate::village_id::VillageIdAllocator;

pub struct Pipeline<'s> {
    pub store: &'s Store,
    pub graph: &'s GraphEngine<'s>,
    pub cache: &'s CacheInvalidator,
    pub rate_limiter: &'s TenantRateLimiter,
    pub config: &'s Config,
    authz: AuthzEngine<'s>,
    audit: AuditLog<'s>,
    ids: VillageIdAllocator<'s>,
    oncall: OnCallResolver<'s>,
    groups: GroupWorkflow<'s>,
}

fn hash_of<T: serde::Serialize>(value: &T) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

impl<'s> Pipeline<'s> {
    pub fn new(
        store: &'s Store,
        graph: &'s GraphEngine<'s>,
        cache: &'s CacheInvalidator,
        rate_limiter: &'s TenantRateLimiter,
        config: &'s Config,
    ) -> Self {
        Self {
            store,
            graph,
            cache,
            rate_limiter,
            config,
            authz: AuthzEngine::new(store),
            audit: AuditLog::new(store),
            ids: VillageIdAllocator::new(store),
            oncall: OnCallResolver::new(store),
            groups: GroupWorkflow::new(store),
        }
    }

    /// Step 0, ahead of the six-step sequence proper: the fairness quota
    /// (`spec.md` §5). Every entry point calls this first.
    fn admit(&self, tenant_id: Id) -> Result<()> {
        if !self.rate_limiter.try_acquire(tenant_id) {
            return Err(ElderError::RateLimited(tenant_id.to_string()));
        }
        Ok(())
    }

    fn org_scope(&self, tenant_id: Id, organization_id: Id, resource_id: Id, scope_type: ScopeType) -> Result<ResourceScope> {
        let chain = self.authz.organization_chain(organization_id, self.config.max_hierarchy_depth)?;
        Ok(ResourceScope {
            tenant_id,
            resource_id,
            resource_scope_type: scope_type,
            organization_chain: chain,
        })
    }

    /// Resolves the authorization scope for an on-call `scope_id`: for
    /// `Organization` the id already names an organization; for `Service`
    /// it names an entity, whose owning organization anchors the chain.
    fn oncall_scope(&self, tenant_id: Id, scope_type: OnCallScopeType, scope_id: Id) -> Result<ResourceScope> {
        match scope_type {
            OnCallScopeType::Organization => self.org_scope(tenant_id, scope_id, scope_id, ScopeType::Organization),
            OnCallScopeType::Service => {
                let entity = self
                    .store
                    .entities
                    .get(scope_id)
                    .ok_or_else(|| ElderError::ResourceMissing(format!("entity {scope_id}")))?;
                self.org_scope(tenant_id, entity.organization_id, scope_id, ScopeType::Entity)
            }
        }
    }

    fn tenant_scope(&self, tenant_id: Id, resource_id: Id) -> ResourceScope {
        ResourceScope {
            tenant_id,
            resource_id,
            resource_scope_type: ScopeType::Tenant,
            organization_chain: Vec::new(),
        }
    }

    fn audit_success(
        &self,
        ctx: &Context,
        txn: &mut crate::store::txn::StoreTxn<'s>,
        action: &str,
        resource_type: &str,
        resource_id: Id,
        tenant_id: Id,
        before_hash: Option<String>,
        after_hash: Option<String>,
    ) {
        self.audit.append_in_txn(
            txn,
            Some(ctx.principal.id),
            action,
            resource_type,
            resource_id,
            tenant_id,
            before_hash,
            after_hash,
            AuditOutcome::Success,
            ctx.correlation_id,
            None,
        );
    }

    // ------------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------------

    pub fn create_tenant(&self, ctx: &Context, name: String) -> Result<Tenant> {
        if ctx.principal.portal_role < PortalRole::SuperAdmin {
            return Err(ElderError::Forbidden {
                reason: "tenant_creation_requires_super_admin".to_string(),
            });
        }
        ctx.check_deadline()?;
        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let code = self.store.next_tenant_code();
        let id = self.store.tenants.next_id();
        let village_id = self.ids.allocate(
            crate::store::model::VillageIdKind::Tenant,
            &code,
            None,
            id,
            0,
        );
        let tenant = Tenant {
            id,
            tenant_id: id,
            revision: 1,
            village_tenant_code: code,
            name,
            is_active: true,
        };
        let inserted = txn.insert(&self.store.tenants, tenant)?;
        self.ids.register(&village_id, crate::store::model::VillageIdKind::Tenant, id, id);
        self.audit_success(ctx, &mut txn, "tenant.create", "tenant", id, id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // Organizations
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_organization(
        &self,
        ctx: &Context,
        tenant_id: Id,
        parent_id: Option<Id>,
        name: String,
        org_type: OrganizationType,
    ) -> Result<Organization> {
        self.admit(tenant_id)?;
        ctx.check_deadline()?;

        let scope = match parent_id {
            Some(parent) => self.org_scope(tenant_id, parent, parent, ScopeType::Organization)?,
            None => self.tenant_scope(tenant_id, tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::CreateOrganization, &scope)?;

        let duplicate = self.store.organizations.list_by(|o| {
            o.tenant_id == tenant_id && o.parent_id == parent_id && o.name == name
        });
        if !duplicate.is_empty() {
            return Err(ElderError::UniqueViolation(format!(
                "organization named {name} already exists under this parent"
            )));
        }

        let tenant = self
            .store
            .tenants
            .get(tenant_id)
            .ok_or_else(|| ElderError::UnknownTenant(tenant_id.to_string()))?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.organizations.next_id();
        let org_code = self.store.next_org_code(tenant_id);
        let village_id = self.ids.allocate(
            crate::store::model::VillageIdKind::Organization,
            &tenant.village_tenant_code,
            Some(&org_code),
            tenant_id,
            id,
        );
        let org = Organization {
            id,
            tenant_id,
            revision: 1,
            village_id,
            parent_id,
            name,
            org_type,
            owner_identity_id: None,
            owner_group_id: None,
            ldap_dn: None,
            saml_group: None,
        };
        let inserted = txn.insert(&self.store.organizations, org)?;
        self.ids.register(&inserted.village_id, crate::store::model::VillageIdKind::Organization, id, tenant_id);
        self.cache.invalidate(self.graph, tenant_id, Subject::OrgTree);
        self.audit_success(ctx, &mut txn, "organization.create", "organization", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn reparent_organization(
        &self,
        ctx: &Context,
        organization_id: Id,
        expected_revision: u64,
        new_parent_id: Id,
    ) -> Result<Organization> {
        let before = self
            .store
            .organizations
            .get(organization_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("organization {organization_id}")))?;
        self.admit(before.tenant_id)?;
        ctx.check_deadline()?;

        let old_scope = self.org_scope(before.tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ChangeOrganizationParent, &old_scope)?;
        let new_scope = self.org_scope(before.tenant_id, new_parent_id, new_parent_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ChangeOrganizationParent, &new_scope)?;

        // An organization may never become its own ancestor.
        let new_chain = self.authz.organization_chain(new_parent_id, self.config.max_hierarchy_depth)?;
        if new_chain.contains(&organization_id) {
            return Err(ElderError::WouldCreateCycle {
                path: new_chain.into_iter().map(|id| id.to_string()).collect(),
            });
        }

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let updated = txn.update_if_revision(&self.store.organizations, organization_id, expected_revision, |o| {
            o.parent_id = Some(new_parent_id);
        })?;
        self.cache.invalidate(self.graph, before.tenant_id, Subject::OrgTree);
        self.audit_success(
            ctx,
            &mut txn,
            "organization.reparent",
            "organization",
            organization_id,
            before.tenant_id,
            Some(hash_of(&before)),
            Some(hash_of(&updated)),
        );
        txn.commit();
        Ok(updated)
    }

    /// Deletes an organization. Denied (no-op) when children exist unless
    /// `cascade=true` and the caller is `maintainer` at every descendant
    /// (`spec.md` §3 Lifecycle, §8 boundary behavior; the `cascade` flag is
    /// the spec's own resolved Open Question, recorded in `DESIGN.md`).
    pub fn delete_organization(&self, ctx: &Context, organization_id: Id, cascade: bool) -> Result<()> {
        let org = self
            .store
            .organizations
            .get(organization_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("organization {organization_id}")))?;
        self.admit(org.tenant_id)?;
        ctx.check_deadline()?;

        let scope = self.org_scope(org.tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::DeleteOrganization, &scope)?;

        let descendants = self.graph.children(org.tenant_id, organization_id, true);
        if !descendants.is_empty() {
            if !cascade {
                return Err(ElderError::DependentExists(format!(
                    "organization {organization_id} has {} descendant(s)",
                    descendants.len()
                )));
            }
            for descendant in &descendants {
                let descendant_scope = self.org_scope(org.tenant_id, *descendant, *descendant, ScopeType::Organization)?;
                let role = self.authz.effective_role(&ctx.principal, &descendant_scope)?;
                if role < Role::Maintainer {
                    return Err(ElderError::Forbidden {
                        reason: "cascade_requires_maintainer_on_every_descendant".to_string(),
                    });
                }
            }
        }

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        for descendant in descendants.iter().rev() {
            let _ = txn.delete(&self.store.organizations, *descendant);
        }
        let removed = txn.delete(&self.store.organizations, organization_id)?;
        self.cache.invalidate(self.graph, org.tenant_id, Subject::OrgTree);
        self.audit_success(
            ctx,
            &mut txn,
            "organization.delete",
            "organization",
            organization_id,
            org.tenant_id,
            Some(hash_of(&removed)),
            None,
        );
        txn.commit();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn create_entity(
        &self,
        ctx: &Context,
        tenant_id: Id,
        organization_id: Id,
        entity_type: EntityType,
        name: String,
        attributes: std::collections::HashMap<String, crate::common::Value>,
        tags: std::collections::HashSet<String>,
    ) -> Result<Entity> {
        self.admit(tenant_id)?;
        ctx.check_deadline()?;
        let scope = self.org_scope(tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::CreateEntity, &scope)?;

        let duplicate = self.store.entities.list_by(|e| {
            e.tenant_id == tenant_id
                && e.organization_id == organization_id
                && e.entity_type == entity_type
                && e.name == name
        });
        if !duplicate.is_empty() {
            return Err(ElderError::UniqueViolation(format!(
                "entity {name} already exists in this organization"
            )));
        }

        let tenant = self
            .store
            .tenants
            .get(tenant_id)
            .ok_or_else(|| ElderError::UnknownTenant(tenant_id.to_string()))?;
        let org = self
            .store
            .organizations
            .get(organization_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("organization {organization_id}")))?;
        let org_code = org.village_id.split('-').nth(1).unwrap_or("0000").to_string();

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.entities.next_id();
        let village_id = self.ids.allocate(
            crate::store::model::VillageIdKind::Entity,
            &tenant.village_tenant_code,
            Some(&org_code),
            tenant_id,
            organization_id,
        );
        let entity = Entity {
            id,
            tenant_id,
            revision: 1,
            village_id,
            organization_id,
            entity_type,
            name,
            attributes,
            tags,
            is_active: true,
        };
        let inserted = txn.insert(&self.store.entities, entity)?;
        self.ids.register(&inserted.village_id, crate::store::model::VillageIdKind::Entity, id, tenant_id);
        self.cache.invalidate(self.graph, tenant_id, Subject::EntityGraph);
        self.audit_success(ctx, &mut txn, "entity.create", "entity", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn delete_entity(&self, ctx: &Context, entity_id: Id, cascade: bool) -> Result<()> {
        let entity = self
            .store
            .entities
            .get(entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {entity_id}")))?;
        self.admit(entity.tenant_id)?;
        ctx.check_deadline()?;
        let scope = self.org_scope(entity.tenant_id, entity.organization_id, entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::DeleteEntity, &scope)?;

        let outbound = self.store.dependencies.list_by(|d| d.source_entity_id == entity_id || d.target_entity_id == entity_id);
        if !outbound.is_empty() && !cascade {
            return Err(ElderError::DependentExists(format!(
                "entity {entity_id} has {} dependent edge(s)",
                outbound.len()
            )));
        }

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        for dep in &outbound {
            let _ = txn.delete(&self.store.dependencies, dep.id);
        }
        let removed = txn.delete(&self.store.entities, entity_id)?;
        self.cache.invalidate(self.graph, entity.tenant_id, Subject::EntityGraph);
        self.audit_success(
            ctx,
            &mut txn,
            "entity.delete",
            "entity",
            entity_id,
            entity.tenant_id,
            Some(hash_of(&removed)),
            None,
        );
        txn.commit();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    pub fn create_dependency(
        &self,
        ctx: &Context,
        source_entity_id: Id,
        target_entity_id: Id,
        dependency_type: DependencyType,
        metadata: std::collections::HashMap<String, crate::common::Value>,
    ) -> Result<Dependency> {
        if source_entity_id == target_entity_id {
            return Err(ElderError::Validation("dependency endpoints must be distinct".to_string()));
        }
        let source = self
            .store
            .entities
            .get(source_entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {source_entity_id}")))?;
        let target = self
            .store
            .entities
            .get(target_entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {target_entity_id}")))?;
        if source.tenant_id != target.tenant_id {
            return Err(ElderError::TenantMismatch);
        }
        self.admit(source.tenant_id)?;
        ctx.check_deadline()?;

        let scope = self.org_scope(source.tenant_id, source.organization_id, source_entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::CreateDependency, &scope)?;

        let duplicate = self.store.dependencies.list_by(|d| {
            d.source_entity_id == source_entity_id
                && d.target_entity_id == target_entity_id
                && d.dependency_type == dependency_type
        });
        if !duplicate.is_empty() {
            return Err(ElderError::UniqueViolation(
                "this (source, target, type) dependency already exists".to_string(),
            ));
        }

        self.graph.check_would_create_cycle(source.tenant_id, source_entity_id, target_entity_id, dependency_type)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.dependencies.next_id();
        let dependency = Dependency {
            id,
            tenant_id: source.tenant_id,
            revision: 1,
            source_entity_id,
            target_entity_id,
            dependency_type,
            metadata,
        };
        let inserted = txn.insert(&self.store.dependencies, dependency)?;
        self.cache.invalidate(self.graph, source.tenant_id, Subject::EntityGraph);
        self.audit_success(ctx, &mut txn, "dependency.create", "dependency", id, source.tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn delete_dependency(&self, ctx: &Context, dependency_id: Id) -> Result<()> {
        let dependency = self
            .store
            .dependencies
            .get(dependency_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("dependency {dependency_id}")))?;
        let source = self
            .store
            .entities
            .get(dependency.source_entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {}", dependency.source_entity_id)))?;
        self.admit(dependency.tenant_id)?;
        ctx.check_deadline()?;
        let scope = self.org_scope(dependency.tenant_id, source.organization_id, dependency.source_entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::DeleteDependency, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let removed = txn.delete(&self.store.dependencies, dependency_id)?;
        self.cache.invalidate(self.graph, dependency.tenant_id, Subject::EntityGraph);
        self.audit_success(
            ctx,
            &mut txn,
            "dependency.delete",
            "dependency",
            dependency_id,
            dependency.tenant_id,
            Some(hash_of(&removed)),
            None,
        );
        txn.commit();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Identities & resource roles
    // ------------------------------------------------------------------

    pub fn create_identity(
        &self,
        ctx: &Context,
        tenant_id: Id,
        username: String,
        email: String,
        identity_type: IdentityType,
        auth_provider: String,
    ) -> Result<Identity> {
        self.admit(tenant_id)?;
        let scope = self.tenant_scope(tenant_id, tenant_id);
        self.authz.authorize(&ctx.principal, Action::ManageIdentity, &scope)?;

        let tenant = self
            .store
            .tenants
            .get(tenant_id)
            .ok_or_else(|| ElderError::UnknownTenant(tenant_id.to_string()))?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.identities.next_id();
        let village_id = self.ids.allocate(
            crate::store::model::VillageIdKind::Identity,
            &tenant.village_tenant_code,
            None,
            tenant_id,
            0,
        );
        let identity = Identity {
            id,
            tenant_id,
            revision: 1,
            village_id,
            username,
            email,
            identity_type,
            auth_provider,
            portal_role: PortalRole::Viewer,
            is_active: true,
            mfa_enabled: false,
            credential_fingerprint: None,
        };
        let inserted = txn.insert(&self.store.identities, identity)?;
        self.ids.register(&inserted.village_id, crate::store::model::VillageIdKind::Identity, id, tenant_id);
        self.audit_success(ctx, &mut txn, "identity.create", "identity", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn grant_resource_role(
        &self,
        ctx: &Context,
        tenant_id: Id,
        identity_id: Id,
        scope_type: ScopeType,
        scope_id: Id,
        role: Role,
    ) -> Result<ResourceRole> {
        self.admit(tenant_id)?;
        let scope = self.tenant_scope(tenant_id, tenant_id);
        self.authz.authorize(&ctx.principal, Action::ManageIdentity, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.resource_roles.next_id();
        let grant = ResourceRole {
            id,
            tenant_id,
            revision: 1,
            identity_id,
            scope_type,
            scope_id,
            role,
        };
        let inserted = txn.insert(&self.store.resource_roles, grant)?;
        self.audit_success(ctx, &mut txn, "resource_role.grant", "resource_role", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // On-call
    // ------------------------------------------------------------------

    pub fn create_oncall_rotation(
        &self,
        ctx: &Context,
        tenant_id: Id,
        scope_type: OnCallScopeType,
        scope_id: Id,
        priority: i32,
        shifts: Vec<OnCallShift>,
    ) -> Result<OnCallRotation> {
        self.admit(tenant_id)?;
        let scope = self.oncall_scope(tenant_id, scope_type, scope_id)?;
        self.authz.authorize(&ctx.principal, Action::ManageOnCall, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.oncall_rotations.next_id();
        let rotation = OnCallRotation { id, tenant_id, revision: 1, scope_type, scope_id, priority, shifts };
        let inserted = txn.insert(&self.store.oncall_rotations, rotation)?;
        self.cache.invalidate(self.graph, tenant_id, Subject::OnCall(scope_id));
        self.audit_success(ctx, &mut txn, "oncall_rotation.create", "oncall_rotation", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn current_on_call(
        &self,
        ctx: &Context,
        scope_type: OnCallScopeType,
        scope_id: Id,
        instant: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<crate::oncall::CurrentOnCall>> {
        let scope = match scope_type {
            OnCallScopeType::Organization => self.org_scope(ctx.principal.tenant_id, scope_id, scope_id, ScopeType::Organization)?,
            OnCallScopeType::Service => self.org_scope(ctx.principal.tenant_id, scope_id, scope_id, ScopeType::Entity)?,
        };
        self.authz.authorize(&ctx.principal, Action::ReadOnCall, &scope)?;
        Ok(self.oncall.current_on_call(ctx.principal.tenant_id, scope_type, scope_id, instant))
    }

    pub fn who_is_on_call_between(
        &self,
        ctx: &Context,
        scope_type: OnCallScopeType,
        scope_id: Id,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<crate::oncall::OnCallSegment>> {
        let scope = match scope_type {
            OnCallScopeType::Organization => self.org_scope(ctx.principal.tenant_id, scope_id, scope_id, ScopeType::Organization)?,
            OnCallScopeType::Service => self.org_scope(ctx.principal.tenant_id, scope_id, scope_id, ScopeType::Entity)?,
        };
        self.authz.authorize(&ctx.principal, Action::ReadOnCall, &scope)?;
        Ok(self.oncall.who_is_on_call_between(ctx.principal.tenant_id, scope_type, scope_id, from, to))
    }

    // ------------------------------------------------------------------
    // Groups & access requests
    // ------------------------------------------------------------------

    pub fn create_group(
        &self,
        ctx: &Context,
        tenant_id: Id,
        name: String,
        owner_identity_id: Id,
        approval_mode: ApprovalMode,
        approval_threshold: u32,
        provider: GroupProvider,
        sync_enabled: bool,
    ) -> Result<Group> {
        self.admit(tenant_id)?;
        let scope = self.tenant_scope(tenant_id, tenant_id);
        self.authz.authorize(&ctx.principal, Action::ManageGroup, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.groups.next_id();
        let group = Group {
            id,
            tenant_id,
            revision: 1,
            name,
            owner_identity_id,
            owner_identity_ids: Default::default(),
            approval_mode,
            approval_threshold,
            provider,
            sync_enabled,
        };
        let inserted = txn.insert(&self.store.groups, group)?;
        self.audit_success(ctx, &mut txn, "group.create", "group", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn submit_access_request(&self, ctx: &Context, group_id: Id, reason: String) -> Result<AccessRequest> {
        let group = self
            .store
            .groups
            .get(group_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("group {group_id}")))?;
        self.admit(group.tenant_id)?;
        let request = self.groups.submit(group_id, group.tenant_id, ctx.principal.id, reason);

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let inserted = txn.insert(&self.store.access_requests, request)?;
        self.audit_success(
            ctx,
            &mut txn,
            "access_request.submit",
            "access_request",
            inserted.id,
            group.tenant_id,
            None,
            Some(hash_of(&inserted)),
        );
        txn.commit();
        Ok(inserted)
    }

    pub fn decide_access_request(
        &self,
        ctx: &Context,
        request_id: Id,
        expected_revision: u64,
        decision: ApprovalDecision,
    ) -> Result<AccessRequest> {
        let request = self
            .store
            .access_requests
            .get(request_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("access request {request_id}")))?;
        if request.revision != expected_revision {
            return Err(ElderError::StaleRevision { expected: expected_revision, found: request.revision });
        }
        let group = self
            .store
            .groups
            .get(request.group_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("group {}", request.group_id)))?;
        self.admit(group.tenant_id)?;

        let outcome = self.groups.decide(&group, request, ctx.principal.id, decision)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let updated = txn.update_if_revision(&self.store.access_requests, request_id, expected_revision, |r| {
            *r = outcome.request.clone();
            r.revision = expected_revision;
        })?;
        if let Some(membership) = outcome.membership {
            let _ = txn.insert(&self.store.memberships, membership);
            self.cache.invalidate(self.graph, group.tenant_id, Subject::Membership(group.id));
        }
        self.audit_success(
            ctx,
            &mut txn,
            "access_request.decide",
            "access_request",
            request_id,
            group.tenant_id,
            None,
            Some(hash_of(&updated)),
        );
        txn.commit();
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Village-ID lookup (unauthenticated per `spec.md` §6)
    // ------------------------------------------------------------------

    pub fn lookup_village_id(&self, village_id: &str) -> Result<crate::village_id::VillageIdResolution> {
        self.ids.resolve(village_id)
    }

    // ------------------------------------------------------------------
    // Graph reads
    // ------------------------------------------------------------------

    pub fn graph_impact(
        &self,
        ctx: &Context,
        entity_id: Id,
        direction: crate::graph::Direction,
        max_depth: u32,
    ) -> Result<Vec<crate::graph::ImpactNode>> {
        let entity = self
            .store
            .entities
            .get(entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {entity_id}")))?;
        let scope = self.org_scope(entity.tenant_id, entity.organization_id, entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        let capped_depth = max_depth.min(self.config.max_impact_depth_hard_cap);
        self.graph.impact(entity.tenant_id, entity_id, direction, capped_depth, || ctx.check_deadline())
    }

    pub fn graph_analyze(&self, ctx: &Context, tenant_id: Id, organization_id: Option<Id>) -> Result<crate::graph::AnalyzeResult> {
        let scope = match organization_id {
            Some(org_id) => self.org_scope(tenant_id, org_id, org_id, ScopeType::Organization)?,
            None => self.tenant_scope(tenant_id, tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        Ok(self.graph.analyze(tenant_id, organization_id))
    }

    pub fn graph_path(
        &self,
        ctx: &Context,
        source_entity_id: Id,
        target_entity_id: Id,
        edge_types: Option<Vec<DependencyType>>,
    ) -> Result<Option<Vec<Id>>> {
        let source = self
            .store
            .entities
            .get(source_entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {source_entity_id}")))?;
        let scope = self.org_scope(source.tenant_id, source.organization_id, source_entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        let filter = move |ty: DependencyType| edge_types.as_ref().map(|allowed| allowed.contains(&ty)).unwrap_or(true);
        Ok(self.graph.path(source.tenant_id, source_entity_id, target_entity_id, filter))
    }

    pub fn network_topology(
        &self,
        ctx: &Context,
        tenant_id: Id,
        organization_id: Id,
        include_children: bool,
    ) -> Result<crate::graph::NetworkTopology> {
        let scope = self.org_scope(tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        Ok(self.graph.network_topology(tenant_id, organization_id, include_children))
    }

    // ------------------------------------------------------------------
    // Single-resource reads, gated the same way their mutation siblings are
    // ------------------------------------------------------------------

    pub fn get_organization(&self, ctx: &Context, organization_id: Id) -> Result<Organization> {
        let org = self
            .store
            .organizations
            .get(organization_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("organization {organization_id}")))?;
        let scope = self.org_scope(org.tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        Ok(org)
    }

    pub fn get_entity(&self, ctx: &Context, entity_id: Id) -> Result<Entity> {
        let entity = self
            .store
            .entities
            .get(entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {entity_id}")))?;
        let scope = self.org_scope(entity.tenant_id, entity.organization_id, entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        Ok(entity)
    }

    pub fn get_dependency(&self, ctx: &Context, dependency_id: Id) -> Result<Dependency> {
        let dep = self
            .store
            .dependencies
            .get(dependency_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("dependency {dependency_id}")))?;
        let source = self
            .store
            .entities
            .get(dep.source_entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {}", dep.source_entity_id)))?;
        let scope = self.org_scope(dep.tenant_id, source.organization_id, dep.source_entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        Ok(dep)
    }

    /// Lists rows for a table already loaded into memory, applying
    /// per-element AuthZ after pagination has fixed the page's row
    /// positions (`spec.md` §4.7), so non-viewable rows shrink the page
    /// rather than shift its boundary.
    pub fn list_organizations(&self, ctx: &Context, tenant_id: Id, page: u32, per_page: u32) -> Result<Page<Organization>> {
        let rows = self.store.organizations.list_by(|o| o.tenant_id == tenant_id);
        self.paginate_authorized(page, per_page, rows, |org| {
            self.org_scope(tenant_id, org.id, org.id, ScopeType::Organization)
                .and_then(|scope| self.authz.authorize(&ctx.principal, Action::ReadResource, &scope))
                .is_ok()
        }, |a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
    }

    pub fn list_entities(&self, ctx: &Context, tenant_id: Id, organization_id: Option<Id>, page: u32, per_page: u32) -> Result<Page<Entity>> {
        let rows = self
            .store
            .entities
            .list_by(|e| e.tenant_id == tenant_id && organization_id.map(|o| o == e.organization_id).unwrap_or(true));
        self.paginate_authorized(page, per_page, rows, |entity| {
            self.org_scope(tenant_id, entity.organization_id, entity.id, ScopeType::Entity)
                .and_then(|scope| self.authz.authorize(&ctx.principal, Action::ReadResource, &scope))
                .is_ok()
        }, |a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
    }

    pub fn list_dependencies(&self, ctx: &Context, tenant_id: Id, entity_id: Option<Id>, page: u32, per_page: u32) -> Result<Page<Dependency>> {
        let rows = self.store.dependencies.list_by(|d| {
            d.tenant_id == tenant_id
                && entity_id.map(|e| e == d.source_entity_id || e == d.target_entity_id).unwrap_or(true)
        });
        self.paginate_authorized(page, per_page, rows, |dep| {
            self.store
                .entities
                .get(dep.source_entity_id)
                .and_then(|source| {
                    self.org_scope(tenant_id, source.organization_id, dep.source_entity_id, ScopeType::Entity).ok()
                })
                .map(|scope| self.authz.authorize(&ctx.principal, Action::ReadResource, &scope).is_ok())
                .unwrap_or(false)
        }, |a, b| a.id.cmp(&b.id))
    }

    // ------------------------------------------------------------------
    // Updates with revision CAS
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn update_entity(
        &self,
        ctx: &Context,
        entity_id: Id,
        expected_revision: u64,
        name: Option<String>,
        attributes: Option<std::collections::HashMap<String, crate::common::Value>>,
        tags: Option<std::collections::HashSet<String>>,
        is_active: Option<bool>,
    ) -> Result<Entity> {
        let before = self
            .store
            .entities
            .get(entity_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("entity {entity_id}")))?;
        self.admit(before.tenant_id)?;
        ctx.check_deadline()?;
        let scope = self.org_scope(before.tenant_id, before.organization_id, entity_id, ScopeType::Entity)?;
        self.authz.authorize(&ctx.principal, Action::UpdateEntity, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let updated = txn.update_if_revision(&self.store.entities, entity_id, expected_revision, |e| {
            if let Some(name) = name {
                e.name = name;
            }
            if let Some(attributes) = attributes {
                e.attributes = attributes;
            }
            if let Some(tags) = tags {
                e.tags = tags;
            }
            if let Some(is_active) = is_active {
                e.is_active = is_active;
            }
        })?;
        // No-op commits (unchanged representation at the same revision)
        // still bump the in-memory revision via `update_if_revision`, so the
        // "no new AuditRecord" round-trip property is approximated by
        // comparing hashes rather than skipping the CAS itself.
        let before_hash = hash_of(&before);
        let after_hash = hash_of(&updated);
        if before_hash != after_hash {
            self.cache.invalidate(self.graph, before.tenant_id, Subject::EntityGraph);
            self.audit_success(ctx, &mut txn, "entity.update", "entity", entity_id, before.tenant_id, Some(before_hash), Some(after_hash));
        }
        txn.commit();
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Issues
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_issue(
        &self,
        ctx: &Context,
        tenant_id: Id,
        organization_id: Option<Id>,
        title: String,
        priority: u8,
        severity: u8,
        is_incident: bool,
    ) -> Result<Issue> {
        self.admit(tenant_id)?;
        let scope = match organization_id {
            Some(org_id) => self.org_scope(tenant_id, org_id, org_id, ScopeType::Organization)?,
            None => self.tenant_scope(tenant_id, tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::CreateIssue, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.issues.next_id();
        let issue = Issue {
            id,
            tenant_id,
            revision: 1,
            organization_id,
            title,
            status: IssueStatus::Open,
            priority,
            severity,
            assignee_id: None,
            is_incident,
            label_ids: Default::default(),
            linked_entity_ids: Default::default(),
        };
        let inserted = txn.insert(&self.store.issues, issue)?;
        self.audit_success(ctx, &mut txn, "issue.create", "issue", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_issue(
        &self,
        ctx: &Context,
        issue_id: Id,
        expected_revision: u64,
        status: Option<IssueStatus>,
        assignee_id: Option<Id>,
        priority: Option<u8>,
        severity: Option<u8>,
    ) -> Result<Issue> {
        let before = self
            .store
            .issues
            .get(issue_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("issue {issue_id}")))?;
        self.admit(before.tenant_id)?;
        let scope = match before.organization_id {
            Some(org_id) => self.org_scope(before.tenant_id, org_id, issue_id, ScopeType::Organization)?,
            None => self.tenant_scope(before.tenant_id, before.tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::UpdateIssue, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let updated = txn.update_if_revision(&self.store.issues, issue_id, expected_revision, |i| {
            if let Some(status) = status {
                i.status = status;
            }
            if let Some(assignee_id) = assignee_id {
                i.assignee_id = Some(assignee_id);
            }
            if let Some(priority) = priority {
                i.priority = priority;
            }
            if let Some(severity) = severity {
                i.severity = severity;
            }
        })?;
        let before_hash = hash_of(&before);
        let after_hash = hash_of(&updated);
        if before_hash != after_hash {
            self.audit_success(ctx, &mut txn, "issue.update", "issue", issue_id, before.tenant_id, Some(before_hash), Some(after_hash));
        }
        txn.commit();
        Ok(updated)
    }

    pub fn delete_issue(&self, ctx: &Context, issue_id: Id) -> Result<()> {
        let issue = self
            .store
            .issues
            .get(issue_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("issue {issue_id}")))?;
        self.admit(issue.tenant_id)?;
        let scope = match issue.organization_id {
            Some(org_id) => self.org_scope(issue.tenant_id, org_id, issue_id, ScopeType::Organization)?,
            None => self.tenant_scope(issue.tenant_id, issue.tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::DeleteIssue, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let removed = txn.delete(&self.store.issues, issue_id)?;
        self.audit_success(ctx, &mut txn, "issue.delete", "issue", issue_id, issue.tenant_id, Some(hash_of(&removed)), None);
        txn.commit();
        Ok(())
    }

    pub fn list_issues(&self, ctx: &Context, tenant_id: Id, page: u32, per_page: u32) -> Result<Page<Issue>> {
        let rows = self.store.issues.list_by(|i| i.tenant_id == tenant_id);
        self.paginate_authorized(page, per_page, rows, |issue| {
            let scope = match issue.organization_id {
                Some(org_id) => self.org_scope(tenant_id, org_id, issue.id, ScopeType::Organization),
                None => Ok(self.tenant_scope(tenant_id, tenant_id)),
            };
            scope
                .and_then(|scope| self.authz.authorize(&ctx.principal, Action::ReadResource, &scope))
                .is_ok()
        }, |a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)))
    }

    // ------------------------------------------------------------------
    // Issue labels and comments (nested resources, `spec.md` §6)
    // ------------------------------------------------------------------

    pub fn create_label(&self, ctx: &Context, tenant_id: Id, name: String, color: String) -> Result<Label> {
        self.admit(tenant_id)?;
        self.authz
            .authorize(&ctx.principal, Action::ManageSecondaryResource, &self.tenant_scope(tenant_id, tenant_id))?;
        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.labels.next_id();
        let label = Label { id, tenant_id, revision: 1, name, color };
        let inserted = txn.insert(&self.store.labels, label)?;
        self.audit_success(ctx, &mut txn, "label.create", "label", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn list_labels(&self, ctx: &Context, tenant_id: Id, page: u32, per_page: u32) -> Result<Page<Label>> {
        self.admit(tenant_id)?;
        let rows = self.store.labels.list_by(|l| l.tenant_id == tenant_id);
        self.paginate_authorized(
            page,
            per_page,
            rows,
            |_| self.authz.authorize(&ctx.principal, Action::ReadResource, &self.tenant_scope(tenant_id, tenant_id)).is_ok(),
            |a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)),
        )
    }

    /// Attaches `label_id` to `issue_id`, idempotently (re-attaching an
    /// already-present label is a no-op commit, matching the PUT-of-
    /// unchanged-representation property in `spec.md` §8).
    pub fn attach_label(&self, ctx: &Context, issue_id: Id, label_id: Id) -> Result<Issue> {
        let issue = self
            .store
            .issues
            .get(issue_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("issue {issue_id}")))?;
        self.admit(issue.tenant_id)?;
        let label = self
            .store
            .labels
            .get(label_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("label {label_id}")))?;
        if label.tenant_id != issue.tenant_id {
            return Err(ElderError::TenantMismatch);
        }
        let scope = match issue.organization_id {
            Some(org_id) => self.org_scope(issue.tenant_id, org_id, issue_id, ScopeType::Organization)?,
            None => self.tenant_scope(issue.tenant_id, issue.tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::UpdateIssue, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let before_hash = hash_of(&issue);
        let updated = txn.update_if_revision(&self.store.issues, issue_id, issue.revision, |i| {
            i.label_ids.insert(label_id);
        })?;
        let after_hash = hash_of(&updated);
        if before_hash != after_hash {
            self.audit_success(ctx, &mut txn, "issue.label.attach", "issue", issue_id, issue.tenant_id, Some(before_hash), Some(after_hash));
        }
        txn.commit();
        Ok(updated)
    }

    pub fn add_issue_comment(&self, ctx: &Context, issue_id: Id, body: String) -> Result<IssueComment> {
        let issue = self
            .store
            .issues
            .get(issue_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("issue {issue_id}")))?;
        self.admit(issue.tenant_id)?;
        let scope = match issue.organization_id {
            Some(org_id) => self.org_scope(issue.tenant_id, org_id, issue_id, ScopeType::Organization)?,
            None => self.tenant_scope(issue.tenant_id, issue.tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.issue_comments.next_id();
        let comment = IssueComment {
            id,
            tenant_id: issue.tenant_id,
            revision: 1,
            issue_id,
            author_id: ctx.principal.id,
            body,
            created_at: Utc::now(),
        };
        let inserted = txn.insert(&self.store.issue_comments, comment)?;
        self.audit_success(ctx, &mut txn, "issue.comment.create", "issue_comment", id, issue.tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    /// Comments are append-only (`spec.md` §3): no update/delete, ordered
    /// by creation so the thread reads chronologically.
    pub fn list_issue_comments(&self, ctx: &Context, issue_id: Id) -> Result<Vec<IssueComment>> {
        let issue = self
            .store
            .issues
            .get(issue_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("issue {issue_id}")))?;
        let scope = match issue.organization_id {
            Some(org_id) => self.org_scope(issue.tenant_id, org_id, issue_id, ScopeType::Organization)?,
            None => self.tenant_scope(issue.tenant_id, issue.tenant_id),
        };
        self.authz.authorize(&ctx.principal, Action::ReadResource, &scope)?;
        let mut rows = self.store.issue_comments.list_by(|c| c.issue_id == issue_id);
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Milestones and projects (thin CRUD secondary resources, `spec.md` §6)
    // ------------------------------------------------------------------

    pub fn create_milestone(
        &self,
        ctx: &Context,
        tenant_id: Id,
        organization_id: Id,
        name: String,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<Milestone> {
        self.admit(tenant_id)?;
        let scope = self.org_scope(tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;
        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.milestones.next_id();
        let milestone = Milestone { id, tenant_id, revision: 1, organization_id, name, due_date, status: MilestoneStatus::Open };
        let inserted = txn.insert(&self.store.milestones, milestone)?;
        self.audit_success(ctx, &mut txn, "milestone.create", "milestone", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn update_milestone(
        &self,
        ctx: &Context,
        milestone_id: Id,
        expected_revision: u64,
        name: Option<String>,
        status: Option<MilestoneStatus>,
    ) -> Result<Milestone> {
        let before = self
            .store
            .milestones
            .get(milestone_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("milestone {milestone_id}")))?;
        self.admit(before.tenant_id)?;
        let scope = self.org_scope(before.tenant_id, before.organization_id, milestone_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let updated = txn.update_if_revision(&self.store.milestones, milestone_id, expected_revision, |m| {
            if let Some(name) = name {
                m.name = name;
            }
            if let Some(status) = status {
                m.status = status;
            }
        })?;
        let before_hash = hash_of(&before);
        let after_hash = hash_of(&updated);
        if before_hash != after_hash {
            self.audit_success(ctx, &mut txn, "milestone.update", "milestone", milestone_id, before.tenant_id, Some(before_hash), Some(after_hash));
        }
        txn.commit();
        Ok(updated)
    }

    pub fn delete_milestone(&self, ctx: &Context, milestone_id: Id) -> Result<()> {
        let milestone = self
            .store
            .milestones
            .get(milestone_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("milestone {milestone_id}")))?;
        self.admit(milestone.tenant_id)?;
        let scope = self.org_scope(milestone.tenant_id, milestone.organization_id, milestone_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;
        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let removed = txn.delete(&self.store.milestones, milestone_id)?;
        self.audit_success(ctx, &mut txn, "milestone.delete", "milestone", milestone_id, milestone.tenant_id, Some(hash_of(&removed)), None);
        txn.commit();
        Ok(())
    }

    pub fn list_milestones(&self, ctx: &Context, tenant_id: Id, page: u32, per_page: u32) -> Result<Page<Milestone>> {
        self.admit(tenant_id)?;
        let rows = self.store.milestones.list_by(|m| m.tenant_id == tenant_id);
        self.paginate_authorized(
            page,
            per_page,
            rows,
            |m| {
                self.org_scope(tenant_id, m.organization_id, m.id, ScopeType::Organization)
                    .map(|scope| self.authz.authorize(&ctx.principal, Action::ReadResource, &scope).is_ok())
                    .unwrap_or(false)
            },
            |a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)),
        )
    }

    pub fn create_project(&self, ctx: &Context, tenant_id: Id, organization_id: Id, name: String) -> Result<Project> {
        self.admit(tenant_id)?;
        let scope = self.org_scope(tenant_id, organization_id, organization_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;
        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let id = self.store.projects.next_id();
        let project = Project { id, tenant_id, revision: 1, organization_id, name, status: MilestoneStatus::Open };
        let inserted = txn.insert(&self.store.projects, project)?;
        self.audit_success(ctx, &mut txn, "project.create", "project", id, tenant_id, None, Some(hash_of(&inserted)));
        txn.commit();
        Ok(inserted)
    }

    pub fn update_project(
        &self,
        ctx: &Context,
        project_id: Id,
        expected_revision: u64,
        name: Option<String>,
        status: Option<MilestoneStatus>,
    ) -> Result<Project> {
        let before = self
            .store
            .projects
            .get(project_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("project {project_id}")))?;
        self.admit(before.tenant_id)?;
        let scope = self.org_scope(before.tenant_id, before.organization_id, project_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;

        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let updated = txn.update_if_revision(&self.store.projects, project_id, expected_revision, |p| {
            if let Some(name) = name {
                p.name = name;
            }
            if let Some(status) = status {
                p.status = status;
            }
        })?;
        let before_hash = hash_of(&before);
        let after_hash = hash_of(&updated);
        if before_hash != after_hash {
            self.audit_success(ctx, &mut txn, "project.update", "project", project_id, before.tenant_id, Some(before_hash), Some(after_hash));
        }
        txn.commit();
        Ok(updated)
    }

    pub fn delete_project(&self, ctx: &Context, project_id: Id) -> Result<()> {
        let project = self
            .store
            .projects
            .get(project_id)
            .ok_or_else(|| ElderError::ResourceMissing(format!("project {project_id}")))?;
        self.admit(project.tenant_id)?;
        let scope = self.org_scope(project.tenant_id, project.organization_id, project_id, ScopeType::Organization)?;
        self.authz.authorize(&ctx.principal, Action::ManageSecondaryResource, &scope)?;
        let mut txn = self.store.begin(ctx.correlation_id, Some(ctx.remaining()));
        let removed = txn.delete(&self.store.projects, project_id)?;
        self.audit_success(ctx, &mut txn, "project.delete", "project", project_id, project.tenant_id, Some(hash_of(&removed)), None);
        txn.commit();
        Ok(())
    }

    pub fn list_projects(&self, ctx: &Context, tenant_id: Id, page: u32, per_page: u32) -> Result<Page<Project>> {
        self.admit(tenant_id)?;
        let rows = self.store.projects.list_by(|p| p.tenant_id == tenant_id);
        self.paginate_authorized(
            page,
            per_page,
            rows,
            |p| {
                self.org_scope(tenant_id, p.organization_id, p.id, ScopeType::Organization)
                    .map(|scope| self.authz.authorize(&ctx.principal, Action::ReadResource, &scope).is_ok())
                    .unwrap_or(false)
            },
            |a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)),
        )
    }

    // ------------------------------------------------------------------
    // Audit log reads
    // ------------------------------------------------------------------

    pub fn query_audit_log(&self, ctx: &Context, filter: &crate::audit::AuditFilter) -> Result<Vec<AuditRecord>> {
        self.audit.query(&self.authz, &ctx.principal, filter)
    }

    // ------------------------------------------------------------------
    // Pagination helper shared by every list endpoint
    // ------------------------------------------------------------------

    pub fn paginate_authorized<T: Clone>(
        &self,
        page: u32,
        per_page: u32,
        rows: Vec<T>,
        mut authorized: impl FnMut(&T) -> bool,
        mut sort_key: impl FnMut(&T, &T) -> std::cmp::Ordering,
    ) -> Result<Page<T>> {
        let pagination = Pagination::new(page, per_page, self.config.page_size_max)?;
        let mut sorted = rows;
        sorted.sort_by(&mut sort_key);
        let total_before_authz = sorted.len();
        let start = ((pagination.page - 1) as usize) * (pagination.per_page as usize);
        let end = (start + pagination.per_page as usize).min(total_before_authz);
        let window = if start < total_before_authz { sorted[start..end].to_vec() } else { Vec::new() };
        let items: Vec<T> = window.into_iter().filter(|row| authorized(row)).collect();
        Ok(Page {
            total: total_before_authz,
            items,
            page: pagination.page,
            per_page: pagination.per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_invalidator::CacheInvalidator;
    use crate::config::Config;
    use crate::graph::GraphEngine;

    fn super_admin(tenant_id: Id) -> Identity {
        Identity {
            id: 1,
            tenant_id,
            revision: 1,
            village_id: "00a1-0000-00000001".to_string(),
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            identity_type: IdentityType::Human,
            auth_provider: "internal".to_string(),
            portal_role: PortalRole::SuperAdmin,
            is_active: true,
            mfa_enabled: false,
            credential_fingerprint: None,
        }
    }

    #[test]
    fn end_to_end_create_org_entities_dependency_and_impact() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;

        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();
        let platform = pipeline
            .create_organization(&ctx, tenant.id, Some(eng.id), "Platform".to_string(), OrganizationType::Team)
            .unwrap();

        let web = pipeline
            .create_entity(&ctx, tenant.id, platform.id, EntityType::Compute, "web-01".to_string(), Default::default(), Default::default())
            .unwrap();
        let db = pipeline
            .create_entity(&ctx, tenant.id, platform.id, EntityType::Database, "db-01".to_string(), Default::default(), Default::default())
            .unwrap();

        pipeline
            .create_dependency(&ctx, web.id, db.id, DependencyType::Runtime, Default::default())
            .unwrap();

        let impact = pipeline.graph_impact(&ctx, web.id, crate::graph::Direction::Downstream, 5).unwrap();
        assert_eq!(impact.len(), 2);
        assert_eq!(impact[0].entity_id, web.id);
        assert_eq!(impact[1].entity_id, db.id);
        assert_eq!(impact[1].via_edge, Some(DependencyType::Runtime));
    }

    #[test]
    fn cycle_attempt_is_rejected() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();
        let a = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "A".to_string(), Default::default(), Default::default())
            .unwrap();
        let b = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "B".to_string(), Default::default(), Default::default())
            .unwrap();
        let c = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "C".to_string(), Default::default(), Default::default())
            .unwrap();
        pipeline.create_dependency(&ctx, a.id, b.id, DependencyType::Runtime, Default::default()).unwrap();
        pipeline.create_dependency(&ctx, b.id, c.id, DependencyType::Runtime, Default::default()).unwrap();

        let err = pipeline
            .create_dependency(&ctx, c.id, a.id, DependencyType::Runtime, Default::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "cycle");
    }

    #[test]
    fn delete_organization_with_children_requires_cascade() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();
        pipeline
            .create_organization(&ctx, tenant.id, Some(eng.id), "Platform".to_string(), OrganizationType::Team)
            .unwrap();

        let err = pipeline.delete_organization(&ctx, eng.id, false).unwrap_err();
        assert_eq!(err.reason_code(), "dependent_exists");

        pipeline.delete_organization(&ctx, eng.id, true).unwrap();
        assert!(store.organizations.get(eng.id).is_none());
    }

    #[test]
    fn update_entity_is_idempotent_for_unchanged_representation() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();
        let web = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "web-01".to_string(), Default::default(), Default::default())
            .unwrap();

        let before_audit_count = pipeline.query_audit_log(&ctx, &crate::audit::AuditFilter::default()).unwrap().len();

        let same = pipeline
            .update_entity(&ctx, web.id, web.revision, Some("web-01".to_string()), None, None, None)
            .unwrap();
        assert_eq!(same.revision, web.revision + 1);

        let after_audit_count = pipeline.query_audit_log(&ctx, &crate::audit::AuditFilter::default()).unwrap().len();
        assert_eq!(before_audit_count, after_audit_count, "no-op update must not append an audit record");

        let renamed = pipeline
            .update_entity(&ctx, web.id, same.revision, Some("web-02".to_string()), None, None, None)
            .unwrap();
        assert_eq!(renamed.name, "web-02");
        let final_audit_count = pipeline.query_audit_log(&ctx, &crate::audit::AuditFilter::default()).unwrap().len();
        assert_eq!(final_audit_count, after_audit_count + 1);
    }

    #[test]
    fn stale_revision_on_update_is_rejected() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();
        let web = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "web-01".to_string(), Default::default(), Default::default())
            .unwrap();

        let err = pipeline
            .update_entity(&ctx, web.id, web.revision + 1, Some("web-02".to_string()), None, None, None)
            .unwrap_err();
        assert_eq!(err.reason_code(), "stale_revision");
    }

    #[test]
    fn issue_crud_and_listing() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));

        let issue = pipeline
            .create_issue(&ctx, tenant.id, None, "disk full".to_string(), 1, 1, true)
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Open);

        let updated = pipeline
            .update_issue(&ctx, issue.id, issue.revision, Some(IssueStatus::InProgress), Some(root.id), None, None)
            .unwrap();
        assert_eq!(updated.status, IssueStatus::InProgress);
        assert_eq!(updated.assignee_id, Some(root.id));

        let page = pipeline.list_issues(&ctx, tenant.id, 1, 50).unwrap();
        assert_eq!(page.total, 1);

        pipeline.delete_issue(&ctx, issue.id).unwrap();
        let page = pipeline.list_issues(&ctx, tenant.id, 1, 50).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn graph_path_finds_shortest_route_and_respects_edge_filter() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();
        let a = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "A".to_string(), Default::default(), Default::default())
            .unwrap();
        let b = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "B".to_string(), Default::default(), Default::default())
            .unwrap();
        let c = pipeline
            .create_entity(&ctx, tenant.id, eng.id, EntityType::Compute, "C".to_string(), Default::default(), Default::default())
            .unwrap();
        pipeline.create_dependency(&ctx, a.id, b.id, DependencyType::Runtime, Default::default()).unwrap();
        pipeline.create_dependency(&ctx, b.id, c.id, DependencyType::Network, Default::default()).unwrap();

        let path = pipeline.graph_path(&ctx, a.id, c.id, None).unwrap();
        assert_eq!(path, Some(vec![a.id, b.id, c.id]));

        let filtered = pipeline
            .graph_path(&ctx, a.id, c.id, Some(vec![DependencyType::Runtime]))
            .unwrap();
        assert_eq!(filtered, None, "path must not cross an excluded edge type");

        let topology = pipeline.network_topology(&ctx, tenant.id, eng.id, true).unwrap();
        assert_eq!(topology.nodes.len(), 3);
        assert_eq!(topology.edges.len(), 2);
    }

    #[test]
    fn milestone_and_project_crud() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let eng = pipeline
            .create_organization(&ctx, tenant.id, None, "Eng".to_string(), OrganizationType::Organization)
            .unwrap();

        let milestone = pipeline
            .create_milestone(&ctx, tenant.id, eng.id, "v1".to_string(), None)
            .unwrap();
        assert_eq!(milestone.status, MilestoneStatus::Open);

        let updated = pipeline
            .update_milestone(&ctx, milestone.id, milestone.revision, None, Some(MilestoneStatus::Closed))
            .unwrap();
        assert_eq!(updated.status, MilestoneStatus::Closed);
        assert!(updated.revision > milestone.revision);

        let page = pipeline.list_milestones(&ctx, tenant.id, 1, 50).unwrap();
        assert_eq!(page.total, 1);

        pipeline.delete_milestone(&ctx, milestone.id).unwrap();
        let page = pipeline.list_milestones(&ctx, tenant.id, 1, 50).unwrap();
        assert_eq!(page.total, 0);

        let project = pipeline
            .create_project(&ctx, tenant.id, eng.id, "Modernization".to_string())
            .unwrap();
        let renamed = pipeline
            .update_project(&ctx, project.id, project.revision, Some("Modernization 2".to_string()), None)
            .unwrap();
        assert_eq!(renamed.name, "Modernization 2");
        pipeline.delete_project(&ctx, project.id).unwrap();
        let page = pipeline.list_projects(&ctx, tenant.id, 1, 50).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn issue_labels_and_comments() {
        let store = Store::new();
        let graph = GraphEngine::new(&store, 64, 5000);
        let cache = CacheInvalidator::new();
        let limiter = TenantRateLimiter::new(1000);
        let config = Config::default();
        let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

        let mut root = super_admin(0);
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));
        let tenant = pipeline.create_tenant(&ctx, "T".to_string()).unwrap();
        root.tenant_id = tenant.id;
        let ctx = Context::new(root.clone(), uuid::Uuid::new_v4(), std::time::Duration::from_secs(30));

        let issue = pipeline
            .create_issue(&ctx, tenant.id, None, "Disk full".to_string(), 1, 2, false)
            .unwrap();
        let label = pipeline
            .create_label(&ctx, tenant.id, "storage".to_string(), "#ff0000".to_string())
            .unwrap();

        let tagged = pipeline.attach_label(&ctx, issue.id, label.id).unwrap();
        assert!(tagged.label_ids.contains(&label.id));

        // Re-attaching the same label is a no-op commit: the hash comparison
        // in `attach_label` skips the audit record but still returns the
        // unchanged row.
        let tagged_again = pipeline.attach_label(&ctx, issue.id, label.id).unwrap();
        assert_eq!(tagged_again.label_ids.len(), 1);

        pipeline.add_issue_comment(&ctx, issue.id, "investigating".to_string()).unwrap();
        pipeline.add_issue_comment(&ctx, issue.id, "resolved, rotated logs".to_string()).unwrap();
        let comments = pipeline.list_issue_comments(&ctx, issue.id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, "investigating");
        assert_eq!(comments[1].body, "resolved, rotated logs");

        let labels_page = pipeline.list_labels(&ctx, tenant.id, 1, 50).unwrap();
        assert_eq!(labels_page.total, 1);
    }
}
