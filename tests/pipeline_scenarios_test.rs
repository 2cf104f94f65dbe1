//! End-to-end scenarios exercised through [`elder_core::pipeline::Pipeline`]
//! the way a real caller (the REST handlers in `src/api/handlers`) would
//! drive it: one `Context` per request, no direct `Store` access.

use std::time::Duration;

use elder_core::cache_invalidator::CacheInvalidator;
use elder_core::config::Config;
use elder_core::graph::GraphEngine;
use elder_core::pipeline::{Context, Pipeline, TenantRateLimiter};
use elder_core::store::model::{
    ApprovalDecision, ApprovalMode, EntityType, GroupProvider, Identity, IdentityType,
    OrganizationType, PortalRole, Role, ScopeType,
};
use elder_core::store::Store;

fn harness() -> (Store, Config) {
    (Store::new(), Config::default())
}

fn identity(id: u64, tenant_id: u64, portal_role: PortalRole) -> Identity {
    Identity {
        id,
        tenant_id,
        revision: 1,
        village_id: format!("00a1-0000-{id:08x}"),
        username: format!("user-{id}"),
        email: format!("user-{id}@example.com"),
        identity_type: IdentityType::Human,
        auth_provider: "internal".to_string(),
        portal_role,
        is_active: true,
        mfa_enabled: false,
        credential_fingerprint: None,
    }
}

fn ctx(principal: Identity) -> Context {
    Context::new(principal, uuid::Uuid::new_v4(), Duration::from_secs(30))
}

#[test]
fn viewer_cannot_create_entities_but_can_read_them() {
    let (store, config) = harness();
    let graph = GraphEngine::new(&store, config.max_hierarchy_depth, config.analyze_sampling_threshold_nodes);
    let cache = CacheInvalidator::new();
    let limiter = TenantRateLimiter::new(config.per_tenant_qps_soft_cap);
    let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

    let mut root = identity(1, 0, PortalRole::SuperAdmin);
    let tenant = pipeline.create_tenant(&ctx(root.clone()), "Acme".to_string()).unwrap();
    root.tenant_id = tenant.id;
    let root_ctx = ctx(root.clone());

    let org = pipeline
        .create_organization(&root_ctx, tenant.id, None, "Platform".to_string(), OrganizationType::Organization)
        .unwrap();

    let viewer_identity = pipeline
        .create_identity(&root_ctx, tenant.id, "viewer".to_string(), "viewer@example.com".to_string(), IdentityType::Human, "internal".to_string())
        .unwrap();
    let viewer = Identity { portal_role: PortalRole::Viewer, ..viewer_identity };
    let viewer_ctx = ctx(viewer);

    let denied = pipeline.create_entity(
        &viewer_ctx,
        tenant.id,
        org.id,
        EntityType::Compute,
        "web-01".to_string(),
        Default::default(),
        Default::default(),
    );
    assert_eq!(denied.unwrap_err().reason_code(), "forbidden");

    let entity = pipeline
        .create_entity(&root_ctx, tenant.id, org.id, EntityType::Compute, "web-01".to_string(), Default::default(), Default::default())
        .unwrap();

    let read_back = pipeline.get_entity(&viewer_ctx, entity.id).unwrap();
    assert_eq!(read_back.id, entity.id);
}

#[test]
fn resource_scoped_grant_raises_effective_role_for_that_entity_only() {
    let (store, config) = harness();
    let graph = GraphEngine::new(&store, config.max_hierarchy_depth, config.analyze_sampling_threshold_nodes);
    let cache = CacheInvalidator::new();
    let limiter = TenantRateLimiter::new(config.per_tenant_qps_soft_cap);
    let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

    let mut root = identity(1, 0, PortalRole::SuperAdmin);
    let tenant = pipeline.create_tenant(&ctx(root.clone()), "Acme".to_string()).unwrap();
    root.tenant_id = tenant.id;
    let root_ctx = ctx(root.clone());

    let org = pipeline
        .create_organization(&root_ctx, tenant.id, None, "Platform".to_string(), OrganizationType::Organization)
        .unwrap();
    let entity_a = pipeline
        .create_entity(&root_ctx, tenant.id, org.id, EntityType::Compute, "a".to_string(), Default::default(), Default::default())
        .unwrap();
    let entity_b = pipeline
        .create_entity(&root_ctx, tenant.id, org.id, EntityType::Compute, "b".to_string(), Default::default(), Default::default())
        .unwrap();

    let operator = pipeline
        .create_identity(&root_ctx, tenant.id, "operator".to_string(), "operator@example.com".to_string(), IdentityType::Human, "internal".to_string())
        .unwrap();
    pipeline
        .grant_resource_role(&root_ctx, tenant.id, operator.id, ScopeType::Entity, entity_a.id, Role::Maintainer)
        .unwrap();
    let operator = Identity { portal_role: PortalRole::Viewer, ..operator };
    let operator_ctx = ctx(operator);

    pipeline
        .update_entity(&operator_ctx, entity_a.id, entity_a.revision, Some("a-renamed".to_string()), None, None, None)
        .unwrap();

    let denied = pipeline.update_entity(&operator_ctx, entity_b.id, entity_b.revision, Some("b-renamed".to_string()), None, None, None);
    assert_eq!(denied.unwrap_err().reason_code(), "forbidden");
}

#[test]
fn group_threshold_approval_grants_membership_on_quorum() {
    let (store, config) = harness();
    let graph = GraphEngine::new(&store, config.max_hierarchy_depth, config.analyze_sampling_threshold_nodes);
    let cache = CacheInvalidator::new();
    let limiter = TenantRateLimiter::new(config.per_tenant_qps_soft_cap);
    let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

    let mut root = identity(1, 0, PortalRole::SuperAdmin);
    let tenant = pipeline.create_tenant(&ctx(root.clone()), "Acme".to_string()).unwrap();
    root.tenant_id = tenant.id;
    let root_ctx = ctx(root.clone());

    let requester = pipeline
        .create_identity(&root_ctx, tenant.id, "requester".to_string(), "requester@example.com".to_string(), IdentityType::Human, "internal".to_string())
        .unwrap();
    let owner_a = pipeline
        .create_identity(&root_ctx, tenant.id, "owner-a".to_string(), "owner-a@example.com".to_string(), IdentityType::Human, "internal".to_string())
        .unwrap();
    let owner_b = pipeline
        .create_identity(&root_ctx, tenant.id, "owner-b".to_string(), "owner-b@example.com".to_string(), IdentityType::Human, "internal".to_string())
        .unwrap();
    let owner_c = pipeline
        .create_identity(&root_ctx, tenant.id, "owner-c".to_string(), "owner-c@example.com".to_string(), IdentityType::Human, "internal".to_string())
        .unwrap();

    let created_group = pipeline
        .create_group(
            &root_ctx,
            tenant.id,
            "on-call-escalation".to_string(),
            owner_a.id,
            ApprovalMode::Threshold,
            2,
            GroupProvider::Internal,
            false,
        )
        .unwrap();
    let owners: std::collections::HashSet<u64> = [owner_a.id, owner_b.id, owner_c.id].into_iter().collect();
    let group = store
        .groups
        .update_if_revision(created_group.id, created_group.revision, |g| {
            g.owner_identity_ids = owners.clone();
        })
        .unwrap();

    let requester_identity = Identity { tenant_id: tenant.id, ..requester.clone() };
    let requester_ctx = ctx(requester_identity);
    let request = pipeline
        .submit_access_request(&requester_ctx, group.id, "on-call rotation coverage".to_string())
        .unwrap();

    let owner_a_ctx = ctx(Identity { tenant_id: tenant.id, ..owner_a.clone() });
    let after_first = pipeline
        .decide_access_request(&owner_a_ctx, request.id, request.revision, ApprovalDecision::Approve)
        .unwrap();
    assert_eq!(after_first.approvals.len(), 1);

    let owner_b_ctx = ctx(Identity { tenant_id: tenant.id, ..owner_b.clone() });
    let after_second = pipeline
        .decide_access_request(&owner_b_ctx, request.id, after_first.revision, ApprovalDecision::Approve)
        .unwrap();
    assert_eq!(after_second.approvals.len(), 2);

    let membership_exists = store
        .memberships
        .list_by(|m| m.group_id == group.id && m.identity_id == requester.id)
        .len();
    assert_eq!(membership_exists, 1, "quorum reached should create a membership row");
}

#[test]
fn village_id_lookup_resolves_to_canonical_path() {
    let (store, config) = harness();
    let graph = GraphEngine::new(&store, config.max_hierarchy_depth, config.analyze_sampling_threshold_nodes);
    let cache = CacheInvalidator::new();
    let limiter = TenantRateLimiter::new(config.per_tenant_qps_soft_cap);
    let pipeline = Pipeline::new(&store, &graph, &cache, &limiter, &config);

    let mut root = identity(1, 0, PortalRole::SuperAdmin);
    let tenant = pipeline.create_tenant(&ctx(root.clone()), "Acme".to_string()).unwrap();
    root.tenant_id = tenant.id;
    let root_ctx = ctx(root.clone());
    let org = pipeline
        .create_organization(&root_ctx, tenant.id, None, "Platform".to_string(), OrganizationType::Organization)
        .unwrap();
    let entity = pipeline
        .create_entity(&root_ctx, tenant.id, org.id, EntityType::Compute, "web-01".to_string(), Default::default(), Default::default())
        .unwrap();

    let resolution = pipeline.lookup_village_id(&entity.village_id).unwrap();
    assert_eq!(resolution.internal_id, entity.id);
    assert_eq!(resolution.redirect_path, format!("/entities/{}", entity.id));

    let unknown = pipeline.lookup_village_id("ffff-ffff-ffffffff");
    assert_eq!(unknown.unwrap_err().reason_code(), "village_id_unknown");
}
