//! # ApiSurface
//!
//! Resource-oriented endpoints translating the components below into the
//! REST surface from `spec.md` §6 (`/api/v1/...`), the Village-ID redirect
//! (`/r/{village_id}`), and `/healthz`. The RPC method catalog mirroring
//! these resources over binary HTTP/2 is declared in [`rpc_catalog`]; the
//! wire layer implementing it is an external collaborator per `spec.md` §1
//! ("the gRPC wire layer beyond its method catalog").
//!
//! Every handler follows the same shape: resolve the bearer principal
//! (`auth::authenticate`), build a request-scoped [`pipeline::Context`],
//! call into a borrowed [`Pipeline`], and translate its `Result` into the
//! JSON envelope from `error::ApiError`. `Pipeline` itself owns the
//! validate → authorize → mutate → audit → invalidate → commit sequence;
//! this layer never reaches into `Store` directly.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rpc_catalog;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cache_invalidator::CacheInvalidator;
use crate::config::Config;
use crate::graph::GraphEngine;
use crate::pipeline::{Context, Pipeline, TenantRateLimiter};
use crate::store::model::{Identity, IdentityType, PortalRole, VillageIdKind};
use crate::store::table::Page;
use crate::store::Store;

pub use error::{ApiError, ApiResult};

/// Every long-lived component the API surface touches is handed out as a
/// `&'static` reference (`Box::leak` in [`bootstrap`]) since the server runs
/// for the lifetime of the process — the same trick `GraphEngine`'s
/// borrow-from-`Store` design implies for any caller that outlives a single
/// stack frame. `AppState` is `Copy` so `axum::extract::State` clones are free.
#[derive(Clone, Copy)]
pub struct AppState {
    pub store: &'static Store,
    pub graph: &'static GraphEngine<'static>,
    pub cache: &'static CacheInvalidator,
    pub rate_limiter: &'static TenantRateLimiter,
    pub config: &'static Config,
    pub tokens: &'static auth::TokenStore,
}

impl AppState {
    pub fn pipeline(&self) -> Pipeline<'static> {
        Pipeline::new(self.store, self.graph, self.cache, self.rate_limiter, self.config)
    }

    /// Builds the request-scoped [`Context`] (principal, correlation id,
    /// deadline) every Pipeline call needs, per `spec.md` §9's replacement
    /// for a "global DB session / app singleton".
    pub fn context(&self, headers: &HeaderMap) -> ApiResult<Context> {
        let principal = auth::authenticate(self.store, self.tokens, headers)?;
        Ok(Context::new(principal, uuid::Uuid::new_v4(), self.config.request_timeout()))
    }
}

/// Wraps a paginated [`Page`] into the `{items, total, page, per_page, pages}`
/// envelope every list endpoint returns (`spec.md` §6).
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
    pub pages: u32,
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        let pages = page.pages();
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            pages,
        }
    }
}

/// Query-string parameters common to every list endpoint: `page`
/// (1-indexed, default 1) and `per_page` (default `page_size_default`, max
/// `page_size_max`, enforced by `Pagination::new` inside `Pipeline`).
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    pub fn per_page(&self, config: &Config) -> u32 {
        self.per_page.unwrap_or(config.page_size_default)
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        version: crate::VERSION,
    })
}

/// `GET /r/{village_id}`: unauthenticated redirect to the canonical
/// resource path, or a 404 JSON error if the id is unknown (`spec.md` §6).
async fn village_id_redirect(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(village_id): axum::extract::Path<String>,
) -> ApiResult<axum::response::Redirect> {
    let resolution = state.pipeline().lookup_village_id(&village_id)?;
    Ok(axum::response::Redirect::temporary(&resolution.redirect_path))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/r/{village_id}", get(village_id_redirect))
        .route("/api/v1/lookup/{village_id}", get(handlers::lookup::lookup))
        .route("/api/v1/tenants", post(handlers::tenancy::create_tenant))
        .route(
            "/api/v1/organizations",
            get(handlers::tenancy::list_organizations).post(handlers::tenancy::create_organization),
        )
        .route(
            "/api/v1/organizations/{id}",
            get(handlers::tenancy::get_organization).delete(handlers::tenancy::delete_organization),
        )
        .route(
            "/api/v1/organizations/{id}/parent",
            patch(handlers::tenancy::reparent_organization),
        )
        .route(
            "/api/v1/entities",
            get(handlers::inventory::list_entities).post(handlers::inventory::create_entity),
        )
        .route(
            "/api/v1/entities/{id}",
            get(handlers::inventory::get_entity)
                .patch(handlers::inventory::update_entity)
                .delete(handlers::inventory::delete_entity),
        )
        .route(
            "/api/v1/dependencies",
            get(handlers::inventory::list_dependencies).post(handlers::inventory::create_dependency),
        )
        .route(
            "/api/v1/dependencies/{id}",
            get(handlers::inventory::get_dependency).delete(handlers::inventory::delete_dependency),
        )
        .route(
            "/api/v1/identities",
            post(handlers::identity::create_identity),
        )
        .route(
            "/api/v1/resource-roles",
            post(handlers::identity::grant_resource_role),
        )
        .route(
            "/api/v1/issues",
            get(handlers::issues::list_issues).post(handlers::issues::create_issue),
        )
        .route(
            "/api/v1/issues/{id}",
            patch(handlers::issues::update_issue).delete(handlers::issues::delete_issue),
        )
        .route(
            "/api/v1/issues/{id}/labels",
            post(handlers::issues::attach_label),
        )
        .route(
            "/api/v1/issues/{id}/comments",
            get(handlers::issues::list_comments).post(handlers::issues::create_comment),
        )
        .route(
            "/api/v1/labels",
            get(handlers::issues::list_labels).post(handlers::issues::create_label),
        )
        .route(
            "/api/v1/milestones",
            get(handlers::projects::list_milestones).post(handlers::projects::create_milestone),
        )
        .route(
            "/api/v1/milestones/{id}",
            patch(handlers::projects::update_milestone).delete(handlers::projects::delete_milestone),
        )
        .route(
            "/api/v1/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route(
            "/api/v1/projects/{id}",
            patch(handlers::projects::update_project).delete(handlers::projects::delete_project),
        )
        .route(
            "/api/v1/on-call/rotations",
            post(handlers::oncall::create_rotation),
        )
        .route(
            "/api/v1/on-call/current",
            get(handlers::oncall::current),
        )
        .route(
            "/api/v1/on-call/timeline",
            get(handlers::oncall::timeline),
        )
        .route("/api/v1/groups", post(handlers::groups::create_group))
        .route(
            "/api/v1/groups/{id}/access-requests",
            post(handlers::groups::submit_access_request),
        )
        .route(
            "/api/v1/access-requests/{id}/decisions",
            post(handlers::groups::decide_access_request),
        )
        .route("/api/v1/audit-logs", get(handlers::audit::query))
        .route("/api/v1/graph/impact", get(handlers::graph::impact))
        .route("/api/v1/graph/path", get(handlers::graph::path))
        .route("/api/v1/graph/analyze", get(handlers::graph::analyze))
        .route(
            "/api/v1/graph/network-topology",
            get(handlers::graph::network_topology),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(state.config.request_timeout_ms)))
        .layer(cors)
        .with_state(state)
}

/// Leaks every long-lived component to `'static` and seeds a bootstrap
/// `super_admin` identity (tenant 0, a reserved pseudo-tenant that owns no
/// resources) with a freshly generated token, since every other identity is
/// created through `Pipeline::create_identity`, which itself requires an
/// authenticated `admin` principal to call. Returns the state plus that
/// bootstrap token so an operator can mint the first real tenant and
/// identities with it.
pub fn bootstrap(config: Config) -> (AppState, String) {
    let store: &'static Store = Box::leak(Box::new(Store::new()));
    let graph: &'static GraphEngine<'static> =
        Box::leak(Box::new(GraphEngine::new(store, config.max_hierarchy_depth, config.analyze_sampling_threshold_nodes)));
    let cache: &'static CacheInvalidator = Box::leak(Box::new(CacheInvalidator::new()));
    let rate_limiter: &'static TenantRateLimiter =
        Box::leak(Box::new(TenantRateLimiter::new(config.per_tenant_qps_soft_cap)));
    let config: &'static Config = Box::leak(Box::new(config));
    let tokens: &'static auth::TokenStore = Box::leak(Box::new(auth::TokenStore::new()));

    let bootstrap_id = store.identities.next_id();
    let bootstrap_identity = Identity {
        id: bootstrap_id,
        tenant_id: 0,
        revision: 1,
        village_id: "0000-0000-00000000".to_string(),
        username: "bootstrap".to_string(),
        email: "bootstrap@elder.local".to_string(),
        identity_type: IdentityType::ServiceAccount,
        auth_provider: "internal".to_string(),
        portal_role: PortalRole::SuperAdmin,
        is_active: true,
        mfa_enabled: false,
        credential_fingerprint: None,
    };
    let _ = VillageIdKind::Identity;

    let token = uuid::Uuid::new_v4().to_string();
    tokens.issue(&token, bootstrap_id);
    let bootstrap_identity = Identity {
        credential_fingerprint: Some(auth::fingerprint_for_display(&token)),
        ..bootstrap_identity
    };
    store.identities.insert(bootstrap_identity).expect("bootstrap identity id is fresh");

    (
        AppState {
            store,
            graph,
            cache,
            rate_limiter,
            config,
            tokens,
        },
        token,
    )
}

/// Serves the router until `shutdown` resolves (or forever, via
/// [`std::future::pending`], when the caller has no shutdown signal).
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "elder-core listening");
    axum::serve(listener, app).await
}

pub fn not_found() -> ApiError {
    ApiError(crate::error::ElderError::ResourceMissing("route".to_string()))
}

#[allow(dead_code)]
fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
