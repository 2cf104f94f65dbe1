//! Elder-core server entry point: loads configuration, constructs the
//! in-memory store and its dependent engines, seeds a bootstrap
//! super-admin identity, and serves the REST surface until the process is
//! signalled to stop.

use elder_core::api::{self, AppState};
use elder_core::{Config, Result};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let (state, bootstrap_token): (AppState, String) = api::bootstrap(config);

    tracing::warn!(
        bootstrap_token = %bootstrap_token,
        "seeded bootstrap super_admin identity; use this token to create the first tenant, then rotate it"
    );

    let addr: SocketAddr = format!("{}:{}", state.config.listen_addr, state.config.port)
        .parse()
        .expect("listen_addr/port form a valid socket address");

    api::serve(state, addr).await.map_err(|err| elder_core::ElderError::StorageUnavailable(err.to_string()))
}

fn print_banner(config: &Config) {
    println!("elder-core {}", elder_core::VERSION);
    println!("  listening on {}:{}", config.listen_addr, config.port);
    println!("  max_hierarchy_depth={} max_impact_depth={} (hard cap {})",
        config.max_hierarchy_depth, config.max_impact_depth, config.max_impact_depth_hard_cap);
    println!("  page_size_default={} page_size_max={}", config.page_size_default, config.page_size_max);
    println!("  per_tenant_qps_soft_cap={}", config.per_tenant_qps_soft_cap);
}
