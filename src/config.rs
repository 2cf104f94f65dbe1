//! Environment-derived configuration for the Elder core.
//!
//! Every knob named in the spec's Configuration section lives here with its
//! documented default. `Config::from_env` overlays `Config::default()` with
//! whatever `ELDER_*` variables are set, mirroring the teacher's
//! `ApiConfig`/`DatabaseConfig` construction pattern (defaults first, env
//! overlay second, no implicit global).

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Denies `hierarchy()` lookups deeper than this; default 64.
    pub max_hierarchy_depth: u32,

    /// Default depth cap for `impact()`; default 16.
    pub max_impact_depth: u32,

    /// Hard ceiling a caller may not exceed even by request; 128.
    pub max_impact_depth_hard_cap: u32,

    /// Deadline for `GraphEngine::analyze`, in milliseconds; default 60000.
    pub graph_analyze_timeout_ms: u64,

    /// Deadline for an ordinary request, in milliseconds; default 30000.
    pub request_timeout_ms: u64,

    /// Default `per_page` for list endpoints; 50.
    pub page_size_default: u32,

    /// Maximum `per_page` a list endpoint accepts; 1000.
    pub page_size_max: u32,

    /// Deadlock retries inside Store before surfacing `Deadlock`; 3.
    pub deadlock_retry_max: u32,

    /// Soft per-tenant request quota, in requests per second.
    pub per_tenant_qps_soft_cap: u32,

    /// Audit record retention window, in days.
    pub audit_retention_days: u32,

    /// Default membership TTL for approved group-access requests, in days.
    pub membership_default_ttl_days: u32,

    /// Fixed width of the Village-ID resource counter, in hex digits. 8.
    pub id_allocator_counter_padding: usize,

    /// Scope above which `analyze()` switches to sampled betweenness.
    pub analyze_sampling_threshold_nodes: usize,

    /// Listen address for the REST/RPC surface.
    pub listen_addr: String,

    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 64,
            max_impact_depth: 16,
            max_impact_depth_hard_cap: 128,
            graph_analyze_timeout_ms: 60_000,
            request_timeout_ms: 30_000,
            page_size_default: 50,
            page_size_max: 1000,
            deadlock_retry_max: 3,
            per_tenant_qps_soft_cap: 200,
            audit_retention_days: 365,
            membership_default_ttl_days: 90,
            id_allocator_counter_padding: 8,
            analyze_sampling_threshold_nodes: 5000,
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load defaults overlaid with any `ELDER_*` environment variables that
    /// are set and parse cleanly; malformed values are logged and ignored in
    /// favor of the default (never panics on a bad environment).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        macro_rules! overlay {
            ($field:ident, $env_var:literal) => {
                if let Ok(raw) = env::var($env_var) {
                    match raw.parse() {
                        Ok(parsed) => config.$field = parsed,
                        Err(_) => tracing::warn!(
                            var = $env_var,
                            value = %raw,
                            "ignoring unparsable configuration override"
                        ),
                    }
                }
            };
        }

        overlay!(max_hierarchy_depth, "ELDER_MAX_HIERARCHY_DEPTH");
        overlay!(max_impact_depth, "ELDER_MAX_IMPACT_DEPTH");
        overlay!(graph_analyze_timeout_ms, "ELDER_GRAPH_ANALYZE_TIMEOUT_MS");
        overlay!(request_timeout_ms, "ELDER_REQUEST_TIMEOUT_MS");
        overlay!(page_size_default, "ELDER_PAGE_SIZE_DEFAULT");
        overlay!(page_size_max, "ELDER_PAGE_SIZE_MAX");
        overlay!(deadlock_retry_max, "ELDER_DEADLOCK_RETRY_MAX");
        overlay!(per_tenant_qps_soft_cap, "ELDER_PER_TENANT_QPS_SOFT_CAP");
        overlay!(audit_retention_days, "ELDER_AUDIT_RETENTION_DAYS");
        overlay!(
            membership_default_ttl_days,
            "ELDER_MEMBERSHIP_DEFAULT_TTL_DAYS"
        );
        overlay!(listen_addr, "ELDER_LISTEN_ADDR");
        overlay!(port, "ELDER_PORT");

        config.max_impact_depth = config
            .max_impact_depth
            .min(config.max_impact_depth_hard_cap);

        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn graph_analyze_timeout(&self) -> Duration {
        Duration::from_millis(self.graph_analyze_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.max_hierarchy_depth, 64);
        assert_eq!(c.max_impact_depth, 16);
        assert_eq!(c.max_impact_depth_hard_cap, 128);
        assert_eq!(c.page_size_default, 50);
        assert_eq!(c.page_size_max, 1000);
        assert_eq!(c.deadlock_retry_max, 3);
        assert_eq!(c.id_allocator_counter_padding, 8);
    }

    #[test]
    fn impact_depth_is_clamped_to_hard_cap() {
        env::set_var("ELDER_MAX_IMPACT_DEPTH", "9999");
        let c = Config::from_env();
        assert_eq!(c.max_impact_depth, c.max_impact_depth_hard_cap);
        env::remove_var("ELDER_MAX_IMPACT_DEPTH");
    }
}
