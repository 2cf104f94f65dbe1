//! Error taxonomy for Elder's core.
//!
//! A single enum carries every failure kind a component can surface. Variants
//! map 1:1 onto the closed reason-code sets used in the REST/RPC error
//! envelope and in `AuditRecord.outcome`; callers match on them rather than
//! parsing message strings.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElderError {
    // --- Validation ---
    #[error("validation error: {0}")]
    Validation(String),

    // --- AuthN/AuthZ ---
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("tenant mismatch: principal tenant does not own this resource")]
    TenantMismatch,

    // --- NotFound family ---
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("resource not found: {0}")]
    ResourceMissing(String),

    #[error("unknown village id: {0}")]
    VillageIdUnknown(String),

    #[error("malformed village id: {0}")]
    Malformed(String),

    // --- Conflict family ---
    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("dependent resources exist: {0}")]
    DependentExists(String),

    #[error("would create cycle: {path:?}")]
    WouldCreateCycle { path: Vec<String> },

    #[error("stale revision: expected {expected}, found {found}")]
    StaleRevision { expected: u64, found: u64 },

    // --- Transient ---
    #[error("deadlock detected")]
    Deadlock,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    // --- Deadline / quota ---
    #[error("cancelled by deadline")]
    CancelledByDeadline,

    #[error("depth exceeded: {0}")]
    DepthExceeded(String),

    #[error("rate limited: tenant {0} exceeded its quota")]
    RateLimited(String),

    // --- Catch-all ---
    #[error("internal error: {0}")]
    Internal(String),
}

impl ElderError {
    /// The closed reason-code set used in `details.reason` for 409 responses
    /// and in `AuditRecord` outcomes, per the taxonomy in the spec.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ElderError::Validation(_) => "validation",
            ElderError::Unauthenticated => "unauthenticated",
            ElderError::Forbidden { .. } => "forbidden",
            ElderError::TenantMismatch => "tenant_mismatch",
            ElderError::UnknownTenant(_) => "unknown_tenant",
            ElderError::ResourceMissing(_) => "resource_missing",
            ElderError::VillageIdUnknown(_) => "village_id_unknown",
            ElderError::Malformed(_) => "malformed",
            ElderError::UniqueViolation(_) => "unique",
            ElderError::ForeignKeyViolation(_) => "foreign_key",
            ElderError::DependentExists(_) => "dependent_exists",
            ElderError::WouldCreateCycle { .. } => "cycle",
            ElderError::StaleRevision { .. } => "stale_revision",
            ElderError::Deadlock => "deadlock",
            ElderError::StorageUnavailable(_) => "storage_unavailable",
            ElderError::CancelledByDeadline => "cancelled_by_deadline",
            ElderError::DepthExceeded(_) => "depth_exceeded",
            ElderError::RateLimited(_) => "rate_limited",
            ElderError::Internal(_) => "internal",
        }
    }

    /// Whether Store may retry this condition internally without caller
    /// involvement (deadlocks only; everything else bubbles up unchanged).
    pub fn is_store_retryable(&self) -> bool {
        matches!(self, ElderError::Deadlock)
    }
}

impl From<serde_json::Error> for ElderError {
    fn from(e: serde_json::Error) -> Self {
        ElderError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ElderError>;
