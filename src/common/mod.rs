// # Common Types and Traits
//
// Shared types used across Elder's core modules: the tagged scalar value used
// for entity attributes and dependency metadata, lifecycle traits implemented
// by long-lived components, and the identifier aliases shared by every table.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub mod bounded_map;

// ============================================================================
// Type Aliases - Shared Identifiers
// ============================================================================

/// 64-bit identifier used for every first-class record (tenants, organizations,
/// entities, dependencies, identities, issues, ...).
pub type Id = u64;

/// Per-row optimistic-concurrency counter. Strictly increases across updates.
pub type Revision = u64;

/// Opaque per-request token propagated through `Pipeline` into `AuditLog`.
pub type CorrelationId = uuid::Uuid;

// ============================================================================
// Tagged Value - backs Entity::attributes and Dependency::metadata
// ============================================================================

/// A tagged scalar used for the free-form attribute/metadata maps on
/// entities and dependencies. Operations never introspect these beyond the
/// `entity_type`/`dependency_type` discriminator; callers use the typed
/// accessor helpers below instead of pattern-matching ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Json(j) => j.to_string(),
            Value::Array(a) => format!("[{} items]", a.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

// ============================================================================
// Lifecycle Traits
// ============================================================================

/// Health of a long-lived component, surfaced by `/healthz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Standardized lifecycle interface implemented by components that own
/// background state (the graph cache, the audit sink, the id counter).
pub trait Component: Send + Sync {
    fn initialize(&mut self) -> crate::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> crate::Result<()> {
        Ok(())
    }

    fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_equality_ignores_type_across_variants() {
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_eq!(Value::from("x"), Value::String("x".to_string()));
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Integer(5).as_i64(), Some(5));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::Null.as_i64(), None);
    }
}
