//! Request-scoped [`Context`] threaded through every `Pipeline` step:
//! the authenticated principal, the request deadline, and the correlation
//! id propagated into `AuditLog` (`spec.md` §9, replacing "Global DB
//! session / app singleton" with an explicit value passed down from the
//! entry point).

use crate::store::model::Identity;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Context {
    pub principal: Identity,
    pub correlation_id: uuid::Uuid,
    deadline: Instant,
}

impl Context {
    pub fn new(principal: Identity, correlation_id: uuid::Uuid, timeout: Duration) -> Self {
        Self {
            principal,
            correlation_id,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn check_deadline(&self) -> crate::error::Result<()> {
        if Instant::now() >= self.deadline {
            return Err(crate::error::ElderError::CancelledByDeadline);
        }
        Ok(())
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
