//! Per-tenant soft-quota token bucket (`spec.md` §5 Fairness /
//! `per_tenant_qps_soft_cap`). A single bucket is refilled lazily on each
//! `try_acquire` call rather than by a background ticker, since the core
//! has no reason to spend a thread on tenants that aren't making requests.

use crate::common::Id;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct TenantRateLimiter {
    capacity: f64,
    refill_per_second: f64,
    buckets: DashMap<Id, Mutex<Bucket>>,
}

impl TenantRateLimiter {
    pub fn new(qps_soft_cap: u32) -> Self {
        let capacity = qps_soft_cap.max(1) as f64;
        Self {
            capacity,
            refill_per_second: capacity,
            buckets: DashMap::new(),
        }
    }

    pub fn try_acquire(&self, tenant_id: Id) -> bool {
        let entry = self
            .buckets
            .entry(tenant_id)
            .or_insert_with(|| Mutex::new(Bucket { tokens: self.capacity, last_refill: Instant::now() }));
        let mut bucket = entry.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refuses_until_refill() {
        let limiter = TenantRateLimiter::new(2);
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }

    #[test]
    fn tenants_have_independent_buckets() {
        let limiter = TenantRateLimiter::new(1);
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
    }
}
