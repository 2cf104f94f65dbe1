//! # OnCallResolver
//!
//! Resolves the identity on call for a scope at an instant, and sweeps a
//! time range into a gapless, non-overlapping partition (`spec.md` §4.5).
//!
//! Precedence: any override whose half-open `[start, end)` contains the
//! instant wins over every rotation, breaking ties among overlapping
//! overrides by most-recently-created. Absent an override, the rotation
//! whose shift contains the instant wins, breaking ties among overlapping
//! rotations by smallest `priority` then smallest `id` — the spec notes
//! this tiebreak is the implementation's choice where the source leaves it
//! unspecified (`spec.md` §9 Open Questions; recorded in `DESIGN.md`).

use crate::common::Id;
use crate::store::model::{OnCallOverride, OnCallRotation, OnCallScopeType};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentOnCall {
    pub identity_id: Id,
    pub identity_name: String,
    pub shift_start: DateTime<Utc>,
    pub shift_end: DateTime<Utc>,
    pub is_override: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnCallSegment {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub identity_id: Option<Id>,
    pub is_override: bool,
}

pub struct OnCallResolver<'s> {
    store: &'s Store,
}

enum Winner {
    Override { identity_id: Id, start: DateTime<Utc>, end: DateTime<Utc> },
    Shift { identity_id: Id, start: DateTime<Utc>, end: DateTime<Utc> },
}

impl<'s> OnCallResolver<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    fn overrides_for(&self, tenant_id: Id, scope_type: OnCallScopeType, scope_id: Id) -> Vec<OnCallOverride> {
        self.store
            .oncall_overrides
            .list_by(|o| o.tenant_id == tenant_id && o.scope_type == scope_type && o.scope_id == scope_id)
    }

    fn rotations_for(&self, tenant_id: Id, scope_type: OnCallScopeType, scope_id: Id) -> Vec<OnCallRotation> {
        self.store
            .oncall_rotations
            .list_by(|r| r.tenant_id == tenant_id && r.scope_type == scope_type && r.scope_id == scope_id)
    }

    fn resolve_at(
        &self,
        overrides: &[OnCallOverride],
        rotations: &[OnCallRotation],
        instant: DateTime<Utc>,
    ) -> Option<Winner> {
        let active_override = overrides
            .iter()
            .filter(|o| o.start <= instant && instant < o.end)
            .max_by_key(|o| o.created_at);
        if let Some(o) = active_override {
            return Some(Winner::Override {
                identity_id: o.identity_id,
                start: o.start,
                end: o.end,
            });
        }

        let mut candidates: Vec<(&OnCallRotation, Id, DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for rotation in rotations {
            if let Some(shift) = rotation
                .shifts
                .iter()
                .find(|s| s.start <= instant && instant < s.end)
            {
                candidates.push((rotation, shift.identity_id, shift.start, shift.end));
            }
        }
        candidates.sort_by(|a, b| a.0.priority.cmp(&b.0.priority).then(a.0.id.cmp(&b.0.id)));
        candidates.into_iter().next().map(|(_, identity_id, start, end)| Winner::Shift {
            identity_id,
            start,
            end,
        })
    }

    /// `current_on_call(scope, instant)`.
    pub fn current_on_call(
        &self,
        tenant_id: Id,
        scope_type: OnCallScopeType,
        scope_id: Id,
        instant: DateTime<Utc>,
    ) -> Option<CurrentOnCall> {
        let overrides = self.overrides_for(tenant_id, scope_type, scope_id);
        let rotations = self.rotations_for(tenant_id, scope_type, scope_id);
        let winner = self.resolve_at(&overrides, &rotations, instant)?;
        let (identity_id, shift_start, shift_end, is_override) = match winner {
            Winner::Override { identity_id, start, end } => (identity_id, start, end, true),
            Winner::Shift { identity_id, start, end } => (identity_id, start, end, false),
        };
        let identity_name = self
            .store
            .identities
            .get(identity_id)
            .map(|i| i.username)
            .unwrap_or_default();
        Some(CurrentOnCall {
            identity_id,
            identity_name,
            shift_start,
            shift_end,
            is_override,
        })
    }

    /// Sweeps `[a, b)` into a time-ordered, gapless, non-overlapping
    /// partition. Boundaries are every override/shift start or end that
    /// falls within the range, plus `a` and `b` themselves; within each
    /// boundary-delimited region the winner cannot change, since nothing
    /// starts or ends mid-region.
    pub fn who_is_on_call_between(
        &self,
        tenant_id: Id,
        scope_type: OnCallScopeType,
        scope_id: Id,
        a: DateTime<Utc>,
        b: DateTime<Utc>,
    ) -> Vec<OnCallSegment> {
        if a >= b {
            return Vec::new();
        }
        let overrides = self.overrides_for(tenant_id, scope_type, scope_id);
        let rotations = self.rotations_for(tenant_id, scope_type, scope_id);

        let mut boundaries = vec![a, b];
        for o in &overrides {
            if o.start > a && o.start < b {
                boundaries.push(o.start);
            }
            if o.end > a && o.end < b {
                boundaries.push(o.end);
            }
        }
        for r in &rotations {
            for s in &r.shifts {
                if s.start > a && s.start < b {
                    boundaries.push(s.start);
                }
                if s.end > a && s.end < b {
                    boundaries.push(s.end);
                }
            }
        }
        boundaries.sort();
        boundaries.dedup();

        let mut segments = Vec::new();
        for window in boundaries.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            if lo >= hi {
                continue;
            }
            let winner = self.resolve_at(&overrides, &rotations, lo);
            let (identity_id, is_override) = match winner {
                Some(Winner::Override { identity_id, .. }) => (Some(identity_id), true),
                Some(Winner::Shift { identity_id, .. }) => (Some(identity_id), false),
                None => (None, false),
            };
            segments.push(OnCallSegment {
                from: lo,
                to: hi,
                identity_id,
                is_override,
            });
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::*;
    use chrono::TimeZone;

    fn identity(id: Id, name: &str) -> Identity {
        Identity {
            id,
            tenant_id: 1,
            revision: 1,
            village_id: format!("00a1-0000-{id:08x}"),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            identity_type: IdentityType::Human,
            auth_provider: "internal".to_string(),
            portal_role: PortalRole::Viewer,
            is_active: true,
            mfa_enabled: false,
            credential_fingerprint: None,
        }
    }

    fn dt(hour: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
    }

    fn daily_rotation(id: Id, alice: Id, bob: Id) -> OnCallRotation {
        OnCallRotation {
            id,
            tenant_id: 1,
            revision: 1,
            scope_type: OnCallScopeType::Organization,
            scope_id: 1,
            priority: 0,
            shifts: vec![
                OnCallShift { identity_id: alice, start: dt(8, 1), end: dt(20, 1) },
                OnCallShift { identity_id: bob, start: dt(20, 1), end: dt(8, 2) },
            ],
        }
    }

    #[test]
    fn override_takes_precedence_over_rotation() {
        let store = Store::new();
        let alice = 10;
        let bob = 11;
        let carol = 12;
        store.identities.insert(identity(alice, "alice")).unwrap();
        store.identities.insert(identity(bob, "bob")).unwrap();
        store.identities.insert(identity(carol, "carol")).unwrap();
        store.oncall_rotations.insert(daily_rotation(1, alice, bob)).unwrap();
        store
            .oncall_overrides
            .insert(OnCallOverride {
                id: 1,
                tenant_id: 1,
                revision: 1,
                scope_type: OnCallScopeType::Organization,
                scope_id: 1,
                identity_id: carol,
                start: dt(10, 1),
                end: dt(11, 1),
                reason: "coverage".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        let resolver = OnCallResolver::new(&store);
        let during_override = resolver
            .current_on_call(1, OnCallScopeType::Organization, 1, dt(10, 1) + chrono::Duration::minutes(30))
            .unwrap();
        assert_eq!(during_override.identity_id, carol);
        assert!(during_override.is_override);

        let after_override = resolver
            .current_on_call(1, OnCallScopeType::Organization, 1, dt(12, 1))
            .unwrap();
        assert_eq!(after_override.identity_id, alice);
        assert!(!after_override.is_override);
    }

    #[test]
    fn who_is_on_call_between_partitions_range_without_gaps() {
        let store = Store::new();
        let alice = 10;
        let bob = 11;
        store.identities.insert(identity(alice, "alice")).unwrap();
        store.identities.insert(identity(bob, "bob")).unwrap();
        store.oncall_rotations.insert(daily_rotation(1, alice, bob)).unwrap();

        let resolver = OnCallResolver::new(&store);
        let segments = resolver.who_is_on_call_between(
            1,
            OnCallScopeType::Organization,
            1,
            dt(0, 1),
            dt(0, 2),
        );
        assert_eq!(segments.first().unwrap().from, dt(0, 1));
        assert_eq!(segments.last().unwrap().to, dt(0, 2));
        for pair in segments.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
    }

    #[test]
    fn uncovered_region_reports_null_identity() {
        let store = Store::new();
        let resolver = OnCallResolver::new(&store);
        let segments = resolver.who_is_on_call_between(
            1,
            OnCallScopeType::Organization,
            1,
            dt(0, 1),
            dt(0, 2),
        );
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].identity_id, None);
    }

    #[test]
    fn overlapping_rotations_tiebreak_by_priority_then_id() {
        let store = Store::new();
        let alice = 10;
        let bob = 11;
        store.identities.insert(identity(alice, "alice")).unwrap();
        store.identities.insert(identity(bob, "bob")).unwrap();
        let mut low_priority = daily_rotation(1, alice, bob);
        low_priority.priority = 5;
        let mut high_priority = daily_rotation(2, bob, alice);
        high_priority.priority = 1;
        store.oncall_rotations.insert(low_priority).unwrap();
        store.oncall_rotations.insert(high_priority).unwrap();

        let resolver = OnCallResolver::new(&store);
        let winner = resolver
            .current_on_call(1, OnCallScopeType::Organization, 1, dt(10, 1))
            .unwrap();
        assert_eq!(winner.identity_id, bob);
    }
}
