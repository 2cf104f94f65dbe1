//! # GroupWorkflow
//!
//! Access-request state machine with approval-mode aggregation (`spec.md`
//! §4.6): `Pending -> Approved|Denied|Expired`, `Approved -> Revoked|Expired`.
//! Every transition appends an `AuditRecord` through the caller's
//! [`crate::audit::AuditLog`]; this module only decides the next state and
//! the membership side effect, leaving the actual audit/commit sequencing
//! to [`crate::pipeline::Pipeline`].

use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::{
    AccessRequest, AccessRequestState, ApprovalDecision, ApprovalMode, ApprovalRecord, Group,
    GroupProvider, Membership,
};
use crate::store::Store;
use chrono::{DateTime, Utc};

/// Emitted when a provider-linked (`provider != internal`), sync-enabled
/// group's membership changes; consumed by the external provider
/// collaborator (`spec.md` §4.6) — the core's obligation stops at producing
/// this value.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSyncRequested {
    pub group_id: Id,
    pub identity_id: Id,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub request: AccessRequest,
    pub membership: Option<Membership>,
    pub sync_event: Option<GroupSyncRequested>,
}

pub struct GroupWorkflow<'s> {
    store: &'s Store,
}

impl<'s> GroupWorkflow<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    fn owners(&self, group: &Group) -> Vec<Id> {
        let mut owners: Vec<Id> = group.owner_identity_ids.iter().copied().collect();
        if !owners.contains(&group.owner_identity_id) {
            owners.push(group.owner_identity_id);
        }
        owners
    }

    /// Opens a `Pending` request. The caller (`Pipeline`) is responsible
    /// for allocating the row id and persisting it via `Store`.
    pub fn submit(&self, group_id: Id, tenant_id: Id, requester_id: Id, reason: String) -> AccessRequest {
        AccessRequest {
            id: self.store.access_requests.next_id(),
            tenant_id,
            revision: 1,
            group_id,
            requester_id,
            reason,
            state: AccessRequestState::Pending,
            approvals: Vec::new(),
            created_at: Utc::now(),
            resolved_at: None,
            membership_id: None,
        }
    }

    /// Records `decision` from `owner_identity_id` and applies the
    /// approval-mode aggregation rule for `group.approval_mode`. Returns the
    /// updated request (still `Pending` if aggregation hasn't settled) plus
    /// any membership row to persist and any sync event to emit.
    pub fn decide(
        &self,
        group: &Group,
        mut request: AccessRequest,
        owner_identity_id: Id,
        decision: ApprovalDecision,
    ) -> Result<DecisionOutcome> {
        if request.state != AccessRequestState::Pending {
            return Err(ElderError::Validation(format!(
                "access request {} is not pending",
                request.id
            )));
        }
        let owners = self.owners(group);
        if !owners.contains(&owner_identity_id) {
            return Err(ElderError::Forbidden {
                reason: "not_a_group_owner".to_string(),
            });
        }

        request.approvals.push(ApprovalRecord {
            owner_identity_id,
            decision,
            decided_at: Utc::now(),
        });

        let approvals: Vec<Id> = request
            .approvals
            .iter()
            .filter(|a| a.decision == ApprovalDecision::Approve)
            .map(|a| a.owner_identity_id)
            .collect();
        let denials: Vec<Id> = request
            .approvals
            .iter()
            .filter(|a| a.decision == ApprovalDecision::Deny)
            .map(|a| a.owner_identity_id)
            .collect();

        let settled = match group.approval_mode {
            ApprovalMode::Any => {
                if !approvals.is_empty() {
                    Some(AccessRequestState::Approved)
                } else if !denials.is_empty() {
                    Some(AccessRequestState::Denied)
                } else {
                    None
                }
            }
            ApprovalMode::All => {
                if !denials.is_empty() {
                    Some(AccessRequestState::Denied)
                } else if owners.iter().all(|o| approvals.contains(o)) {
                    Some(AccessRequestState::Approved)
                } else {
                    None
                }
            }
            ApprovalMode::Threshold => {
                let threshold = group.approval_threshold as usize;
                let distinct_approvals = approvals.len();
                if distinct_approvals >= threshold {
                    Some(AccessRequestState::Approved)
                } else {
                    let remaining_possible = owners.len() - approvals.len() - denials.len();
                    let still_reachable = distinct_approvals + remaining_possible >= threshold;
                    if !still_reachable {
                        Some(AccessRequestState::Denied)
                    } else {
                        None
                    }
                }
            }
        };

        let mut membership = None;
        let mut sync_event = None;

        if let Some(state) = settled {
            request.state = state;
            request.resolved_at = Some(Utc::now());
            if state == AccessRequestState::Approved {
                let row = Membership {
                    id: self.store.memberships.next_id(),
                    tenant_id: request.tenant_id,
                    revision: 1,
                    group_id: group.id,
                    identity_id: request.requester_id,
                    expires_at: None,
                };
                request.membership_id = Some(row.id);
                membership = Some(row);
                if group.provider != GroupProvider::Internal && group.sync_enabled {
                    sync_event = Some(GroupSyncRequested {
                        group_id: group.id,
                        identity_id: request.requester_id,
                    });
                }
            }
        }

        Ok(DecisionOutcome {
            request,
            membership,
            sync_event,
        })
    }

    /// Expires a `Pending` request past its decision window, or an
    /// `Approved` request's membership past its TTL, removing the
    /// membership row in the latter case.
    pub fn expire(&self, mut request: AccessRequest) -> Result<AccessRequest> {
        match request.state {
            AccessRequestState::Pending => {
                request.state = AccessRequestState::Expired;
                request.resolved_at = Some(Utc::now());
            }
            AccessRequestState::Approved => {
                if let Some(membership_id) = request.membership_id {
                    let _ = self.store.memberships.delete(membership_id);
                }
                request.state = AccessRequestState::Expired;
            }
            other => {
                return Err(ElderError::Validation(format!(
                    "cannot expire request in state {other:?}"
                )));
            }
        }
        Ok(request)
    }

    /// Revokes an `Approved` request's membership outright (owner- or
    /// admin-initiated, outside the expiry sweep).
    pub fn revoke(&self, mut request: AccessRequest) -> Result<AccessRequest> {
        if request.state != AccessRequestState::Approved {
            return Err(ElderError::Validation(
                "only an approved request can be revoked".to_string(),
            ));
        }
        if let Some(membership_id) = request.membership_id {
            let _ = self.store.memberships.delete(membership_id);
        }
        request.state = AccessRequestState::Revoked;
        Ok(request)
    }

    pub fn membership_expired(membership: &Membership, now: DateTime<Utc>) -> bool {
        membership.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn group(mode: ApprovalMode, threshold: u32, owners: &[Id]) -> Group {
        let mut owner_set: HashSet<Id> = owners.iter().copied().collect();
        owner_set.remove(&owners[0]);
        Group {
            id: 1,
            tenant_id: 1,
            revision: 1,
            name: "g".to_string(),
            owner_identity_id: owners[0],
            owner_identity_ids: owner_set,
            approval_mode: mode,
            approval_threshold: threshold,
            provider: GroupProvider::Internal,
            sync_enabled: false,
        }
    }

    #[test]
    fn threshold_mode_scenario_from_spec() {
        let store = Store::new();
        let workflow = GroupWorkflow::new(&store);
        let g = group(ApprovalMode::Threshold, 2, &[1, 2, 3]);
        let mut request = workflow.submit(g.id, 1, 99, "need access".to_string());

        let outcome = workflow.decide(&g, request, 1, ApprovalDecision::Approve).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Pending);
        assert!(outcome.membership.is_none());
        request = outcome.request;

        let outcome = workflow.decide(&g, request, 2, ApprovalDecision::Approve).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Approved);
        assert!(outcome.membership.is_some());
        request = outcome.request;

        // Third owner's later approval is accepted but state unchanged.
        let outcome = workflow.decide(&g, request, 3, ApprovalDecision::Approve);
        assert!(outcome.is_err());
    }

    #[test]
    fn any_mode_first_deny_rejects() {
        let store = Store::new();
        let workflow = GroupWorkflow::new(&store);
        let g = group(ApprovalMode::Any, 1, &[1, 2]);
        let request = workflow.submit(g.id, 1, 99, "r".to_string());
        let outcome = workflow.decide(&g, request, 2, ApprovalDecision::Deny).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Denied);
    }

    #[test]
    fn all_mode_requires_every_owner() {
        let store = Store::new();
        let workflow = GroupWorkflow::new(&store);
        let g = group(ApprovalMode::All, 1, &[1, 2, 3]);
        let request = workflow.submit(g.id, 1, 99, "r".to_string());
        let outcome = workflow.decide(&g, request, 1, ApprovalDecision::Approve).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Pending);
        let outcome = workflow.decide(&g, outcome.request, 2, ApprovalDecision::Approve).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Pending);
        let outcome = workflow.decide(&g, outcome.request, 3, ApprovalDecision::Approve).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Approved);
    }

    #[test]
    fn threshold_mode_early_deny_when_unreachable() {
        let store = Store::new();
        let workflow = GroupWorkflow::new(&store);
        let g = group(ApprovalMode::Threshold, 3, &[1, 2, 3]);
        let request = workflow.submit(g.id, 1, 99, "r".to_string());
        let outcome = workflow.decide(&g, request, 1, ApprovalDecision::Deny).unwrap();
        assert_eq!(outcome.request.state, AccessRequestState::Pending);
        let outcome = workflow.decide(&g, outcome.request, 2, ApprovalDecision::Deny).unwrap();
        // 2 denials leaves only 1 possible approval < threshold of 3.
        assert_eq!(outcome.request.state, AccessRequestState::Denied);
    }

    #[test]
    fn expire_pending_and_approved() {
        let store = Store::new();
        let workflow = GroupWorkflow::new(&store);
        let g = group(ApprovalMode::Any, 1, &[1]);
        let request = workflow.submit(g.id, 1, 99, "r".to_string());
        let expired = workflow.expire(request).unwrap();
        assert_eq!(expired.state, AccessRequestState::Expired);

        let request = workflow.submit(g.id, 1, 99, "r".to_string());
        let outcome = workflow.decide(&g, request, 1, ApprovalDecision::Approve).unwrap();
        let membership = outcome.membership.unwrap();
        assert_eq!(outcome.request.membership_id, Some(membership.id));
        store.memberships.insert(membership.clone()).unwrap();

        let expired = workflow.expire(outcome.request).unwrap();
        assert_eq!(expired.state, AccessRequestState::Expired);
        assert!(store.memberships.get(membership.id).is_none());
    }
}
