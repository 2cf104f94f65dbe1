//! # AuditLog
//!
//! Append-only log of authorized mutations and sensitive reads (`spec.md`
//! §4.8). Writes happen inside the same `StoreTxn` as the mutation they
//! describe (`Pipeline` step 5) and are rolled back with it on failure;
//! reads are filterable by principal, resource, action, and time range, and
//! are themselves gated by `AuthzEngine` (admin, or `operator`-or-higher on
//! the resource in question).

use crate::authz::AuthzEngine;
use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::{AuditOutcome, AuditRecord, Identity, PortalRole, Role};
use crate::store::Store;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub principal_id: Option<Id>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Id>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, record: &AuditRecord) -> bool {
        self.principal_id.map(|p| Some(p) == record.principal_id).unwrap_or(true)
            && self
                .resource_type
                .as_deref()
                .map(|t| t == record.resource_type)
                .unwrap_or(true)
            && self.resource_id.map(|id| id == record.resource_id).unwrap_or(true)
            && self.action.as_deref().map(|a| a == record.action).unwrap_or(true)
            && self.since.map(|s| record.timestamp >= s).unwrap_or(true)
            && self.until.map(|u| record.timestamp < u).unwrap_or(true)
    }
}

pub struct AuditLog<'s> {
    store: &'s Store,
}

impl<'s> AuditLog<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Appends a record through `txn`, so a rollback of the surrounding
    /// mutation also undoes the audit write — satisfies `spec.md` §4.7 step
    /// 6 ("If commit fails, audit is rolled back with the transaction").
    #[allow(clippy::too_many_arguments)]
    pub fn append_in_txn(
        &self,
        txn: &mut crate::store::txn::StoreTxn<'s>,
        principal_id: Option<Id>,
        action: &str,
        resource_type: &str,
        resource_id: Id,
        tenant_id: Id,
        before_hash: Option<String>,
        after_hash: Option<String>,
        outcome: AuditOutcome,
        correlation_id: uuid::Uuid,
        reason_code: Option<String>,
    ) -> AuditRecord {
        let record = AuditRecord {
            id: self.store.audit_records.next_id(),
            tenant_id,
            revision: 1,
            timestamp: Utc::now(),
            principal_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            before_hash,
            after_hash,
            outcome,
            correlation_id,
            reason_code,
        };
        txn.insert(&self.store.audit_records, record.clone())
            .expect("audit record ids are allocated fresh per append");
        record
    }

    /// Appends a record outside of any `StoreTxn` (used by the admin purge
    /// meta-record, which documents its own irreversible side effect rather
    /// than participating in a rollback).
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        principal_id: Option<Id>,
        action: &str,
        resource_type: &str,
        resource_id: Id,
        tenant_id: Id,
        before_hash: Option<String>,
        after_hash: Option<String>,
        outcome: AuditOutcome,
        correlation_id: uuid::Uuid,
        reason_code: Option<String>,
    ) -> AuditRecord {
        let record = AuditRecord {
            id: self.store.audit_records.next_id(),
            tenant_id,
            revision: 1,
            timestamp: Utc::now(),
            principal_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            before_hash,
            after_hash,
            outcome,
            correlation_id,
            reason_code,
        };
        // Append-only: inserted unconditionally, never updated in place.
        self.store
            .audit_records
            .insert(record.clone())
            .expect("audit record ids are allocated fresh per append");
        record
    }

    /// Filtered read, gated per `spec.md` §4.8: admins may read anything in
    /// their tenant; otherwise the caller must have `operator` or higher on
    /// every resource the filter names explicitly (a specific
    /// `resource_type` + `resource_id`). A filter with no resource named is
    /// admin-only.
    pub fn query(
        &self,
        authz: &AuthzEngine,
        reader: &Identity,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditRecord>> {
        let is_admin = reader.portal_role >= PortalRole::Admin;
        if !is_admin {
            match (filter.resource_type.as_deref(), filter.resource_id) {
                (Some(resource_type), Some(resource_id)) => {
                    let scope = crate::authz::ResourceScope {
                        tenant_id: reader.tenant_id,
                        resource_id,
                        resource_scope_type: crate::store::model::ScopeType::Entity,
                        organization_chain: Vec::new(),
                    };
                    let role = authz.effective_role(reader, &scope)?;
                    if role < Role::Operator {
                        return Err(ElderError::Forbidden {
                            reason: "audit_read_requires_operator".to_string(),
                        });
                    }
                    let _ = resource_type;
                }
                _ => {
                    return Err(ElderError::Forbidden {
                        reason: "audit_read_requires_admin_or_resource_scope".to_string(),
                    });
                }
            }
        }

        let mut records = self
            .store
            .audit_records
            .list_by(|r| r.tenant_id == reader.tenant_id && filter.matches(r));
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(records)
    }

    /// Admin-only purge of records strictly older than `before`; logs its
    /// own meta-record so the purge itself is auditable (`spec.md` §4.8).
    pub fn purge_before(
        &self,
        purging_admin: &Identity,
        tenant_id: Id,
        before: DateTime<Utc>,
        correlation_id: uuid::Uuid,
    ) -> Result<usize> {
        if purging_admin.portal_role < PortalRole::Admin {
            return Err(ElderError::Forbidden {
                reason: "audit_purge_requires_admin".to_string(),
            });
        }
        let stale = self
            .store
            .audit_records
            .list_by(|r| r.tenant_id == tenant_id && r.timestamp < before);
        let purged_count = stale.len();
        for record in &stale {
            let _ = self.store.audit_records.delete(record.id);
        }
        self.append(
            Some(purging_admin.id),
            "audit.purge",
            "audit_log",
            0,
            tenant_id,
            None,
            Some(format!("{{\"purged\":{purged_count}}}")),
            AuditOutcome::Success,
            correlation_id,
            None,
        );
        Ok(purged_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::*;

    fn identity(id: Id, tenant_id: Id, portal_role: PortalRole) -> Identity {
        Identity {
            id,
            tenant_id,
            revision: 1,
            village_id: "00a1-0000-00000001".to_string(),
            username: "i".to_string(),
            email: "i@example.com".to_string(),
            identity_type: IdentityType::Human,
            auth_provider: "internal".to_string(),
            portal_role,
            is_active: true,
            mfa_enabled: false,
            credential_fingerprint: None,
        }
    }

    #[test]
    fn append_then_admin_query_round_trips() {
        let store = Store::new();
        let authz = AuthzEngine::new(&store);
        let audit = AuditLog::new(&store);
        let admin = identity(1, 1, PortalRole::Admin);

        audit.append(
            Some(1),
            "entity.create",
            "entity",
            42,
            1,
            None,
            Some("hash".to_string()),
            AuditOutcome::Success,
            uuid::Uuid::new_v4(),
            None,
        );

        let found = audit.query(&authz, &admin, &AuditFilter::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_id, 42);
    }

    #[test]
    fn non_admin_without_resource_scope_is_forbidden() {
        let store = Store::new();
        let authz = AuthzEngine::new(&store);
        let audit = AuditLog::new(&store);
        let viewer = identity(2, 1, PortalRole::Viewer);

        let err = audit.query(&authz, &viewer, &AuditFilter::default()).unwrap_err();
        assert_eq!(err.reason_code(), "forbidden");
    }

    #[test]
    fn purge_requires_admin_and_logs_meta_record() {
        let store = Store::new();
        let audit = AuditLog::new(&store);
        let admin = identity(1, 1, PortalRole::Admin);
        let viewer = identity(2, 1, PortalRole::Viewer);

        let err = audit
            .purge_before(&viewer, 1, Utc::now(), uuid::Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.reason_code(), "forbidden");

        audit.append(
            Some(1),
            "entity.create",
            "entity",
            1,
            1,
            None,
            None,
            AuditOutcome::Success,
            uuid::Uuid::new_v4(),
            None,
        );
        let purged = audit
            .purge_before(&admin, 1, Utc::now() + chrono::Duration::seconds(1), uuid::Uuid::new_v4())
            .unwrap();
        assert_eq!(purged, 1);
        // The purge itself appended a meta-record.
        assert_eq!(store.audit_records.len(), 1);
    }
}
