//! Bearer-token authentication for the REST/RPC surface (`spec.md` §6:
//! "bearer token in `Authorization`... opaque API key, signed session token
//! with short TTL and refresh counterpart"). Token issuance, refresh, and
//! the external identity-provider handshake (LDAP/Okta/SAML) are the auth
//! provider collaborator's job, out of scope for this core; what this core
//! owns is resolving an already-issued token to the [`Identity`] Pipeline
//! authorizes against. The reference resolver is an in-memory opaque-token
//! table (`dashmap`, mirroring every other in-process cache in this crate)
//! rather than a JWT/OAuth validator — the pack's crate set for this core
//! has no JWT dependency, so a real deployment would plug that in behind
//! the same `TokenStore` shape.

use axum::http::HeaderMap;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::common::Id;
use crate::error::{ElderError, Result};
use crate::store::model::Identity;
use crate::store::Store;

/// Hashes a presented token before it ever touches a map key, so a
/// dump of `TokenStore`'s internal state (a heap snapshot, a debug log)
/// never reveals a credential a caller could replay — only its digest.
/// This is the same "fingerprint, never the credential" discipline
/// `spec.md` §3 requires for `Identity::credential_fingerprint`.
fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

/// Public alias used by callers that provision an `Identity.credential_fingerprint`
/// (e.g. `bootstrap`) from an already-issued token; same digest `TokenStore`
/// uses internally, kept separate so `TokenStore`'s storage detail doesn't
/// leak into the data-model field's construction.
pub fn fingerprint_for_display(token: &str) -> String {
    fingerprint(token)
}

pub struct TokenStore {
    /// Keyed by `fingerprint(token)`, not the raw token.
    tokens: DashMap<String, Id>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    /// Registers `token` (the caller already minted it, e.g. a `uuid::Uuid`
    /// formatted as a string) against `identity_id`. Only the fingerprint
    /// is retained.
    pub fn issue(&self, token: impl AsRef<str>, identity_id: Id) {
        self.tokens.insert(fingerprint(token.as_ref()), identity_id);
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(&fingerprint(token));
    }

    fn identity_id_for(&self, token: &str) -> Option<Id> {
        self.tokens.get(&fingerprint(token)).map(|entry| *entry)
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ElderError::Unauthenticated)?;
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .filter(|token| !token.is_empty())
        .ok_or(ElderError::Unauthenticated)
}

/// Resolves the bearer token in `headers` to its [`Identity`]; `Unauthenticated`
/// if the header is missing/malformed or the token is unknown, `Forbidden`
/// if the identity has since been deactivated.
pub fn authenticate(store: &Store, tokens: &TokenStore, headers: &HeaderMap) -> Result<Identity> {
    let token = extract_bearer(headers)?;
    let identity_id = tokens.identity_id_for(token).ok_or(ElderError::Unauthenticated)?;
    let identity = store
        .identities
        .get(identity_id)
        .ok_or(ElderError::Unauthenticated)?;
    if !identity.is_active {
        return Err(ElderError::Forbidden {
            reason: "identity_inactive".to_string(),
        });
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_store_never_retains_the_raw_token() {
        let tokens = TokenStore::new();
        tokens.issue("s3cr3t-token", 42);
        assert!(tokens.identity_id_for("s3cr3t-token").is_some());
        assert!(!tokens.tokens.contains_key("s3cr3t-token"));
        assert!(tokens.tokens.contains_key(&fingerprint("s3cr3t-token")));
    }

    #[test]
    fn revoke_removes_the_fingerprint_not_a_stale_raw_entry() {
        let tokens = TokenStore::new();
        tokens.issue("one-time", 7);
        tokens.revoke("one-time");
        assert!(tokens.identity_id_for("one-time").is_none());
    }

    #[test]
    fn extract_bearer_rejects_missing_or_malformed_header() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_bearer(&headers).is_err());
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer tok123"));
        assert_eq!(extract_bearer(&headers).unwrap(), "tok123");
    }
}
