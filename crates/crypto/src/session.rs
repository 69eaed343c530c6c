//! MAC-signed session tokens for ledger accounts.
//!
//! A token is `base64url(claims_json) "." base64url(mac)` where `mac` is a
//! BLAKE3 keyed hash over the encoded claims. The key is derived from the
//! configured secret, so rotating the secret invalidates every token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

const KEY_CONTEXT: &str = "cvault 2025 session token mac v1";

/// Errors returned when verifying a session token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired at {expired_at}")]
    Expired { expired_at: u64 },
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account id.
    pub sub: u64,
    pub email: String,
    pub role: String,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionSigner {
    key: [u8; 32],
    ttl_secs: u64,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    /// Default token lifetime (8 hours).
    pub const DEFAULT_TTL_SECS: u64 = 8 * 3600;

    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a token for an account at time `now`.
    pub fn issue(&self, sub: u64, email: &str, role: &str, now: u64) -> String {
        let claims = SessionClaims {
            sub,
            email: email.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &SessionClaims) -> String {
        // Serialising a plain struct of strings and integers cannot fail.
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let body = URL_SAFE_NO_PAD.encode(json);
        let mac = blake3::keyed_hash(&self.key, body.as_bytes());
        format!("{}.{}", body, URL_SAFE_NO_PAD.encode(mac.as_bytes()))
    }

    /// Verify the MAC, then the expiry, and return the claims.
    pub fn verify(&self, token: &str, now: u64) -> Result<SessionClaims, TokenError> {
        let (body, mac_b64) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;

        let mac_bytes = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|_| TokenError::Malformed)?;
        let mac: [u8; 32] = mac_bytes.try_into().map_err(|_| TokenError::Malformed)?;

        // blake3::Hash equality is constant time.
        let expected = blake3::keyed_hash(&self.key, body.as_bytes());
        if expected != blake3::Hash::from(mac) {
            return Err(TokenError::BadSignature);
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if now >= claims.exp {
            return Err(TokenError::Expired {
                expired_at: claims.exp,
            });
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let signer = SessionSigner::new("secret", 3600);
        let token = signer.issue(7, "admin@unb.br", "admin", 1_000);
        let claims = signer.verify(&token, 1_500).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "admin@unb.br");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp, 4_600);
    }

    #[test]
    fn test_expired_token() {
        let signer = SessionSigner::new("secret", 10);
        let token = signer.issue(1, "a@b.c", "aluno", 100);
        assert_eq!(
            signer.verify(&token, 110),
            Err(TokenError::Expired { expired_at: 110 })
        );
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = SessionSigner::new("one", 60).issue(1, "a@b.c", "aluno", 0);
        let err = SessionSigner::new("two", 60).verify(&token, 1).unwrap_err();
        assert_eq!(err, TokenError::BadSignature);
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let signer = SessionSigner::new("secret", 60);
        let token = signer.issue(1, "a@b.c", "aluno", 0);
        let (_, mac) = token.split_once('.').unwrap();
        let forged = SessionClaims {
            sub: 1,
            email: "a@b.c".into(),
            role: "admin".into(),
            iat: 0,
            exp: 60,
        };
        let forged_body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{forged_body}.{mac}");
        assert_eq!(
            signer.verify(&forged_token, 1),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let signer = SessionSigner::new("secret", 60);
        assert_eq!(signer.verify("nodot", 0), Err(TokenError::Malformed));
        assert_eq!(signer.verify("a.!!!", 0), Err(TokenError::Malformed));
        assert_eq!(signer.verify("a.AAAA", 0), Err(TokenError::Malformed));
    }
}
