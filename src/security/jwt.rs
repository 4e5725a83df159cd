//! Short-lived signed tokens scoped to a single file id or path

use crate::common::{timestamp_now, Error, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Token lifetime in seconds
pub const TOKEN_TTL_SECS: u64 = 10;

/// A compact HS256 JWT; empty when signing is disabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedJwt(pub String);

impl EncodedJwt {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EncodedJwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceClaims {
    /// Resource the token grants access to
    sub: String,
    /// Expiration time (Unix timestamp)
    exp: u64,
}

/// Issues tokens with the server's shared secret
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Token for `resource_id`, valid for [`TOKEN_TTL_SECS`] from now
    pub fn issue(&self, resource_id: &str) -> Result<EncodedJwt> {
        self.issue_at(resource_id, timestamp_now())
    }

    /// Token for `resource_id` as if issued at `now`
    pub fn issue_at(&self, resource_id: &str, now: u64) -> Result<EncodedJwt> {
        if self.secret.is_empty() {
            return Ok(EncodedJwt::default());
        }
        let claims = ResourceClaims {
            sub: resource_id.to_string(),
            exp: now + TOKEN_TTL_SECS,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map(EncodedJwt)
        .map_err(|e| Error::Other(format!("JWT signing failed: {}", e)))
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("enabled", &!self.secret.is_empty())
            .finish()
    }
}

/// Check that `token` was signed with `secret` for `resource_id` and has not
/// expired
pub fn verify_token(secret: &str, token: &str, resource_id: &str) -> Result<()> {
    verify_token_at(secret, token, resource_id, timestamp_now())
}

/// [`verify_token`] against an explicit clock
pub fn verify_token_at(secret: &str, token: &str, resource_id: &str, now: u64) -> Result<()> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;

    let data = decode::<ResourceClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| Error::Unauthorized(format!("invalid token: {}", e)))?;

    if now >= data.claims.exp {
        return Err(Error::Unauthorized("token expired".into()));
    }
    if data.claims.sub != resource_id {
        return Err(Error::Unauthorized(format!(
            "token is for {}, not {}",
            data.claims.sub, resource_id
        )));
    }
    Ok(())
}
