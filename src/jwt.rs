//! JWT issuance and revocation
//!
//! Tokens are stateless until destroyed: validity is signature + expiry, and a
//! destroyed token is parked in the cache denylist for exactly its remaining
//! lifetime.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ns, Cacher};
use crate::config::JwtConfig;
use crate::entity::new_id;
use crate::error::{AppError, AppResult};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token id; keeps two tokens minted in the same second distinct
    pub jti: String,
}

/// Token returned to the client after login/refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_type: String,
    /// Unix timestamp
    pub expires_at: i64,
}

/// Issues, parses and revokes bearer tokens
pub struct JwtAuth {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    /// Current key first, then the pre-rotation key
    decoding_keys: Vec<DecodingKey>,
    ttl_secs: i64,
    store: Arc<dyn Cacher>,
}

impl JwtAuth {
    pub fn new(config: &JwtConfig, store: Arc<dyn Cacher>) -> AppResult<Self> {
        let algorithm = parse_algorithm(&config.signing_method)?;
        if config.signing_key.is_empty() {
            return Err(AppError::Internal("jwt signing key must not be empty".to_string()));
        }

        let mut decoding_keys = vec![DecodingKey::from_secret(config.signing_key.as_bytes())];
        if let Some(old) = config.old_signing_key.as_deref().filter(|k| !k.is_empty()) {
            decoding_keys.push(DecodingKey::from_secret(old.as_bytes()));
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.signing_key.as_bytes()),
            decoding_keys,
            ttl_secs: config.expired,
            store,
        })
    }

    /// Mint a signed token for `subject`
    pub fn generate_token(&self, subject: &str) -> AppResult<TokenInfo> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            nbf: now,
            exp: now + self.ttl_secs,
            jti: new_id(),
        };

        let access_token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))?;

        Ok(TokenInfo {
            access_token,
            token_type: "Bearer".to_string(),
            expires_at: claims.exp,
        })
    }

    /// Verify the token and return its subject; destroyed tokens are rejected
    pub async fn parse_subject(&self, token: &str) -> AppResult<String> {
        let claims = self.parse_claims(token)?;

        if self.store.exists(ns::JWT_REVOKED, token).await? {
            tracing::debug!("Rejected revoked token for subject {}", claims.sub);
            return Err(AppError::InvalidToken);
        }

        Ok(claims.sub)
    }

    /// Revoke a token until it would have expired on its own
    pub async fn destroy_token(&self, token: &str) -> AppResult<()> {
        let claims = self.parse_claims(token)?;

        match remaining_lifetime(claims.exp, Utc::now().timestamp()) {
            Some(ttl) => {
                self.store.set(ns::JWT_REVOKED, token, "1", Some(ttl)).await?;
                tracing::debug!("Revoked token for subject {} ({}s left)", claims.sub, ttl.as_secs());
            }
            None => tracing::debug!("Token for subject {} already expired", claims.sub),
        }

        Ok(())
    }

    /// Close the revocation store
    pub async fn release(&self) -> AppResult<()> {
        self.store.close().await
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);
        validation
    }

    fn parse_claims(&self, token: &str) -> AppResult<Claims> {
        let validation = self.validation();

        for key in &self.decoding_keys {
            match decode::<Claims>(token, key, &validation) {
                Ok(data) => return Ok(data.claims),
                // Only a signature mismatch is worth retrying with the old key
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
                Err(e) => {
                    tracing::debug!("Token rejected: {}", e);
                    return Err(AppError::InvalidToken);
                }
            }
        }

        Err(AppError::InvalidToken)
    }
}

fn parse_algorithm(method: &str) -> AppResult<Algorithm> {
    match method.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(AppError::Internal(format!("unsupported jwt signing method: {}", other))),
    }
}

/// Seconds left before `exp`, or `None` if the token is already dead
pub fn remaining_lifetime(exp: i64, now: i64) -> Option<Duration> {
    let left = exp - now;
    (left > 0).then(|| Duration::from_secs(left as u64))
}
