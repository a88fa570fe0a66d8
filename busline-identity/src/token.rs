use std::collections::BTreeSet;

use busline_core::{AccessToken, CoreError, CoreResult, Role};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: i64,
    pub roles: Vec<String>,
    pub iat: usize,
    pub exp: usize,
}

/// Bearer-token codec used by login and by the auth middleware.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, subject: &str, entity_id: i64, roles: &BTreeSet<Role>) -> CoreResult<String>;

    fn decode(&self, token: &str) -> CoreResult<AccessToken>;
}

pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl JwtCodec {
    pub fn new(secret: &str, expiry_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry: Duration::seconds(expiry_secs as i64),
        }
    }

    fn sign(&self, claims: &Claims) -> CoreResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| CoreError::Storage(format!("token encoding failed: {}", e)))
    }
}

impl TokenCodec for JwtCodec {
    fn encode(&self, subject: &str, entity_id: i64, roles: &BTreeSet<Role>) -> CoreResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            user_id: entity_id,
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            iat: now.timestamp() as usize,
            exp: (now + self.expiry).timestamp() as usize,
        };
        self.sign(&claims)
    }

    fn decode(&self, token: &str) -> CoreResult<AccessToken> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| CoreError::InvalidToken(e.to_string()))?;
        let claims = data.claims;
        let roles = claims
            .roles
            .iter()
            .map(|r| Role::parse(r).ok_or_else(|| CoreError::InvalidToken(format!("unknown role {}", r))))
            .collect::<CoreResult<BTreeSet<_>>>()?;
        Ok(AccessToken {
            subject: claims.sub,
            entity_id: claims.user_id,
            roles,
        })
    }
}

/// Parse an `Authorization` header value of the form `Bearer <token>`.
pub fn decode_bearer(codec: &dyn TokenCodec, header: &str) -> CoreResult<AccessToken> {
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(CoreError::MalformedHeader)?;
    codec.decode(token)
}
