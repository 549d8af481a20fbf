//! Request signing: short-lived bearer tokens and HMAC signatures

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::common::{Credentials, Error, Result};

/// Token lifetime in seconds
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Claims carried by the bearer token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Issuer (tenant)
    pub iss: String,
    /// Subject (API key)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique nonce
    pub jti: String,
}

/// Sign a fresh HS256 token valid for one hour
pub fn generate_jwt(credentials: &Credentials, now: DateTime<Utc>) -> Result<String> {
    let iat = now.timestamp();
    let nonce = Sha256::digest(Uuid::new_v4().as_bytes());

    let claims = Claims {
        iss: credentials.issuer.clone(),
        sub: credentials.api_key.clone(),
        iat,
        exp: iat + TOKEN_TTL_SECS,
        jti: hex::encode(nonce),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(credentials.secret_key.as_bytes()),
    )?;

    Ok(token)
}

/// `"{timestamp}.{hex(HMAC-SHA256(method\npath\ntimestamp\nbody))}"`
pub fn hmac_signature(
    secret: &str,
    method: &str,
    path: &str,
    body: &str,
    timestamp: i64,
) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(format!("{}\n{}\n{}\n{}", method, path, timestamp, body).as_bytes());
    Ok(format!("{}.{}", timestamp, hex::encode(mac.finalize().into_bytes())))
}
