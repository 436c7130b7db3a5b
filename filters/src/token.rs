use chrono::{DateTime, Duration, Utc};
use db::models::{Role, User};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// What a token says about its bearer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: u32,
    pub role: Role,
    pub email: String,
    /// Expiry, as a unix timestamp
    pub exp: i64,
}

#[derive(Debug, PartialEq)]
pub enum TokenError {
    Malformed,
    BadSignature,
    Expired,
}

/// Issues and checks bearer tokens.
///
/// A token is `hex(claims as JSON) "." hex(HMAC-SHA256(claims))`.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Arc<Vec<u8>>,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        Self {
            secret: Arc::new(secret.as_bytes().to_vec()),
            lifetime,
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }

    /// Signs a token for `user`, valid from `now` for the signer's lifetime
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Option<String> {
        let claims = Claims {
            sub: user.id,
            role: user.role,
            email: user.email.clone(),
            exp: (now + self.lifetime).timestamp(),
        };

        let payload = serde_json::to_vec(&claims).ok()?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Some(format!("{}.{}", hex::encode(payload), hex::encode(signature)))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = hex::decode(payload).map_err(|_| TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac().ok_or(TokenError::BadSignature)?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
