//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs whose `sub` is the user's Telegram id. Passwords are
//! stored as argon2 PHC strings.

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::error::HabitError;
use crate::models::User;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expire_minutes: i64,
}

impl TokenAuthority {
    pub fn new(secret: &str, expire_minutes: i64) -> Self {
        TokenAuthority {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expire_minutes,
        }
    }

    pub fn issue(&self, external_id: &str) -> Result<String, ApiError> {
        let expires = Utc::now() + Duration::minutes(self.expire_minutes);
        let claims = Claims {
            sub: external_id.to_string(),
            exp: expires.timestamp().max(0) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }

    /// Subject of a valid, unexpired token
    pub fn verify(&self, token: &str) -> Option<String> {
        match decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                debug!("Rejected bearer token: {e}");
                None
            }
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    PasswordHash::new(hashed)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Active user resolved from the bearer token
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let external_id = state.tokens.verify(token).ok_or(ApiError::Unauthorized)?;

        let user = match state.service.get_user_by_external_id(&external_id).await {
            Ok(user) => user,
            Err(HabitError::NotFound { .. }) => return Err(ApiError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        if !user.is_active {
            return Err(ApiError::BadRequest("Inactive user".to_string()));
        }
        Ok(CurrentUser(user))
    }
}
