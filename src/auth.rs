// src/auth.rs
use crate::error::{ApiError, AuthError};
use crate::models::{Email, User, UserId};
use crate::store::Store;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info};
use serde::{Deserialize, Serialize};

const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    uid: String,
    exp: usize,
}

/// Issues and verifies HS256 tokens carrying the user id.
pub struct TokenIssuer {
    secret: Vec<u8>,
    encoding: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        TokenIssuer {
            secret: secret.as_bytes().to_vec(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(TOKEN_TTL_DAYS),
        }
    }

    pub fn issue(&self, user: &UserId) -> Result<String, ApiError> {
        self.issue_at(user, Utc::now().timestamp())
    }

    /// Token whose expiry is `issued_at` (unix seconds) plus the TTL.
    pub fn issue_at(&self, user: &UserId, issued_at: i64) -> Result<String, ApiError> {
        let exp = issued_at + self.ttl.num_seconds();
        let claims = Claims {
            uid: user.to_string(),
            exp: exp.max(0) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token encoding failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid,
        })?;
        if data.claims.uid.is_empty() {
            return Err(AuthError::Invalid);
        }
        Ok(UserId::from(data.claims.uid))
    }

    /// Verifies the value of an `Authorization` header.
    pub fn authorize(&self, header: Option<&str>) -> Result<UserId, AuthError> {
        let token = header.and_then(bearer_token).ok_or(AuthError::MissingToken)?;
        self.verify(token).map_err(|e| {
            debug!("Rejected token: {}", e);
            e
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Creates the user and their empty watchlist. The two writes are separate;
/// a failure in between leaves a user without a watchlist row, which reads
/// treat as empty.
pub async fn register(store: &dyn Store, email: &str, password: &str) -> Result<UserId, ApiError> {
    let email = Email::normalize(email);
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidInput("email/password required"));
    }
    if store.find_user(&email).await?.is_some() {
        return Err(ApiError::Conflict("email exists"));
    }

    let user = User {
        id: UserId::generate(),
        email,
        password_hash: hash_password(password.to_string()).await?,
        created_at: Utc::now().timestamp(),
    };
    if !store.insert_user(&user).await? {
        return Err(ApiError::Conflict("email exists"));
    }
    store.create_watchlist(&user.id).await?;

    info!("Registered user {}.", user.id);
    Ok(user.id)
}

/// Checks credentials. Unknown email and wrong password fail the same way.
pub async fn login(store: &dyn Store, email: &str, password: &str) -> Result<UserId, ApiError> {
    let email = Email::normalize(email);
    let user = store
        .find_user(&email)
        .await?
        .ok_or(ApiError::Unauthorized("invalid credentials"))?;
    if !verify_password(password.to_string(), user.password_hash).await? {
        return Err(ApiError::Unauthorized("invalid credentials"));
    }
    Ok(user.id)
}
