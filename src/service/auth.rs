//! Password hashing and API token issuing.

use crate::error::{AppError, NON_FIELD_ERRORS};
use crate::model::User;
use crate::payload::Credentials;
use crate::state::AppState;
use rand::RngCore;

pub const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// Raw key length in bytes; rendered as twice as many hex characters.
const TOKEN_BYTES: usize = 20;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Fresh random 40-character token key.
pub fn generate_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct TokenService;

impl TokenService {
    /// The user's token, created on first successful login.
    pub async fn obtain(state: &AppState, credentials: &Credentials) -> Result<String, AppError> {
        let user = state.users.find_user(&credentials.username).await?;
        let user = match user {
            Some(u) if verify_password(&credentials.password, &u.password_hash) => u,
            _ => {
                tracing::warn!(username = %credentials.username, "token request with bad credentials");
                return Err(AppError::invalid(NON_FIELD_ERRORS, BAD_CREDENTIALS));
            }
        };
        if let Some(key) = state.users.token_for_user(user.id).await? {
            return Ok(key);
        }
        let key = generate_key();
        state.users.insert_token(user.id, &key).await?;
        tracing::info!(user = %user.username, "token issued");
        Ok(key)
    }

    /// Create `username` unless it already exists; the existing password is left alone.
    pub async fn ensure_user(state: &AppState, username: &str, password: &str) -> Result<User, AppError> {
        if let Some(user) = state.users.find_user(username).await? {
            return Ok(user);
        }
        let user = state.users.create_user(username, &hash_password(password)?).await?;
        tracing::info!(user = %user.username, "user created");
        Ok(user)
    }

    /// User owning `key`, if any.
    pub async fn authenticate(state: &AppState, key: &str) -> Result<Option<User>, AppError> {
        state.users.user_for_token(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    #[test]
    fn hashes_verify_only_their_password() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not a hash"));
    }

    #[test]
    fn keys_are_forty_hex_characters() {
        let key = generate_key();
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_key());
    }

    #[tokio::test]
    async fn obtain_returns_the_same_token_each_time() {
        let state = AppState::memory();
        TokenService::ensure_user(&state, "admin", "pw").await.unwrap();
        let first = TokenService::obtain(&state, &credentials("admin", "pw")).await.unwrap();
        let second = TokenService::obtain(&state, &credentials("admin", "pw")).await.unwrap();
        assert_eq!(first, second);
        let user = TokenService::authenticate(&state, &first).await.unwrap().unwrap();
        assert_eq!(user.username, "admin");
    }

    #[tokio::test]
    async fn bad_credentials_are_a_validation_error() {
        let state = AppState::memory();
        TokenService::ensure_user(&state, "admin", "pw").await.unwrap();
        for attempt in [credentials("admin", "nope"), credentials("ghost", "pw")] {
            match TokenService::obtain(&state, &attempt).await.unwrap_err() {
                AppError::Validation(errors) => {
                    assert_eq!(errors.get(NON_FIELD_ERRORS), Some(&[BAD_CREDENTIALS.to_string()][..]));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let state = AppState::memory();
        let a = TokenService::ensure_user(&state, "admin", "pw").await.unwrap();
        let b = TokenService::ensure_user(&state, "admin", "other").await.unwrap();
        assert_eq!(a.id, b.id);
        assert!(verify_password("pw", &b.password_hash));
    }
}
