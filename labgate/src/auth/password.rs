//! Password hashing, verification and strength rules.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::{config::PasswordConfig, errors::Error};

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Create Argon2 instance with these parameters.
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Hash a string using Argon2 (used for passwords and refresh tokens).
///
/// Uses the provided parameters or secure defaults if None.
pub fn hash_string_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(input.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash string: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Verify a string against a hash.
///
/// Note: Verification uses the parameters embedded in the hash itself.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    let argon2 = Argon2::default();
    Ok(argon2.verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Hash on a blocking thread so the async runtime keeps serving requests.
pub async fn hash_blocking(input: String, params: Argon2Params) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_string_with_params(&input, Some(params)))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn hashing task: {e}"),
        })?
}

/// Verify on a blocking thread so the async runtime keeps serving requests.
pub async fn verify_blocking(input: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || verify_string(&input, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn verification task: {e}"),
        })?
}

/// First rule `password` breaks, if any.
pub fn strength_problem(password: &str, config: &PasswordConfig) -> Option<String> {
    let length = password.chars().count();
    if length < config.min_length {
        return Some(format!("Password must be at least {} characters", config.min_length));
    }
    if length > config.max_length {
        return Some(format!("Password must be no more than {} characters", config.max_length));
    }
    if !password.chars().any(char::is_uppercase) {
        return Some("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        return Some("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain at least one number".to_string());
    }
    if password.chars().all(char::is_alphanumeric) {
        return Some("Password must contain at least one special character".to_string());
    }
    None
}
