//! Argon2 credential hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use busline_core::{CoreError, CoreResult};

pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plain: &str) -> CoreResult<String>;

    fn verify(&self, plain: &str, digest: &str) -> bool;
}

#[derive(Default)]
pub struct Argon2Hasher {
    argon: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> CoreResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CoreError::Storage(format!("password hashing failed: {}", e)))
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        // An unparseable digest never matches.
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("stored credential is not a valid hash: {}", e);
                false
            }
        }
    }
}
