use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::error;

use crate::{config::PasswordConfig, error::AppResult, users::model::PasswordReset};

/// How long a password-reset link stays redeemable.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

const RESET_TOKEN_BYTES: usize = 32;

/// Argon2id hashing with the process-wide cost parameters.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
    // verified against when there is no account, so both login paths cost the same
    dummy_hash: String,
}

impl Passwords {
    pub fn new(config: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let mut passwords = Self {
            params,
            dummy_hash: String::new(),
        };
        passwords.dummy_hash = passwords.hash_raw("not-a-real-password")?;
        Ok(passwords)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn hash_raw(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    pub fn hash(&self, plain: &str) -> AppResult<String> {
        Ok(self.hash_raw(plain)?)
    }

    /// Checks `plain` against a stored PHC string. The cost parameters come
    /// from the hash itself, so older hashes keep verifying after a cost change.
    pub fn verify(&self, plain: &str, hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burns one verification for a login with no matching account.
    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_hash);
    }
}

/// Hex SHA-256 of a raw reset token; the only form that is ever stored.
pub fn reset_token_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Fresh reset secret: returns the raw token for the link and what to store.
pub fn generate_reset_token(now: OffsetDateTime) -> (String, PasswordReset) {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let reset = PasswordReset {
        token_hash: reset_token_digest(&raw),
        expires_at: now + RESET_TOKEN_TTL,
    };
    (raw, reset)
}
