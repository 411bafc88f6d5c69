//! Argon2id password hashing with a configurable work factor.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::{RngCore, rngs::OsRng};

use super::error::{Error, Result};

/// Verified against when an identifier is unknown, so that path costs the
/// same as a wrong password.
const DUMMY_PASSWORD: &str = "tessera-dummy-password";

#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
    dummy_hash: String,
}

impl PasswordHasher {
    /// `work_factor` is the Argon2 time cost; memory and parallelism stay at
    /// the library defaults.
    ///
    /// # Errors
    /// Returns [`Error::Hashing`] for an out-of-range work factor.
    pub fn new(work_factor: u32) -> Result<Self> {
        let params = Params::new(
            Params::DEFAULT_M_COST,
            work_factor,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|err| Error::Hashing(format!("invalid argon2 parameters: {err}")))?;
        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `plaintext` into a PHC string with a fresh random salt.
    ///
    /// # Errors
    /// Returns [`Error::Hashing`] if randomness is unavailable or hashing fails.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|err| Error::Hashing(format!("entropy source unavailable: {err}")))?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|err| Error::Hashing(format!("failed to encode salt: {err}")))?;
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| Error::Hashing(format!("failed to hash password: {err}")))?;
        Ok(hash.to_string())
    }

    /// A mismatch is `Ok(false)`. Parameters are read from the stored
    /// credential, so hashes made under an older work factor still verify.
    ///
    /// # Errors
    /// Returns [`Error::Hashing`] only when `credential` is not a valid PHC string.
    pub fn verify(&self, credential: &str, plaintext: &str) -> Result<bool> {
        let parsed = PasswordHash::new(credential)
            .map_err(|err| Error::Hashing(format!("invalid password hash: {err}")))?;
        Ok(self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burn one verification for a caller with no stored credential.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(&self.dummy_hash, plaintext);
    }
}
