#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::HashConfig;

const DECOY_PASSWORD: &str = "taskmate-decoy-password";

/// Argon2id hasher with a configurable work factor.
///
/// Hashes are PHC strings, so verification reads the parameters and salt
/// back out of the stored hash rather than from this struct.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    /// Hash of a throwaway secret under the same params. Checked in place of
    /// a real hash when a login names an unknown email.
    decoy: Arc<str>,
    #[cfg(test)]
    verifications: Arc<AtomicUsize>,
}

fn hash_with(params: &Params, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

impl Hasher {
    pub fn from_config(cfg: &HashConfig) -> anyhow::Result<Self> {
        let memory = cfg.memory_kib.unwrap_or(Params::DEFAULT_M_COST);
        let iterations = cfg.iterations.unwrap_or(Params::DEFAULT_T_COST);
        let params = Params::new(memory, iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let decoy = hash_with(&params, DECOY_PASSWORD)?;
        Ok(Self {
            params,
            decoy: decoy.into(),
            #[cfg(test)]
            verifications: Arc::default(),
        })
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        hash_with(&self.params, plain)
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        #[cfg(test)]
        self.verifications.fetch_add(1, Ordering::SeqCst);
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// A hash with the same cost as a real one, for checks that must not
    /// finish early.
    pub fn decoy_hash(&self) -> &str {
        &self.decoy
    }

    #[cfg(test)]
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}
