//! # tc-auth-simple
//!
//! Argon2-based implementation of `AdminAuth`.
//! The admin presents a bearer token which is verified against a stored
//! PHC-format hash (`$argon2id$v=19$...`).

use std::sync::Arc;

use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tc_core::traits::AdminAuth;
use tracing::warn;

pub struct Argon2AdminAuth {
    password_hash: Arc<SecretString>,
}

impl Argon2AdminAuth {
    /// Fails if `password_hash` is not a parseable PHC string.
    pub fn new(password_hash: SecretString) -> anyhow::Result<Self> {
        PasswordHash::new(password_hash.expose_secret())
            .map_err(|e| anyhow!("invalid admin password hash: {e}"))?;
        Ok(Self {
            password_hash: Arc::new(password_hash),
        })
    }
}

fn verify(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[async_trait]
impl AdminAuth for Argon2AdminAuth {
    async fn authorize(&self, token: Option<&str>) -> bool {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return false;
        };

        // Verification is CPU-bound; run it on the blocking pool.
        let token = token.to_owned();
        let hash = Arc::clone(&self.password_hash);
        match tokio::task::spawn_blocking(move || verify(&token, hash.expose_secret())).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "admin password verification task failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};

    fn hash(password: &str) -> SecretString {
        let salt = SaltString::encode_b64(b"time-capsule-test-salt").unwrap();
        let phc = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string();
        SecretString::from(phc)
    }

    #[tokio::test]
    async fn accepts_matching_token() {
        let auth = Argon2AdminAuth::new(hash("open sesame")).unwrap();
        assert!(auth.authorize(Some("open sesame")).await);
    }

    #[tokio::test]
    async fn rejects_wrong_or_missing_token() {
        let auth = Argon2AdminAuth::new(hash("open sesame")).unwrap();
        assert!(!auth.authorize(Some("open says me")).await);
        assert!(!auth.authorize(Some("")).await);
        assert!(!auth.authorize(None).await);
    }

    #[test]
    fn rejects_malformed_hash() {
        let err = Argon2AdminAuth::new(SecretString::from(String::from("plaintext"))).err();
        assert!(err.is_some());
    }
}
