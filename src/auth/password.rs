use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

// Run on the blocking pool; argon2 takes tens of milliseconds per call.

pub async fn hash_password_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task panicked")?
}

pub async fn verify_password_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_is_salted_phc() {
        let a = hash_password("Str0ng!Pass").unwrap();
        let b = hash_password("Str0ng!Pass").unwrap();
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
        assert!(verify_password("Str0ng!Pass", &a).unwrap());
        assert!(verify_password("Str0ng!Pass", &b).unwrap());
        assert!(!verify_password("str0ng!pass", &a).unwrap());
    }

    #[test]
    fn plaintext_in_store_is_an_error() {
        assert!(verify_password("Str0ng!Pass", "Str0ng!Pass").is_err());
    }

    #[tokio::test]
    async fn blocking_wrappers_agree() {
        let hash = hash_password_blocking("Abcdef1!".into()).await.unwrap();
        assert!(verify_password_blocking("Abcdef1!".into(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password_blocking("Abcdef1?".into(), hash)
            .await
            .unwrap());
    }
}
