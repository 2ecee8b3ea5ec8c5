use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, OneTimePassword, ProfileChanges, User};

/// `create_user` lost the race for an email another insert already took.
#[derive(Debug, thiserror::Error)]
#[error("email {0} is already registered")]
pub struct EmailTaken(pub String);

fn insert_user_error(e: sqlx::Error, email: &str) -> anyhow::Error {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            EmailTaken(email.to_string()).into()
        }
        other => anyhow::Error::new(other).context("insert user"),
    }
}

/// Persistence for user and OTP records, both keyed by case-folded email.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn create_user(&self, user: NewUser) -> anyhow::Result<User>;
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> anyhow::Result<Option<User>>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;
    async fn set_fcm_token(&self, id: Uuid, token: &str) -> anyhow::Result<bool>;

    async fn find_otp(&self, email: &str) -> anyhow::Result<Option<OneTimePassword>>;
    /// Creates or overwrites the record for `email`, clearing `verified`.
    async fn upsert_otp(
        &self,
        email: &str,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<OneTimePassword>;
    /// Replaces code and expiry of an existing record only.
    async fn refresh_otp(
        &self,
        email: &str,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<Option<OneTimePassword>>;
    async fn mark_otp_verified(&self, email: &str) -> anyhow::Result<()>;
    async fn delete_otp(&self, email: &str) -> anyhow::Result<()>;
}

const USER_COLUMNS: &str = "id, email, name, username, gender, password_hash, profile_pic, \
                            email_verified, fcm_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, username, gender, password_hash, profile_pic, email_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.username)
        .bind(i16::from(user.gender))
        .bind(&user.password_hash)
        .bind(&user.profile_pic)
        .bind(user.email_verified)
        .fetch_one(&self.db)
        .await
        .map_err(|e| insert_user_error(e, &user.email))?;
        Ok(created)
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> anyhow::Result<Option<User>> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name        = COALESCE($2, name),
                   username    = COALESCE($3, username),
                   gender      = COALESCE($4, gender),
                   profile_pic = COALESCE($5, profile_pic),
                   updated_at  = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.username)
        .bind(changes.gender.map(i16::from))
        .bind(changes.profile_pic)
        .fetch_optional(&self.db)
        .await
        .context("update profile")?;
        Ok(updated)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("update password")?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_fcm_token(&self, id: Uuid, token: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET fcm_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await
            .context("set fcm token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn find_otp(&self, email: &str) -> anyhow::Result<Option<OneTimePassword>> {
        let otp = sqlx::query_as::<_, OneTimePassword>(
            "SELECT email, code, expires_at, verified FROM otps WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find otp")?;
        Ok(otp)
    }

    async fn upsert_otp(
        &self,
        email: &str,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<OneTimePassword> {
        let otp = sqlx::query_as::<_, OneTimePassword>(
            r#"
            INSERT INTO otps (email, code, expires_at, verified)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (email) DO UPDATE
               SET code = EXCLUDED.code,
                   expires_at = EXCLUDED.expires_at,
                   verified = FALSE
            RETURNING email, code, expires_at, verified
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .context("upsert otp")?;
        Ok(otp)
    }

    async fn refresh_otp(
        &self,
        email: &str,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<Option<OneTimePassword>> {
        let otp = sqlx::query_as::<_, OneTimePassword>(
            r#"
            UPDATE otps
               SET code = $2, expires_at = $3, verified = FALSE
             WHERE email = $1
            RETURNING email, code, expires_at, verified
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .fetch_optional(&self.db)
        .await
        .context("refresh otp")?;
        Ok(otp)
    }

    async fn mark_otp_verified(&self, email: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE otps SET verified = TRUE WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await
            .context("mark otp verified")?;
        Ok(())
    }

    async fn delete_otp(&self, email: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM otps WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await
            .context("delete otp")?;
        Ok(())
    }
}
