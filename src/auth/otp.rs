//! One-time password lifecycle: issue, resend, verify, consume.
//!
//! At most one record exists per email. A record is usable only while
//! `now < expires_at`; registration additionally requires `verified`.
use std::sync::Arc;

use axum::extract::FromRef;
use rand::Rng;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    auth::{repo::CredentialStore, repo_types::OneTimePassword},
    error::{AppError, AppResult},
    mail::{Mailer, OtpPurpose},
    state::AppState,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("No OTP was requested for this email")]
    Missing,
    #[error("OTP expired")]
    Expired,
    #[error("Invalid OTP")]
    Mismatch,
    #[error("Email is not verified, verify first")]
    NotVerified,
}

impl From<OtpError> for AppError {
    fn from(e: OtpError) -> Self {
        AppError::Validation(e.to_string())
    }
}

pub fn generate_code() -> u32 {
    rand::thread_rng().gen_range(100_000..=999_999)
}

impl OneTimePassword {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Expiry is checked first so a stale record never reveals code correctness.
    pub fn check_code(&self, code: u32, now: OffsetDateTime) -> Result<(), OtpError> {
        if self.is_expired_at(now) {
            return Err(OtpError::Expired);
        }
        if i64::from(self.code) != i64::from(code) {
            return Err(OtpError::Mismatch);
        }
        Ok(())
    }

    pub fn check_verified(&self, now: OffsetDateTime) -> Result<(), OtpError> {
        if !self.verified {
            return Err(OtpError::NotVerified);
        }
        if self.is_expired_at(now) {
            return Err(OtpError::Expired);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct OtpManager {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    ttl: Duration,
}

impl FromRef<AppState> for OtpManager {
    fn from_ref(state: &AppState) -> Self {
        OtpManager::new(
            state.store.clone(),
            state.mailer.clone(),
            state.config.otp_ttl_seconds,
        )
    }
}

impl OtpManager {
    pub fn new(store: Arc<dyn CredentialStore>, mailer: Arc<dyn Mailer>, ttl_seconds: i64) -> Self {
        Self {
            store,
            mailer,
            ttl: Duration::seconds(ttl_seconds.max(1)),
        }
    }

    fn valid_minutes(&self) -> i64 {
        (self.ttl.whole_seconds() / 60).max(1)
    }

    async fn deliver(&self, email: &str, code: u32, purpose: OtpPurpose) -> AppResult<()> {
        self.mailer
            .send_otp(email, code, purpose, self.valid_minutes())
            .await
            .map_err(|e| {
                error!(error = %e, %email, "otp email delivery failed");
                AppError::upstream(format!("Failed to send OTP: {e}"))
            })
    }

    /// Sign-up code. Fails when the email already belongs to an account.
    pub async fn issue(&self, email: &str) -> AppResult<()> {
        if self.store.find_user_by_email(email).await?.is_some() {
            warn!(%email, "otp requested for existing account");
            return Err(AppError::validation("User already exists"));
        }
        self.issue_for(email, OtpPurpose::EmailVerification).await
    }

    /// Password-reset code. Fails when no account exists for the email.
    pub async fn issue_reset(&self, email: &str) -> AppResult<()> {
        if self.store.find_user_by_email(email).await?.is_none() {
            warn!(%email, "password reset for unknown account");
            return Err(AppError::not_found("User not found"));
        }
        self.issue_for(email, OtpPurpose::PasswordReset).await
    }

    async fn issue_for(&self, email: &str, purpose: OtpPurpose) -> AppResult<()> {
        let code = generate_code();
        let expires_at = OffsetDateTime::now_utc() + self.ttl;
        self.deliver(email, code, purpose).await?;
        self.store.upsert_otp(email, code as i32, expires_at).await?;
        info!(%email, ?purpose, "otp issued");
        Ok(())
    }

    /// New code and expiry for an existing record; verification starts over.
    /// Sign-up codes only exist for unknown emails and reset codes only for
    /// accounts, so the account decides which template goes out.
    pub async fn resend(&self, email: &str) -> AppResult<()> {
        if self.store.find_otp(email).await?.is_none() {
            return Err(AppError::validation("User not found"));
        }
        let purpose = if self.store.find_user_by_email(email).await?.is_some() {
            OtpPurpose::PasswordReset
        } else {
            OtpPurpose::EmailVerification
        };
        let code = generate_code();
        let expires_at = OffsetDateTime::now_utc() + self.ttl;
        self.deliver(email, code, purpose).await?;
        self.store
            .refresh_otp(email, code as i32, expires_at)
            .await?
            .ok_or_else(|| AppError::validation("User not found"))?;
        info!(%email, ?purpose, "otp resent");
        Ok(())
    }

    pub async fn verify(&self, email: &str, code: u32) -> AppResult<()> {
        let record = self.require_code(email, code).await?;
        self.store.mark_otp_verified(&record.email).await?;
        info!(%email, "otp verified");
        Ok(())
    }

    /// Record must exist, be verified and be unexpired.
    pub async fn require_verified(&self, email: &str) -> AppResult<OneTimePassword> {
        let record = self.store.find_otp(email).await?.ok_or(OtpError::NotVerified)?;
        record.check_verified(OffsetDateTime::now_utc())?;
        Ok(record)
    }

    /// Record must exist, be unexpired and carry `code`.
    pub async fn require_code(&self, email: &str, code: u32) -> AppResult<OneTimePassword> {
        let record = self.store.find_otp(email).await?.ok_or(OtpError::Missing)?;
        if let Err(e) = record.check_code(code, OffsetDateTime::now_utc()) {
            warn!(%email, reason = %e, "otp rejected");
            return Err(e.into());
        }
        Ok(record)
    }

    pub async fn consume(&self, email: &str) -> AppResult<()> {
        self.store.delete_otp(email).await?;
        Ok(())
    }
}
