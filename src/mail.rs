//! Outbound OTP email over SMTP.
use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{info, warn};

use crate::config::MailConfig;

/// Why a code is being mailed; selects subject and wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    EmailVerification,
    PasswordReset,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(
        &self,
        to: &str,
        code: u32,
        purpose: OtpPurpose,
        valid_minutes: i64,
    ) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let from = cfg
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid SMTP_FROM address {:?}", cfg.from))?;

        let transport = if cfg.host.trim().is_empty() {
            warn!("SMTP host not configured; OTP emails will only be logged");
            None
        } else {
            let builder = if cfg.starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            }
            .context("configure SMTP transport")?
            .port(cfg.port);

            let builder = match (&cfg.username, &cfg.password) {
                (Some(user), Some(pass)) => {
                    builder.credentials(Credentials::new(user.clone(), pass.clone()))
                }
                _ => builder,
            };
            Some(builder.build())
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: u32,
        purpose: OtpPurpose,
        valid_minutes: i64,
    ) -> anyhow::Result<()> {
        let (subject, html) = render_otp_email(code, purpose, valid_minutes);

        let Some(transport) = &self.transport else {
            info!(recipient = %to, subject, "mailer in no-op mode; skipping send");
            return Ok(());
        };

        let to_box = to
            .parse::<Mailbox>()
            .with_context(|| format!("invalid recipient {to:?}"))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to_box)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html)
            .context("build OTP email")?;

        transport.send(message).await.context("smtp send")?;
        info!(recipient = %to, subject, "otp email sent");
        Ok(())
    }
}

pub fn render_otp_email(code: u32, purpose: OtpPurpose, valid_minutes: i64) -> (&'static str, String) {
    match purpose {
        OtpPurpose::EmailVerification => (
            "Email Account Verification",
            format!(
                "<p>Welcome to ChitChat!<br/>Your OTP for email verification is: \
                 <strong>{code}</strong>. It is valid for {valid_minutes} minutes.</p>"
            ),
        ),
        OtpPurpose::PasswordReset => (
            "Password Reset Request",
            format!(
                "<p>We received a request to reset your ChitChat password.<br/>\
                 Your OTP is: <strong>{code}</strong>. It is valid for {valid_minutes} minutes.</p>\
                 <p>If you did not request this, you can ignore this email.</p>"
            ),
        ),
    }
}
