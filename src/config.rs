use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible bucket holding profile pictures and uploaded media.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL objects are served from (CDN or bucket website endpoint).
    pub public_url: String,
}

/// SMTP settings. An empty `host` puts the mailer in no-op mode.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub starttls: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub otp_ttl_seconds: i64,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    /// Raw Firebase service-account JSON; push is disabled when absent.
    pub firebase_service_account: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: env_or("JWT_ISSUER", "chitchat"),
            audience: env_or("JWT_AUDIENCE", "chitchat-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 30),
        };

        let storage = StorageConfig {
            endpoint: env_or("S3_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("S3_BUCKET", "chitchat"),
            access_key: env_or("S3_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("S3_SECRET_KEY", "minioadmin"),
            region: env_or("S3_REGION", "us-east-1"),
            public_url: std::env::var("S3_PUBLIC_URL").unwrap_or_else(|_| {
                format!(
                    "{}/{}",
                    env_or("S3_ENDPOINT", "http://localhost:9000"),
                    env_or("S3_BUCKET", "chitchat")
                )
            }),
        };

        let mail = MailConfig {
            host: env_or("SMTP_HOST", ""),
            port: env_parse("SMTP_PORT", 587),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from: env_or("SMTP_FROM", "ChitChat <no-reply@chitchat.local>"),
            starttls: env_parse("SMTP_STARTTLS", true),
        };

        Ok(Self {
            database_url,
            jwt,
            otp_ttl_seconds: env_parse("OTP_TTL_SECONDS", 120),
            storage,
            mail,
            firebase_service_account: std::env::var("FIREBASE_SERVICE_ACCOUNT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
