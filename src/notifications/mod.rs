pub mod fcm;
mod handlers;

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::Router;
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

/// Topic every registered device is subscribed to.
pub const BROADCAST_TOPIC: &str = "all-devices";

/// FCM registration tokens are opaque; anything outside these bounds is not one.
pub const DEVICE_TOKEN_MIN_LEN: usize = 10;
pub const DEVICE_TOKEN_MAX_LEN: usize = 1000;

pub fn is_plausible_device_token(token: &str) -> bool {
    (DEVICE_TOKEN_MIN_LEN..=DEVICE_TOKEN_MAX_LEN).contains(&token.len())
        && !token.chars().any(char::is_whitespace)
}

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the provider's message id.
    async fn send_to_topic(&self, topic: &str, msg: &PushMessage) -> anyhow::Result<String>;
    async fn subscribe_to_topic(&self, device_token: &str, topic: &str) -> anyhow::Result<()>;
}

/// Used when no Firebase service account is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_to_topic(&self, topic: &str, msg: &PushMessage) -> anyhow::Result<String> {
        info!(%topic, title = %msg.title, "push disabled; notification dropped");
        Ok(String::new())
    }

    async fn subscribe_to_topic(&self, _device_token: &str, topic: &str) -> anyhow::Result<()> {
        info!(%topic, "push disabled; subscription skipped");
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    handlers::notification_routes()
}
