//! Firebase Cloud Messaging over the HTTP v1 API.
//!
//! Authenticates with a service-account key: an RS256-signed assertion is
//! exchanged for an OAuth2 access token, cached until shortly before expiry.
use anyhow::{bail, Context};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Notifier, PushMessage};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const IID_BATCH_ADD: &str = "https://iid.googleapis.com/iid/v1:batchAdd";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("parse FIREBASE_SERVICE_ACCOUNT")
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at > now + 60
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchAddResponse {
    #[serde(default)]
    results: Vec<BatchAddResult>,
}

#[derive(Debug, Deserialize)]
struct BatchAddResult {
    error: Option<String>,
}

pub struct FcmNotifier {
    key: ServiceAccountKey,
    encoding: EncodingKey,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl FcmNotifier {
    pub fn new(key: ServiceAccountKey) -> anyhow::Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("parse service account private key")?;
        Ok(Self {
            key,
            encoding,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut cached = self.token.lock().await;
        if let Some(tok) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(tok.access_token.clone());
        }

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: FCM_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)
            .context("sign oauth assertion")?;

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("oauth token request")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("oauth token request failed: {status} {body}");
        }
        let token: TokenResponse = resp.json().await.context("parse oauth token response")?;
        debug!(expires_in = token.expires_in, "fcm access token refreshed");

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }
}

pub fn topic_message(topic: &str, msg: &PushMessage) -> serde_json::Value {
    json!({
        "message": {
            "topic": topic,
            "notification": {
                "title": msg.title,
                "body": msg.body,
            },
            "data": msg.data,
        }
    })
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send_to_topic(&self, topic: &str, msg: &PushMessage) -> anyhow::Result<String> {
        let token = self.access_token().await?;
        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.key.project_id
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&topic_message(topic, msg))
            .send()
            .await
            .context("fcm send request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("fcm api error: {status} {body}");
        }
        let sent: SendResponse = resp.json().await.context("parse fcm response")?;
        let id = sent.name.unwrap_or_default();
        info!(%topic, message_id = %id, "topic notification sent");
        Ok(id)
    }

    async fn subscribe_to_topic(&self, device_token: &str, topic: &str) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(IID_BATCH_ADD)
            .bearer_auth(token)
            .header("access_token_auth", "true")
            .json(&json!({
                "to": format!("/topics/{topic}"),
                "registration_tokens": [device_token],
            }))
            .send()
            .await
            .context("iid batchAdd request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("iid batchAdd failed: {status} {body}");
        }
        let parsed: BatchAddResponse = resp.json().await.context("parse batchAdd response")?;
        if let Some(err) = parsed.results.into_iter().find_map(|r| r.error) {
            bail!("device token rejected: {err}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn service_account_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(
            r#"{"project_id":"chitchat","private_key":"pem","client_email":"svc@chitchat.iam.gserviceaccount.com"}"#,
        )
        .unwrap();
        assert_eq!(key.project_id, "chitchat");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(ServiceAccountKey::from_json("{}").is_err());
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        let key = ServiceAccountKey {
            project_id: "p".into(),
            private_key: "not a pem".into(),
            client_email: "svc@p.iam.gserviceaccount.com".into(),
            token_uri: DEFAULT_TOKEN_URI.into(),
        };
        assert!(FcmNotifier::new(key).is_err());
    }

    #[test]
    fn cached_token_expires_early() {
        let tok = CachedToken {
            access_token: "t".into(),
            expires_at: 1_000,
        };
        assert!(tok.is_fresh(900));
        assert!(!tok.is_fresh(950));
    }

    #[test]
    fn topic_message_shape() {
        let mut data = BTreeMap::new();
        data.insert("extraInfo".to_string(), "x".to_string());
        let msg = PushMessage {
            title: "T".into(),
            body: "B".into(),
            data,
        };
        let v = topic_message("all-devices", &msg);
        assert_eq!(v["message"]["topic"], "all-devices");
        assert_eq!(v["message"]["notification"]["title"], "T");
        assert_eq!(v["message"]["data"]["extraInfo"], "x");
    }
}
