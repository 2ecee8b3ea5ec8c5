//! In-memory collaborators for unit and router tests.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        password::hash_password,
        repo::{CredentialStore, EmailTaken},
        repo_types::{NewUser, OneTimePassword, ProfileChanges, User},
    },
    config::{AppConfig, JwtConfig, MailConfig, StorageConfig},
    mail::{Mailer, OtpPurpose},
    media::services::UploadItem,
    notifications::{Notifier, PushMessage},
    state::AppState,
    storage::ObjectStore,
};

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    otps: Mutex<HashMap<String, OneTimePassword>>,
}

impl MemoryStore {
    pub fn insert_user(&self, user: User) -> User {
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    pub fn user(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    pub fn otp(&self, email: &str) -> Option<OneTimePassword> {
        self.otps.lock().unwrap().get(email).cloned()
    }

    pub fn otp_count(&self) -> usize {
        self.otps.lock().unwrap().len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.user(email))
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(EmailTaken(user.email).into());
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            username: user.username,
            gender: user.gender.into(),
            password_hash: user.password_hash,
            profile_pic: user.profile_pic,
            email_verified: user.email_verified,
            fcm_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(gender) = changes.gender {
            user.gender = gender.into();
        }
        if let Some(pic) = changes.profile_pic {
            user.profile_pic = pic;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(&id)
            .map(|u| u.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn set_fcm_token(&self, id: Uuid, token: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(&id)
            .map(|u| u.fcm_token = Some(token.to_string()))
            .is_some())
    }

    async fn find_otp(&self, email: &str) -> anyhow::Result<Option<OneTimePassword>> {
        Ok(self.otp(email))
    }

    async fn upsert_otp(
        &self,
        email: &str,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<OneTimePassword> {
        let record = OneTimePassword {
            email: email.to_string(),
            code,
            expires_at,
            verified: false,
        };
        self.otps
            .lock()
            .unwrap()
            .insert(email.to_string(), record.clone());
        Ok(record)
    }

    async fn refresh_otp(
        &self,
        email: &str,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<Option<OneTimePassword>> {
        let mut otps = self.otps.lock().unwrap();
        Ok(otps.get_mut(email).map(|r| {
            r.code = code;
            r.expires_at = expires_at;
            r.verified = false;
            r.clone()
        }))
    }

    async fn mark_otp_verified(&self, email: &str) -> anyhow::Result<()> {
        if let Some(r) = self.otps.lock().unwrap().get_mut(email) {
            r.verified = true;
        }
        Ok(())
    }

    async fn delete_otp(&self, email: &str) -> anyhow::Result<()> {
        self.otps.lock().unwrap().remove(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, u32, OtpPurpose)>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, u32, OtpPurpose)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code(&self, email: &str) -> Option<u32> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _, _)| to == email)
            .map(|(_, code, _)| *code)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: u32,
        purpose: OtpPurpose,
        _valid_minutes: i64,
    ) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("smtp connection refused");
        }
        self.sent.lock().unwrap().push((to.to_string(), code, purpose));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    rejected_type: Option<String>,
    failing: AtomicBool,
}

impl FakeStorage {
    /// Fails every put whose content type equals `content_type`.
    pub fn rejecting(content_type: &str) -> Self {
        Self {
            rejected_type: Some(content_type.to_string()),
            ..Default::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("storage unavailable");
        }
        if self.rejected_type.as_deref() == Some(content_type) {
            bail!("content type {content_type} rejected");
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(String, PushMessage)>>,
    subscriptions: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_to_topic(&self, topic: &str, msg: &PushMessage) -> anyhow::Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("fcm returned 503");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((topic.to_string(), msg.clone()));
        Ok(format!("projects/test/messages/{}", sent.len()))
    }

    async fn subscribe_to_topic(&self, device_token: &str, topic: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("iid returned 503");
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push((device_token.to_string(), topic.to_string()));
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "chitchat-test".into(),
            audience: "chitchat-app".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60,
        },
        otp_ttl_seconds: 120,
        storage: StorageConfig {
            endpoint: "http://localhost:9000".into(),
            bucket: "test".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            region: "us-east-1".into(),
            public_url: "https://cdn.test".into(),
        },
        mail: MailConfig {
            host: String::new(),
            port: 587,
            username: None,
            password: None,
            from: "ChitChat <no-reply@chitchat.io>".into(),
            starttls: true,
        },
        firebase_service_account: None,
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub storage: Arc<FakeStorage>,
    pub notifier: Arc<FakeNotifier>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let mailer = Arc::new(RecordingMailer::default());
    let storage = Arc::new(FakeStorage::default());
    let notifier = Arc::new(FakeNotifier::default());
    let state = AppState::from_parts(
        Arc::new(test_config()),
        store.clone(),
        storage.clone(),
        mailer.clone(),
        notifier.clone(),
    );
    Harness {
        state,
        store,
        mailer,
        storage,
        notifier,
    }
}

/// A verified user with `password` hashed the way registration stores it.
pub fn sample_user(email: &str, password: &str) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: "Sample".into(),
        username: email.split('@').next().unwrap_or("sample").to_string(),
        gender: 2,
        password_hash: hash_password(password).unwrap(),
        profile_pic: "https://cdn.test/profiles/sample.png".into(),
        email_verified: true,
        fcm_token: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn png() -> UploadItem {
    UploadItem {
        body: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        content_type: "image/png".into(),
        file_name: Some("me.png".into()),
    }
}
