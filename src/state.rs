use std::sync::Arc;

use tracing::warn;

use crate::auth::repo::{CredentialStore, PgCredentialStore};
use crate::config::AppConfig;
use crate::db;
use crate::mail::{Mailer, SmtpMailer};
use crate::notifications::{
    fcm::{FcmNotifier, ServiceAccountKey},
    NoopNotifier, Notifier,
};
use crate::storage::{ObjectStore, S3Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;
        let store = Arc::new(PgCredentialStore::new(pool)) as Arc<dyn CredentialStore>;

        let storage = Arc::new(S3Store::connect(&config.storage).await?) as Arc<dyn ObjectStore>;
        let mailer = Arc::new(SmtpMailer::new(&config.mail)?) as Arc<dyn Mailer>;

        let notifier: Arc<dyn Notifier> = match &config.firebase_service_account {
            Some(raw) => Arc::new(FcmNotifier::new(ServiceAccountKey::from_json(raw)?)?),
            None => {
                warn!("FIREBASE_SERVICE_ACCOUNT not set; push notifications disabled");
                Arc::new(NoopNotifier)
            }
        };

        Ok(Self::from_parts(config, store, storage, mailer, notifier))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        storage: Arc<dyn ObjectStore>,
        mailer: Arc<dyn Mailer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            mailer,
            notifier,
        }
    }
}
