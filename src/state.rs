use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::config::AppConfig;
use crate::mailer::{Mailer, RecordingMailer, SmtpMailer};
use crate::session::SessionStore;
use crate::store::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub sessions: SessionStore,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
    cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let mailer = Arc::new(SmtpMailer::from_config(&config.mail)?) as Arc<dyn Mailer>;
        Ok(Self {
            users: UserStore::new(&config.users_file),
            sessions: SessionStore::new(),
            cookie_key: Key::derive_from(config.secret_key.as_bytes()),
            mailer,
            config,
        })
    }

    /// Test state: recording mailer, throwaway store file, fixed secret.
    pub fn fake() -> (Self, Arc<RecordingMailer>) {
        let mailer = Arc::new(RecordingMailer::default());
        (Self::fake_with(mailer.clone()), mailer)
    }

    pub fn fake_with(mailer: Arc<dyn Mailer>) -> Self {
        let scratch = std::env::temp_dir().join(format!("nuks-test-{}", uuid::Uuid::new_v4()));
        let config = Arc::new(AppConfig {
            secret_key: "x".repeat(64),
            users_file: scratch.join("users.json"),
            downloads_dir: scratch.join("protect"),
            mail: crate::config::MailConfig {
                server: "smtp.test".into(),
                port: 465,
                username: "noreply@test".into(),
                password: "secret".into(),
            },
        });
        std::fs::create_dir_all(&scratch).expect("scratch dir");
        Self {
            users: UserStore::new(&config.users_file),
            sessions: SessionStore::new(),
            cookie_key: Key::derive_from(config.secret_key.as_bytes()),
            mailer,
            config,
        }
    }
}
