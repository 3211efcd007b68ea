use std::path::PathBuf;

use anyhow::Context;

/// SMTP settings for the outbound confirmation-code mail.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub secret_key: String,
    pub users_file: PathBuf,
    pub downloads_dir: PathBuf,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret_key = std::env::var("SECRET_KEY")
            .unwrap_or_else(|_| "uma-chave-secreta-muito-segura-mesmo".into());
        // Cookie signing derives its key from this value.
        anyhow::ensure!(
            secret_key.len() >= 32,
            "SECRET_KEY must be at least 32 bytes"
        );

        let mail = MailConfig {
            server: std::env::var("MAIL_SERVER").unwrap_or_else(|_| "smtp.gmail.com".into()),
            port: std::env::var("MAIL_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(465),
            username: std::env::var("MAIL_USERNAME").context("MAIL_USERNAME")?,
            password: std::env::var("MAIL_PASSWORD").context("MAIL_PASSWORD")?,
        };

        Ok(Self {
            secret_key,
            users_file: std::env::var("USERS_FILE")
                .unwrap_or_else(|_| "NuksEdition.json".into())
                .into(),
            downloads_dir: std::env::var("DOWNLOADS_DIR")
                .unwrap_or_else(|_| "protect".into())
                .into(),
            mail,
        })
    }
}
