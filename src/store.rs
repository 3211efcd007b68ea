//! Flat-file user table: one JSON object mapping email to record.
//!
//! Every mutation loads the whole map, rewrites it and saves the whole map.
//! A single-writer mutex serializes mutations within this process; there is
//! no cross-process coordination, the last writer wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// One registered account, keyed by email in the store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    /// Account creation date, `DD/MM/YYYY`. The serialized name is fixed by
    /// the existing on-disk format.
    #[serde(rename = "data_criacao")]
    pub created_on: String,
}

#[derive(Clone)]
pub struct UserStore {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl UserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read the full map. A missing or unparseable file degrades to "no
    /// users" and never errors back to the caller.
    pub async fn load(&self) -> HashMap<String, UserRecord> {
        let bytes = match tokio::fs::read(self.path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "user file unparseable, treating as empty");
                HashMap::new()
            }
        }
    }

    async fn save(&self, users: &HashMap<String, UserRecord>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(users)?;
        tokio::fs::write(self.path.as_ref(), json)
            .await
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    pub async fn get(&self, email: &str) -> Option<UserRecord> {
        self.load().await.remove(email)
    }

    pub async fn contains(&self, email: &str) -> bool {
        self.load().await.contains_key(email)
    }

    pub async fn put(&self, email: &str, record: UserRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        users.insert(email.to_string(), record);
        self.save(&users).await
    }

    /// Apply `f` to the record under `email`; `Ok(false)` when absent.
    pub async fn update(
        &self,
        email: &str,
        f: impl FnOnce(&mut UserRecord),
    ) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        let Some(record) = users.get_mut(email) else {
            return Ok(false);
        };
        f(record);
        self.save(&users).await?;
        Ok(true)
    }

    pub async fn remove(&self, email: &str) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        if users.remove(email).is_none() {
            return Ok(false);
        }
        self.save(&users).await?;
        Ok(true)
    }

    /// Move the record from `old` to `new`; `Ok(false)` when `old` is absent.
    pub async fn rename(&self, old: &str, new: &str) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        let Some(record) = users.remove(old) else {
            return Ok(false);
        };
        users.insert(new.to_string(), record);
        self.save(&users).await?;
        Ok(true)
    }
}
