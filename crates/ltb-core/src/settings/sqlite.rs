use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{domain::UserId, errors::Error, Result};

use super::{SettingKey, SettingsStore, UserSettings};

const INIT_SQL: &str = "
CREATE TABLE IF NOT EXISTS user_config (
    user_id INTEGER PRIMARY KEY,
    api_key TEXT,
    base_url TEXT,
    model_name TEXT,
    system_prompt TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

/// SQLite-backed settings store. One connection, serialized behind a mutex and
/// driven from the blocking pool.
#[derive(Clone)]
pub struct SqliteSettingsStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSettingsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(INIT_SQL)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    async fn with_db<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| Error::Storage("settings db lock poisoned".to_string()))?;
            op(&conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("settings db task failed: {e}")))?
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get_user_settings(&self, user_id: UserId) -> Result<UserSettings> {
        let row = self
            .with_db(move |db| {
                db.query_row(
                    "SELECT api_key, base_url, model_name, system_prompt
                     FROM user_config WHERE user_id = ?1",
                    params![user_id.0],
                    |row| {
                        Ok(UserSettings {
                            api_key: row.get(0)?,
                            base_url: row.get(1)?,
                            model_name: row.get(2)?,
                            system_prompt: row.get(3)?,
                        })
                    },
                )
                .optional()
                .map_err(Error::from)
            })
            .await?;

        if row.is_none() {
            tracing::debug!(user_id = user_id.0, "no stored settings");
        }
        Ok(row.unwrap_or_default().normalized())
    }

    async fn set_user_setting(&self, user_id: UserId, key: SettingKey, value: &str) -> Result<()> {
        // `key` is a closed enum, so interpolating its column name is safe.
        let column = key.as_str();
        let sql = format!(
            "INSERT INTO user_config (user_id, {column}) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET {column} = excluded.{column}"
        );
        let value = value.to_string();

        self.with_db(move |db| {
            db.execute(&sql, params![user_id.0, value])?;
            Ok(())
        })
        .await?;

        tracing::info!(user_id = user_id.0, key = column, "user setting saved");
        Ok(())
    }
}
