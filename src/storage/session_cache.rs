use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::common::ChatResult;

/// Well-known cache keys
pub mod keys {
    pub const PROFILE: &str = "profile";
    pub const AVATAR: &str = "avatar";
    pub const ACTIVE_PROJECTS: &str = "active_projects";
    pub const LAST_CHANNEL: &str = "last_channel";
}

/// Notification delivered to subscribers of a key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheChange {
    pub user_id: String,
    pub key: String,
    /// `None` when the entry was removed.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&CacheChange) + Send>;

/// Client-local cache scoped by authenticated user, persisted in SQLite,
/// with in-process change notifications per key.
pub struct SessionCache {
    conn: Connection,
    subscribers: HashMap<String, Vec<(SubscriptionId, Callback)>>,
    next_subscription: u64,
}

impl SessionCache {
    pub fn open<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> ChatResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ChatResult<Self> {
        let cache = Self {
            conn,
            subscribers: HashMap::new(),
            next_subscription: 0,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> ChatResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS session_cache (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, key)
            )",
            [],
        )?;
        Ok(())
    }

    // ========== Pub/sub ==========

    pub fn subscribe<F>(&mut self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheChange) + Send + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers
            .entry(key.to_string())
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut found = false;
        for list in self.subscribers.values_mut() {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            found |= list.len() != before;
        }
        self.subscribers.retain(|_, list| !list.is_empty());
        found
    }

    fn notify(&self, change: CacheChange) {
        if let Some(list) = self.subscribers.get(&change.key) {
            for (_, callback) in list {
                callback(&change);
            }
        }
    }

    // ========== Entries ==========

    pub fn put<T: Serialize>(&self, user_id: &str, key: &str, value: &T) -> ChatResult<()> {
        let value = serde_json::to_value(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO session_cache (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, key, value.to_string(), Utc::now().timestamp()],
        )?;
        self.notify(CacheChange {
            user_id: user_id.to_string(),
            key: key.to_string(),
            value: Some(value),
        });
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, user_id: &str, key: &str) -> ChatResult<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM session_cache WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, user_id: &str, key: &str) -> ChatResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM session_cache WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
        )?;
        if removed > 0 {
            self.notify(CacheChange {
                user_id: user_id.to_string(),
                key: key.to_string(),
                value: None,
            });
        }
        Ok(removed > 0)
    }

    pub fn keys(&self, user_id: &str) -> ChatResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM session_cache WHERE user_id = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Drops everything cached for `user_id` (session expiry / sign-out).
    pub fn clear_user(&self, user_id: &str) -> ChatResult<usize> {
        let keys = self.keys(user_id)?;
        self.conn.execute(
            "DELETE FROM session_cache WHERE user_id = ?1",
            params![user_id],
        )?;
        for key in &keys {
            self.notify(CacheChange {
                user_id: user_id.to_string(),
                key: key.clone(),
                value: None,
            });
        }
        Ok(keys.len())
    }
}
