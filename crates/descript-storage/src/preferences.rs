//! Preferences with default values and change observers

use chrono::Utc;
use parking_lot::RwLock;
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::Database;
use crate::error::StorageError;
use crate::Result;

/// Handle returned by [`Preferences::add_observer`]
pub type ObserverId = Uuid;

type Observer = Arc<dyn Fn(&str) + Send + Sync>;

pub struct Preferences {
    db: Database,
    /// Observers keyed by preference name
    observers: Arc<RwLock<HashMap<String, Vec<(ObserverId, Observer)>>>>,
}

impl Preferences {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            observers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Set the default value. The user value, if any, keeps precedence.
    pub fn set_default(&self, name: &str, value: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO preferences (name, default_value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    default_value = excluded.default_value,
                    updated_at = excluded.updated_at",
                rusqlite::params![name, value, updated_at],
            )?;
            Ok(())
        })
    }

    /// Current value: user value if set, otherwise the default
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        self.db.with_connection(|conn| {
            let value: Option<Option<String>> = conn
                .query_row(
                    "SELECT COALESCE(user_value, default_value) FROM preferences WHERE name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.flatten())
        })
    }

    pub fn has_user_value(&self, name: &str) -> Result<bool> {
        self.db.with_connection(|conn| {
            let value: Option<Option<String>> = conn
                .query_row(
                    "SELECT user_value FROM preferences WHERE name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(matches!(value, Some(Some(_))))
        })
    }

    /// Set the user value and notify observers of `name`
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        self.db.transaction(|conn| {
            conn.execute(
                "INSERT INTO preferences (name, user_value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    user_value = excluded.user_value,
                    updated_at = excluded.updated_at",
                rusqlite::params![name, value, updated_at],
            )?;
            Ok(())
        })?;

        tracing::debug!(name = %name, "Preference changed");
        self.notify(name);

        Ok(())
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name)? {
            None => Ok(None),
            Some(value) => match value.as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(StorageError::TypeMismatch {
                    name: name.to_string(),
                    value,
                }),
            },
        }
    }

    pub fn set_bool(&self, name: &str, value: bool) -> Result<()> {
        self.set(name, if value { "true" } else { "false" })
    }

    /// Drop the user value so the preference reads as its default again
    pub fn clear_user_value(&self, name: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        let changed = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE preferences SET user_value = NULL, updated_at = ?2
                 WHERE name = ?1 AND user_value IS NOT NULL",
                rusqlite::params![name, updated_at],
            )?)
        })?;

        if changed > 0 {
            self.notify(name);
        }

        Ok(())
    }

    /// Call `observer` with the preference name after each change to it
    pub fn add_observer<F>(&self, name: &str, observer: F) -> ObserverId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.observers
            .write()
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(observer)));
        id
    }

    pub fn remove_observer(&self, name: &str, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let Some(list) = observers.get_mut(name) else {
            return false;
        };

        let before = list.len();
        list.retain(|(observer_id, _)| *observer_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            observers.remove(name);
        }

        removed
    }

    fn notify(&self, name: &str) {
        // Observers may read or write preferences, so call them unlocked
        let observers: Vec<Observer> = self
            .observers
            .read()
            .get(name)
            .map(|list| list.iter().map(|(_, o)| Arc::clone(o)).collect())
            .unwrap_or_default();

        for observer in observers {
            observer(name);
        }
    }
}

impl Clone for Preferences {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            observers: Arc::clone(&self.observers),
        }
    }
}
