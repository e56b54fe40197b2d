//! Client-resident key-value store and its typed accessors.
//!
//! # Responsibility
//! - Provide string-keyed durable storage independent of network state.
//! - Encode/decode the well-known entries (tasks, xp, persona, style, quiz).
//!
//! # Invariants
//! - Every `set` is durable when it returns.
//! - A malformed stored value is reported as `StoreError::InvalidData`; it is
//!   never silently replaced by a default.

use crate::db::DbError;
use crate::model::persona::{Persona, StylePreference};
use crate::model::task::Task;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// JSON snapshot of the pending task sequence.
pub const KEY_TASKS: &str = "tasks_v1";
/// Anonymous cumulative XP. Authenticated awards never touch it.
pub const KEY_XP: &str = "xp";
/// Prefix of the per-identity mirror of the last known profile XP
/// (`xp:<uid>`).
pub const KEY_IDENTITY_XP: &str = "xp";
/// Prefix of the per-identity XP awarded while the profile store was
/// unreachable (`pendingXp:<uid>`).
pub const KEY_PENDING_XP: &str = "pendingXp";
/// Cached persona; presence means seeding already happened.
pub const KEY_PERSONA: &str = "persona";
/// Last applied style preference.
pub const KEY_USER_STYLE: &str = "userStyle";
/// Raw quiz answers as a JSON array.
pub const KEY_QUIZ_ANSWERS: &str = "quizAnswers";

pub type StoreResult<T> = Result<T, StoreError>;

/// Local store failure.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidData { key: &'static str, message: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData { key, message } => {
                write!(f, "invalid local entry `{key}`: {message}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable string-keyed storage.
pub trait LocalStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// SQLite-backed local store over the `local_entries` table.
pub struct SqliteLocalStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLocalStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LocalStore for SqliteLocalStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO local_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM local_entries WHERE key = ?1;", [key])?;
        Ok(())
    }
}

/// Typed view over the well-known local entries.
#[derive(Clone, Copy)]
pub struct LocalState<'a> {
    store: &'a dyn LocalStore,
}

impl<'a> LocalState<'a> {
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self { store }
    }

    /// Returns the task snapshot; a missing entry is an empty queue.
    pub fn tasks(&self) -> StoreResult<Vec<Task>> {
        match self.store.get(KEY_TASKS)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|err| StoreError::InvalidData {
                key: KEY_TASKS,
                message: err.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> StoreResult<()> {
        let raw = serde_json::to_string(tasks).map_err(|err| StoreError::InvalidData {
            key: KEY_TASKS,
            message: err.to_string(),
        })?;
        self.store.set(KEY_TASKS, &raw)
    }

    /// Anonymous XP.
    pub fn xp(&self) -> StoreResult<u64> {
        self.read_counter(KEY_XP, KEY_XP)
    }

    pub fn set_xp(&self, xp: u64) -> StoreResult<()> {
        self.store.set(KEY_XP, &xp.to_string())
    }

    /// Last XP this device saw for `uid`, queued awards included.
    pub fn identity_xp(&self, uid: &str) -> StoreResult<u64> {
        self.read_counter(&identity_key(KEY_IDENTITY_XP, uid), KEY_IDENTITY_XP)
    }

    pub fn set_identity_xp(&self, uid: &str, xp: u64) -> StoreResult<()> {
        self.store
            .set(&identity_key(KEY_IDENTITY_XP, uid), &xp.to_string())
    }

    /// XP queued for `uid` and not yet accepted by the profile store.
    pub fn pending_xp(&self, uid: &str) -> StoreResult<u64> {
        self.read_counter(&identity_key(KEY_PENDING_XP, uid), KEY_PENDING_XP)
    }

    pub fn set_pending_xp(&self, uid: &str, amount: u64) -> StoreResult<()> {
        let key = identity_key(KEY_PENDING_XP, uid);
        if amount == 0 {
            return self.store.remove(&key);
        }
        self.store.set(&key, &amount.to_string())
    }

    pub fn persona(&self) -> StoreResult<Option<Persona>> {
        match self.store.get(KEY_PERSONA)? {
            Some(raw) => Persona::parse(&raw)
                .map(Some)
                .ok_or_else(|| StoreError::InvalidData {
                    key: KEY_PERSONA,
                    message: format!("unknown persona `{raw}`"),
                }),
            None => Ok(None),
        }
    }

    pub fn set_persona(&self, persona: Persona) -> StoreResult<()> {
        self.store.set(KEY_PERSONA, persona.as_str())
    }

    pub fn user_style(&self) -> StoreResult<Option<StylePreference>> {
        Ok(self
            .store
            .get(KEY_USER_STYLE)?
            .map(|raw| StylePreference::parse_lenient(&raw)))
    }

    pub fn set_user_style(&self, style: StylePreference) -> StoreResult<()> {
        self.store.set(KEY_USER_STYLE, style.as_str())
    }

    pub fn quiz_answers(&self) -> StoreResult<Option<Vec<String>>> {
        match self.store.get(KEY_QUIZ_ANSWERS)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| StoreError::InvalidData {
                    key: KEY_QUIZ_ANSWERS,
                    message: err.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn set_quiz_answers(&self, answers: &[String]) -> StoreResult<()> {
        let raw = serde_json::to_string(answers).map_err(|err| StoreError::InvalidData {
            key: KEY_QUIZ_ANSWERS,
            message: err.to_string(),
        })?;
        self.store.set(KEY_QUIZ_ANSWERS, &raw)
    }

    fn read_counter(&self, key: &str, entry: &'static str) -> StoreResult<u64> {
        match self.store.get(key)? {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| StoreError::InvalidData {
                    key: entry,
                    message: format!("expected non-negative integer, got `{raw}`"),
                }),
            None => Ok(0),
        }
    }
}

fn identity_key(prefix: &str, uid: &str) -> String {
    format!("{prefix}:{uid}")
}
