//! Per-identity profile store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide get-by-key, set-with-merge and atomic read-modify-write over
//!   profile documents keyed by identity uid.
//! - Retry lock contention transparently inside `transact`.
//!
//! # Invariants
//! - `transact` runs read, update and write under one `BEGIN IMMEDIATE`
//!   transaction, so concurrent increments for one uid never lose updates.
//! - The update closure may run more than once; it must be side-effect free.
//! - Contention that outlasts the attempt budget surfaces as
//!   `RemoteError::Unavailable`.

use crate::db::DbError;
use crate::model::persona::StylePreference;
use crate::model::profile::{ProfileDocument, ProfilePatch};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: u32 = 5;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Profile store failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure, storage failure or exhausted contention retries.
    Unavailable(String),
    /// The store refused access for this identity.
    PermissionDenied(String),
    /// A stored document could not be decoded.
    InvalidData(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "profile store unavailable: {reason}"),
            Self::PermissionDenied(reason) => write!(f, "profile store denied access: {reason}"),
            Self::InvalidData(message) => write!(f, "invalid profile document: {message}"),
        }
    }
}

impl Error for RemoteError {}

impl From<DbError> for RemoteError {
    fn from(value: DbError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// Update function applied inside a profile transaction.
///
/// Receives the current document (`None` when absent) and returns the fields
/// to write.
pub type ProfileUpdate<'f> = &'f dyn Fn(Option<&ProfileDocument>) -> ProfilePatch;

/// Document store keyed by identity uid.
pub trait ProfileStore {
    fn get_profile(&self, uid: &str) -> RemoteResult<Option<ProfileDocument>>;
    fn set_profile_merge(&self, uid: &str, patch: &ProfilePatch) -> RemoteResult<()>;
    /// Atomic read-modify-write; returns the document as committed.
    fn transact(&self, uid: &str, update: ProfileUpdate<'_>) -> RemoteResult<ProfileDocument>;
}

/// SQLite-backed profile store.
pub struct SqliteProfileStore<'conn> {
    conn: &'conn Connection,
    max_attempts: u32,
}

impl<'conn> SqliteProfileStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_max_attempts(conn, DEFAULT_MAX_TRANSACTION_ATTEMPTS)
    }

    pub fn with_max_attempts(conn: &'conn Connection, max_attempts: u32) -> Self {
        Self {
            conn,
            max_attempts: max_attempts.max(1),
        }
    }

    fn try_transact(
        &self,
        uid: &str,
        update: ProfileUpdate<'_>,
    ) -> Result<ProfileDocument, TransactFailure> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(TransactFailure::db)?;
        let current = select_document(&tx, uid)?;
        let patch = update(current.as_ref());
        if !patch.is_empty() {
            upsert_merge(&tx, uid, &patch).map_err(TransactFailure::db)?;
        }
        let committed = select_document(&tx, uid)?.unwrap_or_else(|| ProfileDocument {
            uid: uid.to_string(),
            ..ProfileDocument::default()
        });
        tx.commit().map_err(TransactFailure::db)?;
        Ok(committed)
    }
}

impl ProfileStore for SqliteProfileStore<'_> {
    fn get_profile(&self, uid: &str) -> RemoteResult<Option<ProfileDocument>> {
        select_document(self.conn, uid).map_err(RemoteError::from)
    }

    fn set_profile_merge(&self, uid: &str, patch: &ProfilePatch) -> RemoteResult<()> {
        upsert_merge(self.conn, uid, patch).map_err(|err| RemoteError::from(DbError::from(err)))
    }

    fn transact(&self, uid: &str, update: ProfileUpdate<'_>) -> RemoteResult<ProfileDocument> {
        for attempt in 1..=self.max_attempts {
            match self.try_transact(uid, update) {
                Ok(document) => {
                    debug!("event=profile_transact module=repo status=ok attempt={attempt}");
                    return Ok(document);
                }
                Err(TransactFailure::Db(err)) if err.is_busy() => {
                    warn!(
                        "event=profile_transact module=repo status=contended attempt={} max_attempts={}",
                        attempt, self.max_attempts
                    );
                }
                Err(failure) => return Err(failure.into()),
            }
        }

        Err(RemoteError::Unavailable(format!(
            "profile transaction still contended after {} attempts",
            self.max_attempts
        )))
    }
}

enum TransactFailure {
    Db(DbError),
    Remote(RemoteError),
}

impl TransactFailure {
    fn db(err: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(err))
    }
}

impl From<TransactFailure> for RemoteError {
    fn from(value: TransactFailure) -> Self {
        match value {
            TransactFailure::Db(err) => err.into(),
            TransactFailure::Remote(err) => err,
        }
    }
}

impl From<ReadFailure> for TransactFailure {
    fn from(value: ReadFailure) -> Self {
        match value {
            ReadFailure::Db(err) => Self::Db(err),
            ReadFailure::Invalid(message) => Self::Remote(RemoteError::InvalidData(message)),
        }
    }
}

enum ReadFailure {
    Db(DbError),
    Invalid(String),
}

impl From<rusqlite::Error> for ReadFailure {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ReadFailure> for RemoteError {
    fn from(value: ReadFailure) -> Self {
        match value {
            ReadFailure::Db(err) => err.into(),
            ReadFailure::Invalid(message) => Self::InvalidData(message),
        }
    }
}

fn select_document(conn: &Connection, uid: &str) -> Result<Option<ProfileDocument>, ReadFailure> {
    let raw = conn
        .query_row(
            "SELECT uid, name, goal, style_preference, xp, updated_at
             FROM profiles
             WHERE uid = ?1;",
            [uid],
            RawProfileRow::from_row,
        )
        .optional()?;
    raw.map(RawProfileRow::into_document).transpose()
}

fn upsert_merge(conn: &Connection, uid: &str, patch: &ProfilePatch) -> rusqlite::Result<()> {
    let xp = patch
        .xp
        .map(|value| i64::try_from(value).unwrap_or(i64::MAX));
    conn.execute(
        "INSERT INTO profiles (uid, name, goal, style_preference, xp, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(uid) DO UPDATE SET
            name = COALESCE(excluded.name, profiles.name),
            goal = COALESCE(excluded.goal, profiles.goal),
            style_preference = COALESCE(excluded.style_preference, profiles.style_preference),
            xp = COALESCE(excluded.xp, profiles.xp),
            updated_at = COALESCE(excluded.updated_at, profiles.updated_at);",
        params![
            uid,
            patch.name.as_deref(),
            patch.goal.as_deref(),
            patch.style_preference.map(StylePreference::as_str),
            xp,
            patch.updated_at,
        ],
    )?;
    Ok(())
}

struct RawProfileRow {
    uid: String,
    name: Option<String>,
    goal: Option<String>,
    style_preference: Option<String>,
    xp: Option<i64>,
    updated_at: Option<i64>,
}

impl RawProfileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get("uid")?,
            name: row.get("name")?,
            goal: row.get("goal")?,
            style_preference: row.get("style_preference")?,
            xp: row.get("xp")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_document(self) -> Result<ProfileDocument, ReadFailure> {
        let xp = match self.xp {
            Some(value) => Some(u64::try_from(value).map_err(|_| {
                ReadFailure::Invalid(format!("negative xp `{value}` for uid `{}`", self.uid))
            })?),
            None => None,
        };
        Ok(ProfileDocument {
            uid: self.uid,
            name: self.name,
            goal: self.goal,
            style_preference: self
                .style_preference
                .as_deref()
                .map(StylePreference::parse_lenient),
            xp,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ProfileStore, SqliteProfileStore};
    use crate::db::open_db_in_memory;
    use crate::model::persona::StylePreference;
    use crate::model::profile::ProfilePatch;

    #[test]
    fn merge_keeps_untouched_fields() {
        let conn = open_db_in_memory().expect("in-memory db");
        let store = SqliteProfileStore::new(&conn);

        store
            .set_profile_merge(
                "u1",
                &ProfilePatch {
                    name: Some("Ana".to_string()),
                    xp: Some(40),
                    ..ProfilePatch::default()
                },
            )
            .expect("first merge");
        store
            .set_profile_merge(
                "u1",
                &ProfilePatch {
                    goal: Some("run 5k".to_string()),
                    style_preference: Some(StylePreference::Mentor),
                    ..ProfilePatch::default()
                },
            )
            .expect("second merge");

        let document = store.get_profile("u1").expect("read").expect("exists");
        assert_eq!(document.name.as_deref(), Some("Ana"));
        assert_eq!(document.goal.as_deref(), Some("run 5k"));
        assert_eq!(document.style_preference, Some(StylePreference::Mentor));
        assert_eq!(document.xp, Some(40));
    }

    #[test]
    fn transact_on_missing_document_sees_none_and_creates_it() {
        let conn = open_db_in_memory().expect("in-memory db");
        let store = SqliteProfileStore::new(&conn);

        let committed = store
            .transact("fresh", &|current| {
                assert!(current.is_none());
                ProfilePatch::xp(10)
            })
            .expect("transact");
        assert_eq!(committed.xp, Some(10));
        assert_eq!(
            store.get_profile("fresh").expect("read").map(|d| d.xp),
            Some(Some(10))
        );
    }

    #[test]
    fn empty_patch_transaction_writes_nothing() {
        let conn = open_db_in_memory().expect("in-memory db");
        let store = SqliteProfileStore::new(&conn);

        let committed = store
            .transact("ghost", &|_| ProfilePatch::default())
            .expect("transact");
        assert_eq!(committed.uid, "ghost");
        assert_eq!(committed.xp, None);
        assert!(store.get_profile("ghost").expect("read").is_none());
    }
}
