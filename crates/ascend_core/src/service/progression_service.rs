//! XP accumulation and level derivation.
//!
//! # Responsibility
//! - Award XP locally for anonymous users and through an atomic profile
//!   transaction for authenticated users.
//! - Queue awards the profile store could not accept and replay them with
//!   the next successful transaction for the same identity.
//!
//! # Invariants
//! - An award is never dropped: a failed remote transaction is applied to
//!   the identity's local mirror and added to its `pendingXp:<uid>` entry.
//! - Queued XP is only ever replayed for the identity that earned it.
//! - The anonymous `xp` counter is never written by authenticated awards.
//! - Level is recomputed from the returned XP; it is never stored.

use crate::model::identity::AuthenticatedUser;
use crate::model::profile::{level_for_xp, ProfileDocument, ProfilePatch};
use crate::repo::local_repo::{LocalState, LocalStore, StoreError};
use crate::repo::profile_repo::{ProfileStore, RemoteError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// XP granted for completing one task.
pub const TASK_COMPLETION_XP: u64 = 10;
/// XP granted for one successful mentor exchange.
pub const MENTOR_ENGAGEMENT_XP: u64 = 5;

/// Where an award ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardSource {
    /// Anonymous award, local store only.
    Local,
    /// Committed by the profile store and mirrored under the identity.
    Remote,
    /// Profile store failed; applied locally and queued for replay.
    Queued,
}

/// Result of one XP award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpAward {
    pub xp: u64,
    pub level: u32,
    pub source: AwardSource,
}

impl XpAward {
    fn new(xp: u64, source: AwardSource) -> Self {
        Self {
            xp,
            level: level_for_xp(xp),
            source,
        }
    }
}

/// Current XP and derived level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub xp: u64,
    pub level: u32,
}

impl From<u64> for Progress {
    fn from(xp: u64) -> Self {
        Self {
            xp,
            level: level_for_xp(xp),
        }
    }
}

#[derive(Debug)]
pub enum ProgressionError {
    /// Awards must be strictly positive.
    InvalidAmount,
    /// Local store failed; nothing was awarded.
    Store(StoreError),
    /// Replay of queued XP failed; the queue is left intact.
    Remote(RemoteError),
}

impl Display for ProgressionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "xp award must be greater than zero"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProgressionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidAmount => None,
            Self::Store(err) => Some(err),
            Self::Remote(err) => Some(err),
        }
    }
}

impl From<StoreError> for ProgressionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Progression engine over a local store and a profile store.
pub struct ProgressionEngine<'a> {
    local: LocalState<'a>,
    remote: &'a dyn ProfileStore,
}

impl<'a> ProgressionEngine<'a> {
    pub fn new(local: &'a dyn LocalStore, remote: &'a dyn ProfileStore) -> Self {
        Self {
            local: LocalState::new(local),
            remote,
        }
    }

    /// Awards `amount` XP to the given identity, or locally when anonymous.
    ///
    /// XP still queued for the identity rides along with the award, so a
    /// successful transaction also drains the queue.
    pub fn award_xp(
        &self,
        amount: u64,
        identity: Option<&AuthenticatedUser>,
    ) -> Result<XpAward, ProgressionError> {
        if amount == 0 {
            return Err(ProgressionError::InvalidAmount);
        }

        let Some(user) = identity else {
            let xp = self.local.xp()?.saturating_add(amount);
            self.local.set_xp(xp)?;
            info!("event=xp_award module=progression status=ok source=local amount={amount} xp={xp}");
            return Ok(XpAward::new(xp, AwardSource::Local));
        };

        let uid = user.uid.as_str();
        let pending = self.local.pending_xp(uid)?;
        match self.add_remote(uid, amount.saturating_add(pending)) {
            Ok(xp) => {
                self.local.set_identity_xp(uid, xp)?;
                self.local.set_pending_xp(uid, 0)?;
                info!(
                    "event=xp_award module=progression status=ok source=remote amount={} replayed={} xp={}",
                    amount, pending, xp
                );
                Ok(XpAward::new(xp, AwardSource::Remote))
            }
            Err(err) => {
                let xp = self.local.identity_xp(uid)?.saturating_add(amount);
                let pending = pending.saturating_add(amount);
                self.local.set_identity_xp(uid, xp)?;
                self.local.set_pending_xp(uid, pending)?;
                warn!(
                    "event=xp_award module=progression status=queued amount={} pending={} error={}",
                    amount, pending, err
                );
                Ok(XpAward::new(xp, AwardSource::Queued))
            }
        }
    }

    /// Replays XP queued for `identity` while the profile store was
    /// unreachable.
    ///
    /// Returns `Ok(None)` when nothing is queued for that identity.
    pub fn flush_pending(
        &self,
        identity: &AuthenticatedUser,
    ) -> Result<Option<XpAward>, ProgressionError> {
        let uid = identity.uid.as_str();
        let pending = self.local.pending_xp(uid)?;
        if pending == 0 {
            return Ok(None);
        }

        let xp = self
            .add_remote(uid, pending)
            .map_err(ProgressionError::Remote)?;
        self.local.set_identity_xp(uid, xp)?;
        self.local.set_pending_xp(uid, 0)?;
        info!("event=xp_flush module=progression status=ok amount={pending} xp={xp}");
        Ok(Some(XpAward::new(xp, AwardSource::Remote)))
    }

    /// XP the user should see right now.
    ///
    /// Authenticated users read the profile store plus their own queued XP;
    /// if the store is unreachable their local mirror is used. Anonymous
    /// users see the anonymous counter.
    pub fn current(
        &self,
        identity: Option<&AuthenticatedUser>,
    ) -> Result<Progress, ProgressionError> {
        let Some(user) = identity else {
            return Ok(Progress::from(self.local.xp()?));
        };

        let uid = user.uid.as_str();
        match self.remote.get_profile(uid) {
            Ok(document) => {
                let stored = document.as_ref().map_or(0, ProfileDocument::xp_or_zero);
                let xp = stored.saturating_add(self.local.pending_xp(uid)?);
                self.local.set_identity_xp(uid, xp)?;
                Ok(Progress::from(xp))
            }
            Err(err) => {
                warn!("event=xp_read module=progression status=fallback error={err}");
                Ok(Progress::from(self.local.identity_xp(uid)?))
            }
        }
    }

    fn add_remote(&self, uid: &str, amount: u64) -> Result<u64, RemoteError> {
        let committed = self.remote.transact(uid, &|current| {
            let base = current.map_or(0, ProfileDocument::xp_or_zero);
            ProfilePatch::xp(base.saturating_add(amount))
        })?;
        Ok(committed.xp_or_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::{AwardSource, ProgressionEngine, ProgressionError};
    use crate::db::open_db_in_memory;
    use crate::model::identity::AuthenticatedUser;
    use crate::repo::local_repo::{LocalState, SqliteLocalStore};
    use crate::repo::profile_repo::SqliteProfileStore;

    #[test]
    fn anonymous_awards_accumulate_locally() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);

        for amount in [10, 5, 10, 100] {
            engine.award_xp(amount, None).expect("award");
        }

        let award = engine.award_xp(5, None).expect("award");
        assert_eq!(award.xp, 130);
        assert_eq!(award.level, 2);
        assert_eq!(award.source, AwardSource::Local);
        assert_eq!(LocalState::new(&local).xp().expect("xp"), 130);
    }

    #[test]
    fn zero_award_is_rejected_without_writes() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);

        let err = engine.award_xp(0, None).expect_err("zero award");
        assert!(matches!(err, ProgressionError::InvalidAmount));
        assert_eq!(LocalState::new(&local).xp().expect("xp"), 0);
    }

    #[test]
    fn authenticated_award_mirrors_under_identity_only() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);
        let user = AuthenticatedUser::new("uid-1");

        engine.award_xp(10, Some(&user)).expect("first award");
        let award = engine.award_xp(10, Some(&user)).expect("second award");

        assert_eq!(award.xp, 20);
        assert_eq!(award.source, AwardSource::Remote);
        let state = LocalState::new(&local);
        assert_eq!(state.identity_xp("uid-1").expect("mirror"), 20);
        assert_eq!(state.xp().expect("anonymous xp"), 0);
        assert_eq!(engine.current(Some(&user)).expect("current").xp, 20);
    }
}
