//! Profile lifecycle: auth-state changes and explicit edits.
//!
//! # Responsibility
//! - Create the default profile the first time an identity is observed.
//! - Pull the stored style preference into the local store on sign-in.
//! - Replay XP queued for the identity while it was offline.
//! - Apply explicit name/goal/style edits with a merge write.
//!
//! # Invariants
//! - Default creation never overwrites an existing document, even when
//!   another session creates or awards concurrently.
//! - Edits never touch `xp`.
//! - A failed replay on sign-in leaves the identity's queue intact; sign-in
//!   still succeeds.

use crate::model::identity::AuthenticatedUser;
use crate::model::persona::StylePreference;
use crate::model::profile::{Profile, ProfilePatch};
use crate::model::task::now_epoch_ms;
use crate::repo::local_repo::{LocalState, LocalStore, StoreError};
use crate::repo::profile_repo::{ProfileStore, RemoteError};
use crate::service::progression_service::{ProgressionEngine, ProgressionError};
use crate::session::SessionContext;
use log::{info, warn};
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ProfileServiceError {
    /// Profile edits require an authenticated identity.
    NotSignedIn,
    Remote(RemoteError),
    Store(StoreError),
}

impl Display for ProfileServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "sign in before editing the profile"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProfileServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotSignedIn => None,
            Self::Remote(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RemoteError> for ProfileServiceError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<StoreError> for ProfileServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Explicit profile edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEdit {
    pub name: String,
    pub goal: String,
    pub style_preference: StylePreference,
}

pub struct ProfileService<'a> {
    local: LocalState<'a>,
    remote: &'a dyn ProfileStore,
    progression: ProgressionEngine<'a>,
}

impl<'a> ProfileService<'a> {
    pub fn new(local: &'a dyn LocalStore, remote: &'a dyn ProfileStore) -> Self {
        Self {
            local: LocalState::new(local),
            remote,
            progression: ProgressionEngine::new(local, remote),
        }
    }

    /// Applies an auth-state change to the session.
    ///
    /// Signing in ensures a profile exists, syncs its style locally and
    /// replays XP queued for that identity; signing out only clears the
    /// identity. Returns the signed-in profile.
    pub fn on_auth_state_changed(
        &self,
        ctx: &mut SessionContext,
        user: Option<AuthenticatedUser>,
    ) -> Result<Option<Profile>, ProfileServiceError> {
        ctx.set_identity(user);
        let Some(user) = ctx.identity() else {
            info!("event=auth_change module=profile status=ok signed_in=false");
            return Ok(None);
        };

        let default_name = user.display_name.clone().unwrap_or_default();
        let created = Cell::new(false);
        let document = self.remote.transact(&user.uid, &|current| {
            created.set(current.is_none());
            match current {
                Some(_) => ProfilePatch::default(),
                None => ProfilePatch {
                    name: Some(default_name.clone()),
                    style_preference: Some(StylePreference::Auto),
                    xp: Some(0),
                    ..ProfilePatch::default()
                },
            }
        })?;

        let mut profile = document.to_profile();
        profile.xp = self.replay_pending(user, profile.xp)?;
        // A fresh profile carries no preference yet; keep the locally seeded one.
        if !created.get() {
            self.local.set_user_style(profile.style_preference)?;
        }
        info!(
            "event=auth_change module=profile status=ok signed_in=true fresh_profile={} level={}",
            created.get(),
            profile.level()
        );
        Ok(Some(profile))
    }

    /// Flushes the identity's queue and returns the XP to show.
    fn replay_pending(
        &self,
        user: &AuthenticatedUser,
        stored_xp: u64,
    ) -> Result<u64, ProfileServiceError> {
        match self.progression.flush_pending(user) {
            Ok(Some(award)) => Ok(award.xp),
            Ok(None) => {
                self.local.set_identity_xp(&user.uid, stored_xp)?;
                Ok(stored_xp)
            }
            Err(ProgressionError::Store(err)) => Err(err.into()),
            Err(err) => {
                warn!("event=xp_flush module=profile status=deferred error={err}");
                Ok(stored_xp.saturating_add(self.local.pending_xp(&user.uid)?))
            }
        }
    }

    /// Saves name, goal and style for the signed-in user.
    pub fn save_profile(
        &self,
        ctx: &SessionContext,
        edit: &ProfileEdit,
    ) -> Result<(), ProfileServiceError> {
        let user = ctx.identity().ok_or(ProfileServiceError::NotSignedIn)?;
        self.remote.set_profile_merge(
            &user.uid,
            &ProfilePatch {
                name: Some(edit.name.trim().to_string()),
                goal: Some(edit.goal.trim().to_string()),
                style_preference: Some(edit.style_preference),
                xp: None,
                updated_at: Some(now_epoch_ms()),
            },
        )?;
        self.local.set_user_style(edit.style_preference)?;
        info!(
            "event=profile_save module=profile status=ok style={}",
            edit.style_preference.as_str()
        );
        Ok(())
    }

    /// Resolves the style to present: the stored preference unless it is
    /// missing or `auto`, in which case `game`.
    pub fn effective_style(&self) -> Result<StylePreference, ProfileServiceError> {
        Ok(match self.local.user_style()? {
            Some(StylePreference::Auto) | None => StylePreference::Game,
            Some(style) => style,
        })
    }
}
