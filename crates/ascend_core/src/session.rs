//! Explicit per-session context.
//!
//! # Responsibility
//! - Carry the current identity and persona into progression and mentor
//!   calls instead of ambient globals.
//!
//! # Invariants
//! - Created once on load from the local store; updated only on auth-state
//!   change or persona seeding.

use crate::model::identity::AuthenticatedUser;
use crate::model::persona::Persona;
use crate::repo::local_repo::{LocalState, LocalStore, StoreResult};

/// `userId` sent to the mentor endpoint for anonymous sessions.
pub const ANONYMOUS_USER_ID: &str = "anon";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    identity: Option<AuthenticatedUser>,
    persona: Persona,
}

impl SessionContext {
    pub fn new(persona: Persona) -> Self {
        Self {
            identity: None,
            persona,
        }
    }

    /// Builds the context from the cached persona (`balanced` when unseeded).
    pub fn load(local: &dyn LocalStore) -> StoreResult<Self> {
        let persona = LocalState::new(local).persona()?.unwrap_or_default();
        Ok(Self::new(persona))
    }

    pub fn identity(&self) -> Option<&AuthenticatedUser> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn set_identity(&mut self, identity: Option<AuthenticatedUser>) {
        self.identity = identity;
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn set_persona(&mut self, persona: Persona) {
        self.persona = persona;
    }

    pub fn user_id(&self) -> &str {
        self.identity
            .as_ref()
            .map_or(ANONYMOUS_USER_ID, |user| user.uid.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionContext, ANONYMOUS_USER_ID};
    use crate::db::open_db_in_memory;
    use crate::model::identity::AuthenticatedUser;
    use crate::model::persona::Persona;
    use crate::repo::local_repo::{LocalState, SqliteLocalStore};

    #[test]
    fn loads_cached_persona_or_balanced() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        assert_eq!(
            SessionContext::load(&local).expect("load").persona(),
            Persona::Balanced
        );

        LocalState::new(&local)
            .set_persona(Persona::Mentor)
            .expect("set persona");
        assert_eq!(
            SessionContext::load(&local).expect("load").persona(),
            Persona::Mentor
        );
    }

    #[test]
    fn user_id_tracks_identity() {
        let mut ctx = SessionContext::new(Persona::Game);
        assert_eq!(ctx.user_id(), ANONYMOUS_USER_ID);

        ctx.set_identity(Some(AuthenticatedUser::new("uid-9")));
        assert_eq!(ctx.user_id(), "uid-9");
        assert!(ctx.is_authenticated());
    }
}
