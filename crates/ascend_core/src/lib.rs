//! Core domain logic for Ascend.
//! This crate owns the XP, persona, task queue and mentor session rules.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;

pub use config::{AppConfig, ConfigError, MentorSettings, RemoteSettings};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::identity::AuthenticatedUser;
pub use model::persona::{Persona, StylePreference};
pub use model::profile::{level_for_xp, Profile, ProfileDocument, ProfilePatch};
pub use model::task::Task;
pub use repo::local_repo::{LocalState, LocalStore, SqliteLocalStore, StoreError, StoreResult};
pub use repo::profile_repo::{ProfileStore, RemoteError, RemoteResult, SqliteProfileStore};
pub use service::auth_service::{sign_in_with_email, AuthError, IdentityProvider};
pub use service::mentor_service::{
    greeting, HttpMentorTransport, MentorError, MentorOutcome, MentorReply, MentorRequest,
    MentorSession, MentorTransport, FALLBACK_TIP,
};
pub use service::persona_service::{classify, PersonaSeeder, QuizRequest, SeedState};
pub use service::profile_service::{ProfileEdit, ProfileService, ProfileServiceError};
pub use service::progression_service::{
    AwardSource, Progress, ProgressionEngine, ProgressionError, XpAward, MENTOR_ENGAGEMENT_XP,
    TASK_COMPLETION_XP,
};
pub use service::task_service::{CompletionTicket, TaskCompletion, TaskError, TaskQueue};
pub use session::SessionContext;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
