//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into progression, task, persona, mentor,
//!   profile and sign-in use cases.
//! - Keep callers decoupled from storage and transport details.

pub mod auth_service;
pub mod mentor_service;
pub mod persona_service;
pub mod profile_service;
pub mod progression_service;
pub mod task_service;
