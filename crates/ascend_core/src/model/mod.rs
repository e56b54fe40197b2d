//! Domain model for the progression core.
//!
//! # Responsibility
//! - Define tasks, personas, profiles and identities shared by services.
//! - Keep derived values (level) as functions of stored values, never fields.
//!
//! # Invariants
//! - XP is a non-negative counter; level is always derived from it.
//! - Task order is insertion order; duplicate titles are allowed.

pub mod identity;
pub mod persona;
pub mod profile;
pub mod task;
