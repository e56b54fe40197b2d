//! Storage contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define the client-side key-value store and the per-identity profile
//!   store contracts.
//! - Keep SQL details out of the progression/task/mentor services.
//!
//! # Invariants
//! - Local store reads reject malformed values instead of masking them.
//! - Profile read-modify-write runs inside one serialized transaction.

pub mod local_repo;
pub mod profile_repo;
