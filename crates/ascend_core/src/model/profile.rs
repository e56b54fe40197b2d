//! Profile documents and level derivation.
//!
//! # Responsibility
//! - Model the remote per-identity document, including missing fields.
//! - Derive the user level from cumulative XP.
//!
//! # Invariants
//! - `level_for_xp` is pure and monotonically non-decreasing.
//! - Level is never persisted; every reader derives it from `xp`.

use crate::model::persona::StylePreference;
use serde::{Deserialize, Serialize};

const LEVEL_XP_SCALE: f64 = 100.0;
const LEVEL_EXPONENT: f64 = 1.1;

/// Derives the display level: `floor((xp / 100 + 1) ^ 1.1)`.
pub fn level_for_xp(xp: u64) -> u32 {
    let level = (xp as f64 / LEVEL_XP_SCALE + 1.0).powf(LEVEL_EXPONENT).floor();
    if level >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        level as u32
    }
}

/// Raw profile document as stored remotely.
///
/// Every field may be absent: documents created by a merge write, or by older
/// clients, can lack any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub uid: String,
    pub name: Option<String>,
    pub goal: Option<String>,
    pub style_preference: Option<StylePreference>,
    pub xp: Option<u64>,
    pub updated_at: Option<i64>,
}

impl ProfileDocument {
    /// XP with a missing field treated as zero.
    pub fn xp_or_zero(&self) -> u64 {
        self.xp.unwrap_or(0)
    }

    /// Applies defaults for missing fields.
    pub fn to_profile(&self) -> Profile {
        Profile {
            uid: self.uid.clone(),
            name: self.name.clone().unwrap_or_default(),
            goal: self.goal.clone().unwrap_or_default(),
            style_preference: self.style_preference.unwrap_or_default(),
            xp: self.xp_or_zero(),
            updated_at: self.updated_at,
        }
    }
}

/// Profile view with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub uid: String,
    pub name: String,
    pub goal: String,
    pub style_preference: StylePreference,
    pub xp: u64,
    pub updated_at: Option<i64>,
}

impl Profile {
    pub fn level(&self) -> u32 {
        level_for_xp(self.xp)
    }
}

/// Field-level merge write. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub goal: Option<String>,
    pub style_preference: Option<StylePreference>,
    pub xp: Option<u64>,
    pub updated_at: Option<i64>,
}

impl ProfilePatch {
    /// Patch touching only the XP counter.
    pub fn xp(value: u64) -> Self {
        Self {
            xp: Some(value),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
