//! Persona and style preference enums.
//!
//! # Invariants
//! - Stored string forms are stable: `game|mentor|balanced` for personas and
//!   `auto|game|mentor` for style preferences.
//! - Unknown stored style values read back as `Auto` instead of failing.

use serde::{Deserialize, Serialize};

/// Behavioral classification driving mentor tone and default styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// Challenge-driven: ranking, speed, XP.
    Game,
    /// Reflection-driven: purpose, values, calm.
    Mentor,
    /// No clear lean either way.
    #[default]
    Balanced,
}

impl Persona {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::Mentor => "mentor",
            Self::Balanced => "balanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "game" => Some(Self::Game),
            "mentor" => Some(Self::Mentor),
            "balanced" => Some(Self::Balanced),
            _ => None,
        }
    }

    /// Style a freshly seeded persona implies, if any.
    ///
    /// `Balanced` leaves the stored style untouched.
    pub fn implied_style(self) -> Option<StylePreference> {
        match self {
            Self::Game => Some(StylePreference::Game),
            Self::Mentor => Some(StylePreference::Mentor),
            Self::Balanced => None,
        }
    }
}

/// User-selected presentation style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylePreference {
    /// Follow whatever style the local store last recorded.
    #[default]
    Auto,
    Game,
    Mentor,
}

impl StylePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Game => "game",
            Self::Mentor => "mentor",
        }
    }

    /// Parses a stored value, treating anything unknown as `Auto`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim() {
            "game" => Self::Game,
            "mentor" => Self::Mentor,
            _ => Self::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Persona, StylePreference};

    #[test]
    fn persona_string_forms_are_stable() {
        for persona in [Persona::Game, Persona::Mentor, Persona::Balanced] {
            assert_eq!(Persona::parse(persona.as_str()), Some(persona));
        }
        assert_eq!(Persona::parse("wizard"), None);
    }

    #[test]
    fn unknown_style_reads_as_auto() {
        assert_eq!(StylePreference::parse_lenient("neon"), StylePreference::Auto);
        assert_eq!(StylePreference::parse_lenient(" mentor "), StylePreference::Mentor);
    }

    #[test]
    fn balanced_persona_implies_no_style() {
        assert_eq!(Persona::Balanced.implied_style(), None);
        assert_eq!(Persona::Game.implied_style(), Some(StylePreference::Game));
    }
}
