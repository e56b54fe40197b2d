//! Persona classification and one-time seeding.
//!
//! # Responsibility
//! - Classify free-text quiz answers into a persona (pure).
//! - Seed the cached persona exactly once per local store.
//!
//! # Invariants
//! - `classify` has no side effects and no error cases.
//! - Each keyword scores at most once per side, regardless of repeats.
//! - Seeding only happens from `SeedState::Unseeded`; a cached persona is
//!   never recomputed.

use crate::model::persona::Persona;
use crate::repo::local_repo::{LocalState, LocalStore, StoreResult};
use log::info;

const GAME_KEYWORDS: &[&str] = &[
    "desafio",
    "competir",
    "jogo",
    "ranking",
    "meta",
    "xp",
    "nivel",
    "desempenho",
    "velocidade",
];

const MENTOR_KEYWORDS: &[&str] = &[
    "calma",
    "propósito",
    "significado",
    "reflexão",
    "mentalidade",
    "valores",
    "segurança",
    "estabilidade",
];

/// Questions shown when no persona is cached yet.
pub const QUIZ_QUESTIONS: &[&str] = &[
    "1) O que mais te motiva hoje? (digite curto)",
    "2) Você prefere desafios rápidos ou reflexões profundas?",
];

/// Classifies answers by keyword containment.
pub fn classify<S: AsRef<str>>(answers: &[S]) -> Persona {
    let text = answers
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let game = keyword_score(&text, GAME_KEYWORDS);
    let mentor = keyword_score(&text, MENTOR_KEYWORDS);

    match game.cmp(&mentor) {
        std::cmp::Ordering::Greater => Persona::Game,
        std::cmp::Ordering::Less => Persona::Mentor,
        std::cmp::Ordering::Equal => Persona::Balanced,
    }
}

fn keyword_score(text: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count()
}

/// Input request issued while the persona is not seeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRequest {
    pub questions: Vec<&'static str>,
}

/// Seeding state machine: `Unseeded -> Seeded`, never back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedState {
    Unseeded(QuizRequest),
    Seeded(Persona),
}

/// Persists the persona, the raw answers and the implied style once.
pub struct PersonaSeeder<'a> {
    local: LocalState<'a>,
}

impl<'a> PersonaSeeder<'a> {
    pub fn new(local: &'a dyn LocalStore) -> Self {
        Self {
            local: LocalState::new(local),
        }
    }

    /// Reports whether quiz answers are still needed.
    pub fn state(&self) -> StoreResult<SeedState> {
        Ok(match self.local.persona()? {
            Some(persona) => SeedState::Seeded(persona),
            None => SeedState::Unseeded(QuizRequest {
                questions: QUIZ_QUESTIONS.to_vec(),
            }),
        })
    }

    /// Answers the quiz request.
    ///
    /// On an already seeded store this is a no-op returning the cached
    /// persona; answers are discarded.
    pub fn seed(&self, answers: &[String]) -> StoreResult<Persona> {
        if let Some(persona) = self.local.persona()? {
            return Ok(persona);
        }

        let persona = classify(answers);
        self.local.set_quiz_answers(answers)?;
        if let Some(style) = persona.implied_style() {
            self.local.set_user_style(style)?;
        }
        // Written last: its presence is the seeded marker.
        self.local.set_persona(persona)?;
        info!(
            "event=persona_seed module=persona status=ok persona={}",
            persona.as_str()
        );
        Ok(persona)
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, PersonaSeeder, SeedState};
    use crate::db::open_db_in_memory;
    use crate::model::persona::{Persona, StylePreference};
    use crate::repo::local_repo::{LocalState, SqliteLocalStore};

    #[test]
    fn classifies_reference_answers() {
        assert_eq!(
            classify(&["quero competir no ranking", "gosto de desafios"]),
            Persona::Game
        );
        assert_eq!(classify(&["busco propósito e calma"]), Persona::Mentor);
        assert_eq!(classify(&["ok"]), Persona::Balanced);
    }

    #[test]
    fn blank_and_empty_answers_are_balanced() {
        assert_eq!(classify::<&str>(&[]), Persona::Balanced);
        assert_eq!(classify(&["", "   "]), Persona::Balanced);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        // "ranking" x3 = 1 point vs "calma" + "valores" = 2 points.
        assert_eq!(
            classify(&["ranking ranking ranking", "calma e valores"]),
            Persona::Mentor
        );
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        assert_eq!(classify(&["DESAFIOS e COMPETIR"]), Persona::Game);
        // "metas" contains "meta".
        assert_eq!(classify(&["minhas metas"]), Persona::Game);
    }

    #[test]
    fn seeding_happens_once() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let seeder = PersonaSeeder::new(&local);

        match seeder.state().expect("state") {
            SeedState::Unseeded(request) => assert_eq!(request.questions.len(), 2),
            other => panic!("unexpected state: {other:?}"),
        }

        let first = seeder
            .seed(&["quero competir".to_string(), "desafios".to_string()])
            .expect("seed");
        assert_eq!(first, Persona::Game);

        let second = seeder
            .seed(&["calma".to_string(), "propósito".to_string()])
            .expect("reseed");
        assert_eq!(second, Persona::Game);
        assert_eq!(seeder.state().expect("state"), SeedState::Seeded(Persona::Game));

        let state = LocalState::new(&local);
        assert_eq!(
            state.user_style().expect("style"),
            Some(StylePreference::Game)
        );
        assert_eq!(
            state.quiz_answers().expect("answers"),
            Some(vec!["quero competir".to_string(), "desafios".to_string()])
        );
    }

    #[test]
    fn balanced_seed_leaves_style_unset() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let seeder = PersonaSeeder::new(&local);

        assert_eq!(seeder.seed(&["ok".to_string()]).expect("seed"), Persona::Balanced);
        assert_eq!(LocalState::new(&local).user_style().expect("style"), None);
    }
}
