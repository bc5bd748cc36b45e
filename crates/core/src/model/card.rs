use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, DeckId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("card question cannot be empty")]
    EmptyQuestion,

    #[error("card answer cannot be empty")]
    EmptyAnswer,

    #[error("ease must be at least 1, got {0}")]
    InvalidEase(u32),

    #[error("invalid card stage: {0}")]
    InvalidStage(String),
}

//
// ─── STAGE ─────────────────────────────────────────────────────────────────────
//

/// Retention phase of a card.
///
/// `Learning` cards come back after minutes; `Review` cards are spaced out in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Learning,
    Review,
}

impl Stage {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Learning => "learning",
            Stage::Review => "review",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(Stage::Learning),
            "review" => Ok(Stage::Review),
            other => Err(CardError::InvalidStage(other.to_owned())),
        }
    }
}

//
// ─── SCHEDULE ──────────────────────────────────────────────────────────────────
//

/// Every field the scheduler owns.
///
/// Fields are private: outside this crate a `Schedule` can only be produced by
/// `Schedule::from_persisted` (storage) or by the scheduler itself. Equality on the
/// whole struct doubles as the compare-and-swap token for repository writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    stage: Stage,
    ease: u32,
    correct: u32,
    incorrect: u32,
    lapses: u32,
    #[serde(serialize_with = "crate::time::canonical_serde::serialize")]
    review_due_at: DateTime<Utc>,
    #[serde(serialize_with = "crate::time::canonical_serde::serialize_option")]
    last_reviewed_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// State of a card that has never been answered.
    #[must_use]
    pub fn initial(created_at: DateTime<Utc>) -> Self {
        Self {
            stage: Stage::Learning,
            ease: 1,
            correct: 0,
            incorrect: 0,
            lapses: 0,
            review_due_at: created_at,
            last_reviewed_at: None,
        }
    }

    /// Rebuild a schedule read back from storage.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidEase` if `ease` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        stage: Stage,
        ease: u32,
        correct: u32,
        incorrect: u32,
        lapses: u32,
        review_due_at: DateTime<Utc>,
        last_reviewed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, CardError> {
        if ease == 0 {
            return Err(CardError::InvalidEase(ease));
        }
        Ok(Self {
            stage,
            ease,
            correct,
            incorrect,
            lapses,
            review_due_at,
            last_reviewed_at,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn next(
        stage: Stage,
        ease: u32,
        correct: u32,
        incorrect: u32,
        lapses: u32,
        review_due_at: DateTime<Utc>,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            ease: ease.max(1),
            correct,
            incorrect,
            lapses,
            review_due_at,
            last_reviewed_at: Some(reviewed_at),
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn ease(&self) -> u32 {
        self.ease
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn incorrect(&self) -> u32 {
        self.incorrect
    }

    #[must_use]
    pub fn lapses(&self) -> u32 {
        self.lapses
    }

    #[must_use]
    pub fn review_due_at(&self) -> DateTime<Utc> {
        self.review_due_at
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.last_reviewed_at
    }
}

//
// ─── CARD TYPES ────────────────────────────────────────────────────────────────
//

/// User input for a new card, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDraft {
    pub deck_id: DeckId,
    pub question: String,
    pub answer: String,
}

impl CardDraft {
    #[must_use]
    pub fn new(deck_id: DeckId, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            deck_id,
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// Check the draft and stamp it with its creation time.
    ///
    /// # Errors
    ///
    /// Returns `CardError::EmptyQuestion` or `CardError::EmptyAnswer` for blank text.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedCard, CardError> {
        if self.question.trim().is_empty() {
            return Err(CardError::EmptyQuestion);
        }
        if self.answer.trim().is_empty() {
            return Err(CardError::EmptyAnswer);
        }
        Ok(ValidatedCard {
            deck_id: self.deck_id,
            question: self.question,
            answer: self.answer,
            created_at: now,
        })
    }
}

/// A checked draft waiting for storage to hand out an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCard {
    pub deck_id: DeckId,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

impl ValidatedCard {
    /// Build the card in its initial state: Learning, ease 1, due at creation.
    #[must_use]
    pub fn assign_id(self, id: CardId) -> Card {
        Card {
            id,
            deck_id: self.deck_id,
            question: self.question,
            answer: self.answer,
            created_at: self.created_at,
            schedule: Schedule::initial(self.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    id: CardId,
    deck_id: DeckId,
    question: String,
    answer: String,
    #[serde(serialize_with = "crate::time::canonical_serde::serialize")]
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    schedule: Schedule,
}

impl Card {
    /// Rebuild a card from its stored parts.
    #[must_use]
    pub fn from_persisted(
        id: CardId,
        deck_id: DeckId,
        question: String,
        answer: String,
        created_at: DateTime<Utc>,
        schedule: Schedule,
    ) -> Self {
        Self {
            id,
            deck_id,
            question,
            answer,
            created_at,
            schedule,
        }
    }

    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.schedule.stage
    }

    #[must_use]
    pub fn ease(&self) -> u32 {
        self.schedule.ease
    }

    #[must_use]
    pub fn review_due_at(&self) -> DateTime<Utc> {
        self.schedule.review_due_at
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.schedule.last_reviewed_at
    }

    /// Whether a typed response matches this card's answer.
    ///
    /// Comparison ignores case and surrounding whitespace.
    #[must_use]
    pub fn accepts(&self, given: &str) -> bool {
        given.trim().to_lowercase() == self.answer.trim().to_lowercase()
    }

    pub(crate) fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
