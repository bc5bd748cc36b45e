use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Card, Schedule, Stage};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error("{name} growth factor must be finite and >= 1, got {provided}")]
    InvalidGrowthFactor { name: &'static str, provided: f64 },
    #[error("{name} interval must be positive")]
    InvalidInterval { name: &'static str },
    #[error("unknown lapse policy: {0}")]
    UnknownLapsePolicy(String),
}

//
// ─── INPUTS ────────────────────────────────────────────────────────────────────
//

/// Whether the learner got the card right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Correct,
    Incorrect,
}

impl Grade {
    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, Grade::Correct)
    }
}

impl From<bool> for Grade {
    fn from(correct: bool) -> Self {
        if correct { Grade::Correct } else { Grade::Incorrect }
    }
}

/// What happens to the stage when a Review card with ease above 1 is missed.
///
/// `KeepStage` leaves the card in Review with ease reset to 1, so it returns after a
/// minute and regrows from the floor on day-scale intervals. `DemoteToLearning` sends
/// it back through Learning instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapsePolicy {
    #[default]
    KeepStage,
    DemoteToLearning,
}

impl FromStr for LapsePolicy {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_stage" | "keep" => Ok(LapsePolicy::KeepStage),
            "demote_to_learning" | "demote" => Ok(LapsePolicy::DemoteToLearning),
            _ => Err(SchedulerError::UnknownLapsePolicy(s.to_owned())),
        }
    }
}

/// Name of the row of the transition table that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionRule {
    /// Learning, correct, ease above 1: promoted to Review.
    Graduate,
    /// Learning, correct, ease at the floor: ease grows, stays Learning.
    LearningStep,
    /// Learning, incorrect: ease back to 1.
    LearningReset,
    /// Review, correct: ease grows, interval in days equals the new ease.
    ReviewPass,
    /// Review, incorrect while ease is already 1: no lapse recorded.
    ReviewMiss,
    /// Review, incorrect with ease above 1: lapse recorded, ease back to 1.
    Lapse,
}

impl TransitionRule {
    /// Pick the table row for a card in `stage` with `ease`, answered with `grade`.
    #[must_use]
    pub fn select(stage: Stage, ease: u32, grade: Grade) -> Self {
        match (stage, grade) {
            (Stage::Learning, Grade::Correct) if ease > 1 => TransitionRule::Graduate,
            (Stage::Learning, Grade::Correct) => TransitionRule::LearningStep,
            (Stage::Learning, Grade::Incorrect) => TransitionRule::LearningReset,
            (Stage::Review, Grade::Correct) => TransitionRule::ReviewPass,
            (Stage::Review, Grade::Incorrect) if ease == 1 => TransitionRule::ReviewMiss,
            (Stage::Review, Grade::Incorrect) => TransitionRule::Lapse,
        }
    }
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Constants of the transition table.
///
/// The defaults are the canonical table; the other values exist for tests and for
/// revisiting the lapse rule without touching the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Delay before a Learning card (or a missed Review card) comes back.
    pub learning_step: TimeDelta,
    /// Delay before a freshly graduated card is shown again.
    pub graduation_interval: TimeDelta,
    /// Ease multiplier on a correct Learning answer at ease 1.
    pub learning_growth: f64,
    /// Ease multiplier applied when a card graduates.
    pub graduation_growth: f64,
    /// Ease multiplier on a correct Review answer.
    pub review_growth: f64,
    /// Upper bound on the day interval of a Review pass.
    pub max_review_interval_days: u32,
    pub lapse_policy: LapsePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            learning_step: TimeDelta::minutes(1),
            graduation_interval: TimeDelta::hours(24),
            learning_growth: 2.0,
            graduation_growth: 1.0,
            review_growth: 2.0,
            max_review_interval_days: 36_500,
            lapse_policy: LapsePolicy::KeepStage,
        }
    }
}

impl SchedulerConfig {
    /// # Errors
    ///
    /// - `InvalidGrowthFactor` if any factor is non-finite or below 1
    /// - `InvalidInterval` if a step, the graduation interval or the interval cap is not positive
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for (name, provided) in [
            ("learning", self.learning_growth),
            ("graduation", self.graduation_growth),
            ("review", self.review_growth),
        ] {
            if !provided.is_finite() || provided < 1.0 {
                return Err(SchedulerError::InvalidGrowthFactor { name, provided });
            }
        }
        if self.learning_step <= TimeDelta::zero() {
            return Err(SchedulerError::InvalidInterval { name: "learning step" });
        }
        if self.graduation_interval <= TimeDelta::zero() {
            return Err(SchedulerError::InvalidInterval { name: "graduation" });
        }
        if self.max_review_interval_days == 0 {
            return Err(SchedulerError::InvalidInterval { name: "maximum review" });
        }
        Ok(())
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Result of answering a card: the card's new state and the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub card: Card,
    pub rule: TransitionRule,
}

/// Two-stage (Learning / Review) scheduler with integer ease.
///
/// # Examples
///
/// ```
/// # use linguatron_core::model::{CardDraft, CardId, DeckId, Stage};
/// # use linguatron_core::scheduler::{Grade, Scheduler, TransitionRule};
/// # use linguatron_core::time::fixed_now;
/// let now = fixed_now();
/// let card = CardDraft::new(DeckId::new(1), "水", "water")
///     .validate(now)
///     .unwrap()
///     .assign_id(CardId::new(1));
///
/// let scheduler = Scheduler::new();
/// let step = scheduler.apply(&card, Grade::Correct, now);
/// assert_eq!(step.rule, TransitionRule::LearningStep);
/// assert_eq!(step.card.ease(), 2);
///
/// let grad = scheduler.apply(&step.card, Grade::Correct, now);
/// assert_eq!(grad.card.stage(), Stage::Review);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Scheduler with the canonical table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler with custom constants.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError` if the configuration fails validation.
    pub fn try_with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Canonical table with a different lapse policy.
    #[must_use]
    pub fn with_lapse_policy(lapse_policy: LapsePolicy) -> Self {
        Self {
            config: SchedulerConfig {
                lapse_policy,
                ..SchedulerConfig::default()
            },
        }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Apply one answer to a card.
    ///
    /// Total: never fails, always returns a card with `ease >= 1`, `last_reviewed_at ==
    /// Some(now)` and a due date strictly after `now`.
    #[must_use]
    pub fn apply(&self, card: &Card, grade: Grade, now: DateTime<Utc>) -> Transition {
        let current = card.schedule();
        let rule = TransitionRule::select(current.stage(), current.ease(), grade);
        let cfg = &self.config;

        let (correct, incorrect) = match grade {
            Grade::Correct => (current.correct().saturating_add(1), current.incorrect()),
            Grade::Incorrect => (current.correct(), current.incorrect().saturating_add(1)),
        };

        let (stage, ease, lapses, delay) = match rule {
            TransitionRule::Graduate => (
                Stage::Review,
                next_ease(current.ease(), cfg.graduation_growth),
                current.lapses(),
                cfg.graduation_interval,
            ),
            TransitionRule::LearningStep => (
                Stage::Learning,
                next_ease(current.ease(), cfg.learning_growth),
                current.lapses(),
                cfg.learning_step,
            ),
            TransitionRule::LearningReset => {
                (Stage::Learning, 1, current.lapses(), cfg.learning_step)
            }
            TransitionRule::ReviewPass => {
                let ease = next_ease(current.ease(), cfg.review_growth);
                let days = ease.min(cfg.max_review_interval_days);
                (
                    Stage::Review,
                    ease,
                    current.lapses(),
                    TimeDelta::days(i64::from(days)),
                )
            }
            TransitionRule::ReviewMiss => {
                (Stage::Review, 1, current.lapses(), cfg.learning_step)
            }
            TransitionRule::Lapse => (
                stage_after_lapse(cfg.lapse_policy),
                1,
                current.lapses().saturating_add(1),
                cfg.learning_step,
            ),
        };

        let due = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let schedule = Schedule::next(stage, ease, correct, incorrect, lapses, due, now);

        Transition {
            card: card.clone().with_schedule(schedule),
            rule,
        }
    }
}

fn stage_after_lapse(policy: LapsePolicy) -> Stage {
    match policy {
        LapsePolicy::KeepStage => Stage::Review,
        LapsePolicy::DemoteToLearning => Stage::Learning,
    }
}

/// `ceil(ease * factor)`, saturating at `u32::MAX` and never below 1.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn next_ease(ease: u32, factor: f64) -> u32 {
    let grown = (f64::from(ease) * factor).ceil();
    if grown >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    (grown as u32).max(1)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardDraft, CardId, DeckId};
    use crate::time::fixed_now;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn card_with(stage: Stage, ease: u32, lapses: u32) -> Card {
        let base = CardDraft::new(DeckId::new(1), "水", "water")
            .validate(fixed_now())
            .unwrap()
            .assign_id(CardId::new(1));
        let schedule =
            Schedule::from_persisted(stage, ease, 3, 2, lapses, fixed_now(), None).unwrap();
        base.with_schedule(schedule)
    }

    #[test]
    fn learning_correct_at_floor_doubles_ease() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Learning, 1, 0), Grade::Correct, now);

        assert_eq!(t.rule, TransitionRule::LearningStep);
        assert_eq!(t.card.ease(), 2);
        assert_eq!(t.card.stage(), Stage::Learning);
        assert_eq!(t.card.review_due_at(), now + TimeDelta::minutes(1));
        assert_eq!(t.card.schedule().correct(), 4);
        assert_eq!(t.card.last_reviewed_at(), Some(now));
    }

    #[test]
    fn learning_correct_above_floor_graduates() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Learning, 2, 0), Grade::Correct, now);

        assert_eq!(t.rule, TransitionRule::Graduate);
        assert_eq!(t.card.ease(), 2);
        assert_eq!(t.card.stage(), Stage::Review);
        assert_eq!(t.card.review_due_at(), now + TimeDelta::hours(24));
    }

    #[test]
    fn learning_incorrect_resets_ease() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Learning, 4, 0), Grade::Incorrect, now);

        assert_eq!(t.rule, TransitionRule::LearningReset);
        assert_eq!(t.card.ease(), 1);
        assert_eq!(t.card.stage(), Stage::Learning);
        assert_eq!(t.card.schedule().incorrect(), 3);
        assert_eq!(t.card.schedule().correct(), 3);
        assert_eq!(t.card.review_due_at(), now + TimeDelta::minutes(1));
    }

    #[test]
    fn review_correct_spaces_by_new_ease_in_days() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Review, 4, 0), Grade::Correct, now);

        assert_eq!(t.rule, TransitionRule::ReviewPass);
        assert_eq!(t.card.ease(), 8);
        assert_eq!(t.card.review_due_at(), now + TimeDelta::days(8));
    }

    #[test]
    fn review_incorrect_with_ease_records_lapse_and_keeps_stage() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Review, 4, 2), Grade::Incorrect, now);

        assert_eq!(t.rule, TransitionRule::Lapse);
        assert_eq!(t.card.ease(), 1);
        assert_eq!(t.card.schedule().lapses(), 3);
        assert_eq!(t.card.stage(), Stage::Review);
        assert_eq!(t.card.review_due_at(), now + TimeDelta::minutes(1));
    }

    #[test]
    fn review_incorrect_at_floor_is_not_a_lapse() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Review, 1, 2), Grade::Incorrect, now);

        assert_eq!(t.rule, TransitionRule::ReviewMiss);
        assert_eq!(t.card.schedule().lapses(), 2);
        assert_eq!(t.card.ease(), 1);
        assert_eq!(t.card.stage(), Stage::Review);
    }

    #[test]
    fn demote_policy_sends_lapsed_card_back_to_learning() {
        let now = fixed_now();
        let scheduler = Scheduler::with_lapse_policy(LapsePolicy::DemoteToLearning);
        let t = scheduler.apply(&card_with(Stage::Review, 8, 0), Grade::Incorrect, now);

        assert_eq!(t.rule, TransitionRule::Lapse);
        assert_eq!(t.card.stage(), Stage::Learning);
        assert_eq!(t.card.schedule().lapses(), 1);

        // Only the lapse row is affected by the policy.
        let miss = scheduler.apply(&card_with(Stage::Review, 1, 0), Grade::Incorrect, now);
        assert_eq!(miss.card.stage(), Stage::Review);
    }

    #[test]
    fn repeated_correct_answers_promote_a_new_card() {
        let scheduler = Scheduler::new();
        let mut now = fixed_now();
        let mut card = card_with(Stage::Learning, 1, 0);
        let mut last_ease = card.ease();

        while card.ease() <= 1 {
            card = scheduler.apply(&card, Grade::Correct, now).card;
            assert!(card.ease() > last_ease);
            assert_eq!(card.stage(), Stage::Learning);
            last_ease = card.ease();
            now += TimeDelta::minutes(1);
        }

        let promoted = scheduler.apply(&card, Grade::Correct, now);
        assert_eq!(promoted.card.stage(), Stage::Review);
    }

    #[test]
    fn ease_floor_and_future_due_hold_for_random_histories() {
        let scheduler = Scheduler::new();
        let demoting = Scheduler::with_lapse_policy(LapsePolicy::DemoteToLearning);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let mut card = card_with(Stage::Learning, 1, 0);
            let mut now = fixed_now();
            for _ in 0..40 {
                let grade = Grade::from(rng.random_bool(0.7));
                let s = if rng.random_bool(0.5) { &scheduler } else { &demoting };
                let t = s.apply(&card, grade, now);
                assert!(t.card.ease() >= 1);
                assert!(t.card.review_due_at() > now);
                card = t.card;
                now += TimeDelta::seconds(rng.random_range(0..100_000));
            }
        }
    }

    #[test]
    fn review_interval_is_capped_while_ease_keeps_growing() {
        let now = fixed_now();
        let t = Scheduler::new().apply(&card_with(Stage::Review, 40_000, 0), Grade::Correct, now);
        assert_eq!(t.card.ease(), 80_000);
        assert_eq!(t.card.review_due_at(), now + TimeDelta::days(36_500));
    }

    #[test]
    fn next_ease_rounds_up_and_saturates() {
        assert_eq!(next_ease(1, 2.0), 2);
        assert_eq!(next_ease(3, 1.5), 5);
        assert_eq!(next_ease(7, 1.0), 7);
        assert_eq!(next_ease(u32::MAX / 2 + 1, 2.0), u32::MAX);
    }

    #[test]
    fn config_rejects_shrinking_growth_and_empty_steps() {
        let shrinking = SchedulerConfig {
            review_growth: 0.5,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            Scheduler::try_with_config(shrinking),
            Err(SchedulerError::InvalidGrowthFactor { name: "review", .. })
        ));

        let nan = SchedulerConfig {
            learning_growth: f64::NAN,
            ..SchedulerConfig::default()
        };
        assert!(Scheduler::try_with_config(nan).is_err());

        let zero_step = SchedulerConfig {
            learning_step: TimeDelta::zero(),
            ..SchedulerConfig::default()
        };
        assert_eq!(
            Scheduler::try_with_config(zero_step).unwrap_err(),
            SchedulerError::InvalidInterval { name: "learning step" }
        );
    }

    #[test]
    fn grade_from_bool() {
        assert_eq!(Grade::from(true), Grade::Correct);
        assert_eq!(Grade::from(false), Grade::Incorrect);
        assert!(Grade::Correct.is_correct());
    }

    #[test]
    fn lapse_policy_parses_cli_spellings() {
        assert_eq!("keep-stage".parse::<LapsePolicy>(), Ok(LapsePolicy::KeepStage));
        assert_eq!("Demote".parse::<LapsePolicy>(), Ok(LapsePolicy::DemoteToLearning));
        assert_eq!(
            "demote_to_learning".parse::<LapsePolicy>(),
            Ok(LapsePolicy::DemoteToLearning)
        );
        assert!("sometimes".parse::<LapsePolicy>().is_err());
    }
}
