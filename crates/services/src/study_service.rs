use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use linguatron_core::{
    model::{Card, CardId, DeckId, Stage},
    sampler::{MultipleChoice, sample_distractors, sample_size},
    scheduler::{Grade, Scheduler, TransitionRule},
    selector::most_overdue,
    time::Clock,
};
use storage::repository::{CardFilter, CardRepository, StorageError};

use crate::error::StudyError;

//
// ─── QUEUES ────────────────────────────────────────────────────────────────────
//

/// Which pile of a deck to draw the next card from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    /// Every Learning card, whether or not its step has elapsed.
    Learning,
    /// Review cards whose due date has been reached.
    Review,
}

impl Queue {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Queue::Learning => "learning",
            Queue::Review => "review",
        }
    }

    /// Repository filter for this queue at `now`.
    #[must_use]
    pub fn filter(self, now: DateTime<Utc>) -> CardFilter {
        match self {
            Queue::Learning => CardFilter::stage(Stage::Learning),
            Queue::Review => CardFilter::stage(Stage::Review).and_due_by(now),
        }
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// A card ready to be shown, with its answer choices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presentation {
    pub card: Card,
    pub multiple_choice: MultipleChoice,
}

/// Outcome of asking a queue for its next card.
#[derive(Debug, Clone, PartialEq)]
pub enum NextCard {
    Present(Presentation),
    /// Nothing in the queue right now.
    Empty,
}

/// What answering a card did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerReceipt {
    /// The card as persisted after the transition.
    pub card: Card,
    pub rule: TransitionRule,
    pub correct: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Drives one study step: pick the most overdue card, offer choices, record the answer.
#[derive(Clone)]
pub struct StudyService {
    clock: Clock,
    scheduler: Scheduler,
    cards: Arc<dyn CardRepository>,
}

impl StudyService {
    #[must_use]
    pub fn new(clock: Clock, cards: Arc<dyn CardRepository>) -> Self {
        Self {
            clock,
            scheduler: Scheduler::new(),
            cards,
        }
    }

    /// Replace the default scheduler (for example to change the lapse policy).
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Select the most overdue card of `queue` and build its multiple-choice set.
    ///
    /// Distractors are drawn from the whole deck, sized by the deck's card count minus
    /// the presented card.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Storage` if the repository fails or holds a malformed row.
    pub async fn next_card<R>(
        &self,
        deck_id: DeckId,
        queue: Queue,
        rng: &mut R,
    ) -> Result<NextCard, StudyError>
    where
        R: Rng + ?Sized,
    {
        let now = self.clock.now();
        let candidates = self.cards.cards_for_deck(deck_id, queue.filter(now)).await?;

        let Some(due) = most_overdue(&candidates) else {
            debug!(deck_id = %deck_id, queue = queue.as_str(), "queue is empty");
            return Ok(NextCard::Empty);
        };

        // Decks too small for any distractor skip loading every card.
        let deck_size = self.cards.count_cards(deck_id).await?;
        let multiple_choice = if sample_size(deck_size.saturating_sub(1)) == 0 {
            MultipleChoice::assemble(due, Vec::new(), rng)
        } else {
            let deck_cards = self.cards.cards_for_deck(deck_id, CardFilter::all()).await?;
            let distractors = sample_distractors(&deck_cards, due.id(), rng);
            MultipleChoice::assemble(due, distractors, rng)
        };

        debug!(
            deck_id = %deck_id,
            card_id = %due.id(),
            queue = queue.as_str(),
            choices = multiple_choice.choices.len(),
            "presenting card"
        );

        Ok(NextCard::Present(Presentation {
            card: due.clone(),
            multiple_choice,
        }))
    }

    /// Apply `grade` to the card and persist the new schedule.
    ///
    /// The write is conditional on the schedule read here; a concurrent answer to the
    /// same card surfaces as `StorageError::Conflict` and is not retried.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Storage` with `NotFound` for unknown cards, `Conflict` when
    /// the card changed underneath, or any other storage failure.
    pub async fn answer(&self, card_id: CardId, grade: Grade) -> Result<AnswerReceipt, StudyError> {
        let card = self.cards.get_card(card_id).await?;
        self.record(&card, grade).await
    }

    /// Grade a typed answer against the card's answer text, ignoring case and
    /// surrounding whitespace, then record it.
    ///
    /// # Errors
    ///
    /// Same as [`StudyService::answer`].
    pub async fn answer_typed(
        &self,
        card_id: CardId,
        response: &str,
    ) -> Result<AnswerReceipt, StudyError> {
        let card = self.cards.get_card(card_id).await?;
        let grade = Grade::from(card.accepts(response));
        self.record(&card, grade).await
    }

    /// Grade a multiple-choice pick: correct only when the chosen card is the one asked.
    ///
    /// # Errors
    ///
    /// Same as [`StudyService::answer`].
    pub async fn answer_choice(
        &self,
        card_id: CardId,
        chosen: CardId,
    ) -> Result<AnswerReceipt, StudyError> {
        self.answer(card_id, Grade::from(chosen == card_id)).await
    }

    async fn record(&self, card: &Card, grade: Grade) -> Result<AnswerReceipt, StudyError> {
        let now = self.clock.now();
        let transition = self.scheduler.apply(card, grade, now);

        match self.cards.save_card(&transition.card, card.schedule()).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                warn!(card_id = %card.id(), "card changed while answering; answer dropped");
                return Err(StudyError::Storage(StorageError::Conflict));
            }
            Err(err) => return Err(err.into()),
        }

        let updated = transition.card;
        info!(
            card_id = %updated.id(),
            grade = ?grade,
            rule = ?transition.rule,
            stage = %updated.stage(),
            ease = updated.ease(),
            due = %updated.review_due_at(),
            "answer recorded"
        );

        Ok(AnswerReceipt {
            card: updated,
            rule: transition.rule,
            correct: grade.is_correct(),
        })
    }
}
