use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use linguatron_core::model::{Card, CardDraft, DeckId, Stage};
use linguatron_core::selector::is_due;
use storage::repository::{CardFilter, CardRepository};

use crate::Clock;
use crate::error::CardServiceError;

/// Per-deck counts shown on the deck overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeckStats {
    pub total: usize,
    pub learning: usize,
    pub review: usize,
    /// Cards of either stage whose due date has been reached.
    pub due: usize,
}

/// Orchestrates card creation and read-side queries.
#[derive(Clone)]
pub struct CardService {
    clock: Clock,
    cards: Arc<dyn CardRepository>,
}

impl CardService {
    #[must_use]
    pub fn new(clock: Clock, cards: Arc<dyn CardRepository>) -> Self {
        Self { clock, cards }
    }

    /// Validate and insert a new card in its initial Learning state, due now.
    ///
    /// # Errors
    ///
    /// Returns `CardServiceError::Card` if the question or answer is blank.
    /// Returns `CardServiceError::Storage` if the deck does not exist or persistence fails.
    pub async fn add_card(
        &self,
        deck_id: DeckId,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<Card, CardServiceError> {
        let validated = CardDraft::new(deck_id, question, answer).validate(self.clock.now())?;
        let card = self.cards.insert_new_card(validated).await?;
        info!(deck_id = %deck_id, card_id = %card.id(), "card added");
        Ok(card)
    }

    /// List a deck's cards ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `CardServiceError::Storage` if repository access fails.
    pub async fn list_cards(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, CardServiceError> {
        Ok(self.cards.cards_for_deck(deck_id, filter).await?)
    }

    /// Count a deck's cards by stage and due-ness at the service clock's now.
    ///
    /// # Errors
    ///
    /// Returns `CardServiceError::Storage` if repository access fails.
    pub async fn deck_stats(&self, deck_id: DeckId) -> Result<DeckStats, CardServiceError> {
        let now = self.clock.now();
        let cards = self.cards.cards_for_deck(deck_id, CardFilter::all()).await?;

        let mut stats = DeckStats {
            total: cards.len(),
            ..DeckStats::default()
        };
        for card in &cards {
            match card.stage() {
                Stage::Learning => stats.learning += 1,
                Stage::Review => stats.review += 1,
            }
            if is_due(card, now) {
                stats.due += 1;
            }
        }
        Ok(stats)
    }

    /// Serialize every card of a deck, schedule included, as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `CardServiceError::Storage` if repository access fails, or
    /// `CardServiceError::Export` if serialization fails.
    pub async fn export_json(&self, deck_id: DeckId) -> Result<String, CardServiceError> {
        let cards = self.cards.cards_for_deck(deck_id, CardFilter::all()).await?;
        Ok(serde_json::to_string_pretty(&cards)?)
    }
}
