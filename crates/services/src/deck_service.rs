use std::sync::Arc;

use tracing::info;

use linguatron_core::model::{Deck, DeckId};
use storage::repository::{DeckRepository, NewDeckRecord};

use crate::Clock;
use crate::error::DeckServiceError;

/// Orchestrates deck creation and persistence.
#[derive(Clone)]
pub struct DeckService {
    clock: Clock,
    decks: Arc<dyn DeckRepository>,
}

impl DeckService {
    #[must_use]
    pub fn new(clock: Clock, decks: Arc<dyn DeckRepository>) -> Self {
        Self { clock, decks }
    }

    /// Create a new deck and persist it.
    ///
    /// # Errors
    ///
    /// Returns `DeckServiceError::Deck` for a blank name.
    /// Returns `DeckServiceError::Storage` if persistence fails.
    pub async fn create_deck(&self, name: impl Into<String>) -> Result<DeckId, DeckServiceError> {
        let now = self.clock.now();
        // The id is a placeholder; storage assigns the real one.
        let deck = Deck::new(DeckId::new(0), name, now)?;
        let deck_id = self
            .decks
            .insert_new_deck(NewDeckRecord::from_deck(&deck))
            .await?;
        info!(deck_id = %deck_id, name = deck.name(), "deck created");
        Ok(deck_id)
    }

    /// List decks ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `DeckServiceError::Storage` if repository access fails.
    pub async fn list_decks(&self) -> Result<Vec<Deck>, DeckServiceError> {
        Ok(self.decks.list_decks().await?)
    }

    /// Fetch a deck by ID.
    ///
    /// # Errors
    ///
    /// Returns `DeckServiceError::Storage` with `NotFound` when the deck does not exist.
    pub async fn get_deck(&self, deck_id: DeckId) -> Result<Deck, DeckServiceError> {
        Ok(self.decks.get_deck(deck_id).await?)
    }

    /// Delete a deck and every card in it.
    ///
    /// # Errors
    ///
    /// Returns `DeckServiceError::Storage` with `NotFound` when the deck does not exist.
    pub async fn delete_deck(&self, deck_id: DeckId) -> Result<(), DeckServiceError> {
        self.decks.delete_deck(deck_id).await?;
        info!(deck_id = %deck_id, "deck deleted");
        Ok(())
    }
}
