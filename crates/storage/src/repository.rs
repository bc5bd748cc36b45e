use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linguatron_core::model::{Card, CardId, Deck, DeckId, Schedule, Stage, ValidatedCard};
use linguatron_core::selector::is_due;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// The stored card changed between read and write.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored due date could not be parsed; the row violates the "due date always set"
    /// invariant and must be repaired, not skipped.
    #[error("card {card_id} has a malformed due date: {raw:?}")]
    MalformedDueDate { card_id: CardId, raw: String },
}

/// Which cards of a deck to return.
///
/// Both constraints are optional and combine with AND.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardFilter {
    pub stage: Option<Stage>,
    /// Inclusive: cards due at exactly this instant are returned.
    pub due_by: Option<DateTime<Utc>>,
}

impl CardFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            due_by: None,
        }
    }

    #[must_use]
    pub fn due_by(at: DateTime<Utc>) -> Self {
        Self {
            stage: None,
            due_by: Some(at),
        }
    }

    #[must_use]
    pub fn and_due_by(mut self, at: DateTime<Utc>) -> Self {
        self.due_by = Some(at);
        self
    }

    #[must_use]
    pub fn matches(&self, card: &Card) -> bool {
        self.stage.is_none_or(|s| card.stage() == s)
            && self.due_by.is_none_or(|at| is_due(card, at))
    }
}

/// Insert shape for a deck; storage assigns the id.
#[derive(Debug, Clone)]
pub struct NewDeckRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl NewDeckRecord {
    #[must_use]
    pub fn from_deck(deck: &Deck) -> Self {
        Self {
            name: deck.name().to_owned(),
            created_at: deck.created_at(),
        }
    }
}

/// Repository contract for decks.
#[async_trait]
pub trait DeckRepository: Send + Sync {
    /// Insert a new deck and return its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the deck cannot be stored.
    async fn insert_new_deck(&self, deck: NewDeckRecord) -> Result<DeckId, StorageError>;

    /// Fetch a deck by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_deck(&self, id: DeckId) -> Result<Deck, StorageError>;

    /// List all decks ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failures.
    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError>;

    /// Delete a deck together with all of its cards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the deck does not exist.
    async fn delete_deck(&self, id: DeckId) -> Result<(), StorageError>;
}

/// Repository contract for cards.
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Persist a validated card in its initial state and return it with its ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the deck does not exist.
    async fn insert_new_card(&self, card: ValidatedCard) -> Result<Card, StorageError>;

    /// Fetch a card by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, `MalformedDueDate` for corrupt rows.
    async fn get_card(&self, id: CardId) -> Result<Card, StorageError>;

    /// Cards of a deck matching `filter`, ordered by ID.
    ///
    /// An unknown deck yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDueDate` for corrupt rows, or other storage errors.
    async fn cards_for_deck(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, StorageError>;

    /// Number of cards in a deck.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failures.
    async fn count_cards(&self, deck_id: DeckId) -> Result<usize, StorageError>;

    /// Write the card's schedule if the stored schedule still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the card is gone and
    /// `StorageError::Conflict` if another write landed first.
    async fn save_card(&self, card: &Card, expected: &Schedule) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    decks: BTreeMap<DeckId, Deck>,
    cards: BTreeMap<CardId, Card>,
    last_deck_id: u64,
    last_card_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl DeckRepository for InMemoryRepository {
    async fn insert_new_deck(&self, deck: NewDeckRecord) -> Result<DeckId, StorageError> {
        let mut guard = self.lock()?;
        guard.last_deck_id += 1;
        let id = DeckId::new(guard.last_deck_id);
        let deck = Deck::new(id, deck.name, deck.created_at)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.decks.insert(id, deck);
        Ok(id)
    }

    async fn get_deck(&self, id: DeckId) -> Result<Deck, StorageError> {
        let guard = self.lock()?;
        guard.decks.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.decks.values().cloned().collect())
    }

    async fn delete_deck(&self, id: DeckId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.decks.remove(&id).ok_or(StorageError::NotFound)?;
        guard.cards.retain(|_, card| card.deck_id() != id);
        Ok(())
    }
}

#[async_trait]
impl CardRepository for InMemoryRepository {
    async fn insert_new_card(&self, card: ValidatedCard) -> Result<Card, StorageError> {
        let mut guard = self.lock()?;
        if !guard.decks.contains_key(&card.deck_id) {
            return Err(StorageError::NotFound);
        }
        guard.last_card_id += 1;
        let card = card.assign_id(CardId::new(guard.last_card_id));
        guard.cards.insert(card.id(), card.clone());
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        let guard = self.lock()?;
        guard.cards.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn cards_for_deck(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .cards
            .values()
            .filter(|card| card.deck_id() == deck_id && filter.matches(card))
            .cloned()
            .collect())
    }

    async fn count_cards(&self, deck_id: DeckId) -> Result<usize, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .cards
            .values()
            .filter(|card| card.deck_id() == deck_id)
            .count())
    }

    async fn save_card(&self, card: &Card, expected: &Schedule) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let stored = guard.cards.get_mut(&card.id()).ok_or(StorageError::NotFound)?;
        if stored.schedule() != expected {
            return Err(StorageError::Conflict);
        }
        *stored = card.clone();
        Ok(())
    }
}

/// Aggregates deck and card repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub decks: Arc<dyn DeckRepository>,
    pub cards: Arc<dyn CardRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let decks: Arc<dyn DeckRepository> = Arc::new(repo.clone());
        let cards: Arc<dyn CardRepository> = Arc::new(repo);
        Self { decks, cards }
    }
}
