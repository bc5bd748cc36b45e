use std::sync::Arc;

use linguatron_core::scheduler::Scheduler;
use storage::repository::Storage;

use crate::Clock;
use crate::card_service::CardService;
use crate::deck_service::DeckService;
use crate::error::AppServicesError;
use crate::study_service::StudyService;

/// Assembles app-facing services over one storage backend and clock.
#[derive(Clone)]
pub struct AppServices {
    study: Arc<StudyService>,
    cards: Arc<CardService>,
    decks: Arc<DeckService>,
}

impl AppServices {
    /// Build services over an already opened storage.
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, scheduler: Scheduler) -> Self {
        let study = StudyService::new(clock, Arc::clone(&storage.cards)).with_scheduler(scheduler);
        Self {
            study: Arc::new(study),
            cards: Arc::new(CardService::new(clock, Arc::clone(&storage.cards))),
            decks: Arc::new(DeckService::new(clock, Arc::clone(&storage.decks))),
        }
    }

    /// Build services backed by `SQLite` storage, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Sqlite` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        scheduler: Scheduler,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, clock, scheduler))
    }

    #[must_use]
    pub fn study(&self) -> Arc<StudyService> {
        Arc::clone(&self.study)
    }

    #[must_use]
    pub fn cards(&self) -> Arc<CardService> {
        Arc::clone(&self.cards)
    }

    #[must_use]
    pub fn decks(&self) -> Arc<DeckService> {
        Arc::clone(&self.decks)
    }
}
