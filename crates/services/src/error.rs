//! Shared error types for the services crate.

use thiserror::Error;

use linguatron_core::model::{CardError, DeckError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `StudyService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StudyError {
    /// True when the card (or deck) asked for does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StudyError::Storage(StorageError::NotFound))
    }

    /// True when another writer answered the same card first.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StudyError::Storage(StorageError::Conflict))
    }
}

/// Errors emitted by `CardService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CardServiceError {
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to export cards: {0}")]
    Export(#[from] serde_json::Error),
}

/// Errors emitted by `DeckService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeckServiceError {
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
