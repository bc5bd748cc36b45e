#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    CardFilter, CardRepository, DeckRepository, InMemoryRepository, NewDeckRecord, Storage,
    StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
