use linguatron_core::model::{Deck, DeckId};

use super::SqliteRepository;
use super::mapping::{conn, deck_id_from_i64, id_to_i64, map_deck_row, ts};
use crate::repository::{DeckRepository, NewDeckRecord, StorageError};

#[async_trait::async_trait]
impl DeckRepository for SqliteRepository {
    async fn insert_new_deck(&self, deck: NewDeckRecord) -> Result<DeckId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO decks (name, created_at)
            VALUES (?1, ?2)
            ",
        )
        .bind(deck.name)
        .bind(ts(deck.created_at))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        deck_id_from_i64(res.last_insert_rowid())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Deck, StorageError> {
        let row = sqlx::query("SELECT id, name, created_at FROM decks WHERE id = ?1")
            .bind(id_to_i64("deck_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => map_deck_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM decks ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut decks = Vec::with_capacity(rows.len());
        for row in rows {
            decks.push(map_deck_row(&row)?);
        }
        Ok(decks)
    }

    async fn delete_deck(&self, id: DeckId) -> Result<(), StorageError> {
        // Cards go with the deck through ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM decks WHERE id = ?1")
            .bind(id_to_i64("deck_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
