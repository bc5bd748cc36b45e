use linguatron_core::model::{Card, CardId, DeckId, Schedule, ValidatedCard};

use super::SqliteRepository;
use super::mapping::{CARD_COLUMNS, card_id_from_i64, conn, id_to_i64, map_card_row, ts};
use crate::repository::{CardFilter, CardRepository, StorageError};

#[async_trait::async_trait]
impl CardRepository for SqliteRepository {
    async fn insert_new_card(&self, card: ValidatedCard) -> Result<Card, StorageError> {
        let deck = id_to_i64("deck_id", card.deck_id.value())?;

        let exists = sqlx::query("SELECT 1 FROM decks WHERE id = ?1")
            .bind(deck)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let created = ts(card.created_at);
        let res = sqlx::query(
            r"
            INSERT INTO cards (deck_id, question, answer, created_at, review_due_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
        )
        .bind(deck)
        .bind(card.question.as_str())
        .bind(card.answer.as_str())
        .bind(created)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(card.assign_id(card_id_from_i64(res.last_insert_rowid())?))
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_to_i64("card_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => map_card_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn cards_for_deck(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, StorageError> {
        let mut sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE deck_id = ?1");
        let mut next_param = 2;
        if filter.stage.is_some() {
            sql.push_str(&format!(" AND stage = ?{next_param}"));
            next_param += 1;
        }
        if filter.due_by.is_some() {
            sql.push_str(&format!(" AND review_due_at <= ?{next_param}"));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut q = sqlx::query(&sql).bind(id_to_i64("deck_id", deck_id.value())?);
        if let Some(stage) = filter.stage {
            q = q.bind(stage.as_str());
        }
        if let Some(at) = filter.due_by {
            q = q.bind(ts(at));
        }

        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            cards.push(map_card_row(&row)?);
        }
        Ok(cards)
    }

    async fn count_cards(&self, deck_id: DeckId) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cards WHERE deck_id = ?1")
            .bind(id_to_i64("deck_id", deck_id.value())?)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;

        usize::try_from(count)
            .map_err(|_| StorageError::Serialization(format!("invalid card count: {count}")))
    }

    async fn save_card(&self, card: &Card, expected: &Schedule) -> Result<(), StorageError> {
        let id = id_to_i64("card_id", card.id().value())?;
        let next = card.schedule();

        let res = sqlx::query(
            r"
            UPDATE cards SET
                stage = ?1,
                ease = ?2,
                correct = ?3,
                incorrect = ?4,
                lapses = ?5,
                review_due_at = ?6,
                last_reviewed_at = ?7
            WHERE id = ?8
              AND stage = ?9
              AND ease = ?10
              AND correct = ?11
              AND incorrect = ?12
              AND lapses = ?13
              AND review_due_at = ?14
              AND last_reviewed_at IS ?15
            ",
        )
        .bind(next.stage().as_str())
        .bind(i64::from(next.ease()))
        .bind(i64::from(next.correct()))
        .bind(i64::from(next.incorrect()))
        .bind(i64::from(next.lapses()))
        .bind(ts(next.review_due_at()))
        .bind(next.last_reviewed_at().map(ts))
        .bind(id)
        .bind(expected.stage().as_str())
        .bind(i64::from(expected.ease()))
        .bind(i64::from(expected.correct()))
        .bind(i64::from(expected.incorrect()))
        .bind(i64::from(expected.lapses()))
        .bind(ts(expected.review_due_at()))
        .bind(expected.last_reviewed_at().map(ts))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM cards WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        match exists {
            Some(_) => Err(StorageError::Conflict),
            None => Err(StorageError::NotFound),
        }
    }
}
