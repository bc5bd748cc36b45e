use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;
use super::mapping::ts;

/// Applies schema migrations that have not run yet.
///
/// Every timestamp column holds the canonical RFC 3339 text form, so ordering and
/// range filters on those columns can compare strings directly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: decks and cards.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS decks (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY,
                    deck_id INTEGER NOT NULL,
                    question TEXT NOT NULL,
                    answer TEXT NOT NULL,
                    stage TEXT NOT NULL DEFAULT 'learning'
                        CHECK (stage IN ('learning', 'review')),
                    ease INTEGER NOT NULL DEFAULT 1 CHECK (ease >= 1),
                    correct INTEGER NOT NULL DEFAULT 0 CHECK (correct >= 0),
                    incorrect INTEGER NOT NULL DEFAULT 0 CHECK (incorrect >= 0),
                    lapses INTEGER NOT NULL DEFAULT 0 CHECK (lapses >= 0),
                    created_at TEXT NOT NULL,
                    last_reviewed_at TEXT,
                    review_due_at TEXT NOT NULL,
                    FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_cards_deck_stage_due
                    ON cards(deck_id, stage, review_due_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(ts(Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
