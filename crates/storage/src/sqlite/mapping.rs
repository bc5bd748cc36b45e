use chrono::{DateTime, Utc};
use linguatron_core::model::{Card, CardId, Deck, DeckId, Schedule, Stage};
use linguatron_core::time::{format_timestamp, parse_timestamp};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) const CARD_COLUMNS: &str = "id, deck_id, question, answer, stage, ease, correct, \
     incorrect, lapses, created_at, last_reviewed_at, review_due_at";

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn counter(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    let raw: i64 = row.try_get(field).map_err(ser)?;
    u32::try_from(raw).map_err(|_| StorageError::Serialization(format!("invalid {field}: {raw}")))
}

pub(crate) fn deck_id_from_i64(v: i64) -> Result<DeckId, StorageError> {
    Ok(DeckId::new(i64_to_u64("deck_id", v)?))
}

pub(crate) fn card_id_from_i64(v: i64) -> Result<CardId, StorageError> {
    Ok(CardId::new(i64_to_u64("card_id", v)?))
}

/// Stored form of an instant; see `linguatron_core::time::format_timestamp`.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    format_timestamp(at)
}

fn informational_ts(row: &SqliteRow, field: &'static str) -> Result<DateTime<Utc>, StorageError> {
    let raw: String = row.try_get(field).map_err(ser)?;
    parse_timestamp(&raw).map_err(ser)
}

pub(crate) fn map_deck_row(row: &SqliteRow) -> Result<Deck, StorageError> {
    Deck::new(
        deck_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        informational_ts(row, "created_at")?,
    )
    .map_err(ser)
}

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    let id = card_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;

    let raw_due: String = row.try_get("review_due_at").map_err(ser)?;
    let review_due_at = parse_timestamp(&raw_due).map_err(|_| StorageError::MalformedDueDate {
        card_id: id,
        raw: raw_due.clone(),
    })?;

    let last_reviewed_at = row
        .try_get::<Option<String>, _>("last_reviewed_at")
        .map_err(ser)?
        .map(|raw| parse_timestamp(&raw).map_err(ser))
        .transpose()?;

    let stage: Stage = row
        .try_get::<String, _>("stage")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    let schedule = Schedule::from_persisted(
        stage,
        counter(row, "ease")?,
        counter(row, "correct")?,
        counter(row, "incorrect")?,
        counter(row, "lapses")?,
        review_due_at,
        last_reviewed_at,
    )
    .map_err(ser)?;

    Ok(Card::from_persisted(
        id,
        deck_id_from_i64(row.try_get::<i64, _>("deck_id").map_err(ser)?)?,
        row.try_get::<String, _>("question").map_err(ser)?,
        row.try_get::<String, _>("answer").map_err(ser)?,
        informational_ts(row, "created_at")?,
        schedule,
    ))
}
