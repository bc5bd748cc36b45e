//! Picks the card to present next.

use chrono::{DateTime, Utc};

use crate::model::Card;

/// Returns the card with the earliest due date.
///
/// Ties go to the card that comes first. `None` means there is nothing to show,
/// which callers should treat as an empty state rather than a failure.
#[must_use]
pub fn most_overdue<'a, I>(cards: I) -> Option<&'a Card>
where
    I: IntoIterator<Item = &'a Card>,
{
    // `min_by_key` keeps the first of several equal minima.
    cards.into_iter().min_by_key(|card| card.review_due_at())
}

/// Whether the card is eligible for presentation at `now`.
#[must_use]
pub fn is_due(card: &Card, now: DateTime<Utc>) -> bool {
    card.review_due_at() <= now
}
