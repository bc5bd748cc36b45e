use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use thiserror::Error;

/// Clock used by services to stamp answers and new cards.
///
/// Everything that needs "now" takes it from a `Clock` so tests can pin time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: TimeDelta) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

//
// ─── CANONICAL TIMESTAMPS ──────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("timestamp `{raw}` is not RFC 3339 UTC: {reason}")]
pub struct TimestampError {
    pub raw: String,
    pub reason: String,
}

/// Formats an instant in the single representation used for every stored date:
/// RFC 3339, UTC with a `Z` suffix, nanosecond precision.
///
/// Fixed-width output keeps lexical order equal to chronological order, which the
/// SQL due-date filters rely on.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a timestamp produced by [`format_timestamp`].
///
/// Any RFC 3339 offset is accepted and normalized to UTC; anything else is an error.
///
/// # Errors
///
/// Returns `TimestampError` when `raw` is empty or not RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    if raw.trim().is_empty() {
        return Err(TimestampError {
            raw: raw.to_owned(),
            reason: "empty".into(),
        });
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TimestampError {
            raw: raw.to_owned(),
            reason: e.to_string(),
        })
}

/// Serde field adapters that write instants in the [`format_timestamp`] form.
///
/// Used as `#[serde(serialize_with = "crate::time::canonical_serde::serialize")]`.
pub mod canonical_serde {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    use super::format_timestamp;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(*at))
    }

    pub fn serialize_option<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => s.serialize_some(&format_timestamp(*at)),
            None => s.serialize_none(),
        }
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
