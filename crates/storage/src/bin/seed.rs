//! Fill a database with one deck of sample kanji cards.
//!
//! `cargo run -p storage --bin seed -- --cards 6`

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use linguatron_core::model::{CardDraft, Deck, DeckId};
use linguatron_core::time::parse_timestamp;
use storage::repository::{NewDeckRecord, Storage};

const SAMPLES: [(&str, &str); 6] = [
    ("水", "water"),
    ("火", "fire"),
    ("木", "tree"),
    ("山", "mountain"),
    ("川", "river"),
    ("日", "sun"),
];

#[derive(Debug)]
enum SeedArgError {
    NoValue(&'static str),
    Unexpected(String),
    BadValue { flag: &'static str, raw: String },
}

impl fmt::Display for SeedArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedArgError::NoValue(flag) => write!(f, "{flag} needs a value"),
            SeedArgError::Unexpected(arg) => write!(f, "unexpected argument: {arg}"),
            SeedArgError::BadValue { flag, raw } => write!(f, "bad {flag} value: {raw}"),
        }
    }
}

impl std::error::Error for SeedArgError {}

#[derive(Debug)]
struct SeedConfig {
    db_url: String,
    deck_name: String,
    cards: u32,
    now: Option<DateTime<Utc>>,
}

impl SeedConfig {
    fn defaults() -> Self {
        Self {
            db_url: std::env::var("LINGUATRON_DB_URL")
                .unwrap_or_else(|_| "sqlite:dev.sqlite3?mode=rwc".into()),
            deck_name: std::env::var("LINGUATRON_DECK_NAME").unwrap_or_else(|_| "Japanese".into()),
            cards: std::env::var("LINGUATRON_CARDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            now: None,
        }
    }

    /// `Ok(None)` means help was requested.
    fn from_args(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, SeedArgError> {
        let mut config = Self::defaults();
        let mut argv = argv.into_iter();
        while let Some(arg) = argv.next() {
            let flag: &'static str = match arg.as_str() {
                "--db" => "--db",
                "--deck-name" => "--deck-name",
                "--cards" => "--cards",
                "--now" => "--now",
                "-h" | "--help" => return Ok(None),
                _ => return Err(SeedArgError::Unexpected(arg.clone())),
            };
            let raw = argv.next().ok_or(SeedArgError::NoValue(flag))?;
            let bad = || SeedArgError::BadValue {
                flag,
                raw: raw.clone(),
            };
            match flag {
                "--db" if raw.trim().is_empty() => return Err(bad()),
                "--db" => config.db_url = raw,
                "--deck-name" => config.deck_name = raw,
                "--cards" => config.cards = raw.parse().map_err(|_| bad())?,
                _ => config.now = Some(parse_timestamp(&raw).map_err(|_| bad())?),
            }
        }
        Ok(Some(config))
    }
}

fn print_usage() {
    eprintln!("seed [--db <sqlite_url>] [--deck-name <name>] [--cards <n>] [--now <rfc3339>]");
    eprintln!("  env: LINGUATRON_DB_URL, LINGUATRON_DECK_NAME, LINGUATRON_CARDS");
}

async fn seed(config: SeedConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Storage::sqlite(&config.db_url).await?;
    let now = config.now.unwrap_or_else(Utc::now);

    let deck = Deck::new(DeckId::new(0), config.deck_name, now)?;
    let deck_id = storage
        .decks
        .insert_new_deck(NewDeckRecord::from_deck(&deck))
        .await?;

    let samples = SAMPLES.iter().cycle().take(config.cards as usize);
    for (offset, (question, answer)) in samples.enumerate() {
        // One second apart so the most overdue card is the first one inserted.
        let created_at = now + TimeDelta::seconds(i64::try_from(offset)?);
        let card = CardDraft::new(deck_id, *question, *answer).validate(created_at)?;
        storage.cards.insert_new_card(card).await?;
    }

    println!(
        "deck {deck_id} \"{}\": {} cards in {}",
        deck.name(),
        config.cards,
        config.db_url
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match SeedConfig::from_args(std::env::args().skip(1)) {
        Ok(Some(config)) => config,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = seed(config).await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
