use std::io::{self, BufRead, Write};

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chrono::{DateTime, Utc};
use linguatron_core::model::{CardId, DeckId};
use linguatron_core::sampler::MultipleChoice;
use linguatron_core::scheduler::Scheduler;
use linguatron_core::time::format_timestamp;
use services::{
    AppServices, AppServicesError, CardServiceError, Clock, DeckServiceError, NextCard, Queue,
    StudyError,
};
use storage::repository::CardFilter;

mod args;

use args::{Args, ArgsError, Command, EnvDefaults, Parsed};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Args(#[from] ArgsError),
    #[error(transparent)]
    Services(#[from] AppServicesError),
    #[error(transparent)]
    Deck(#[from] DeckServiceError),
    #[error(transparent)]
    Card(#[from] CardServiceError),
    #[error(transparent)]
    Study(#[from] StudyError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Map a typed number onto one of the offered choices.
fn pick_choice(choices: &MultipleChoice, input: &str) -> Option<CardId> {
    if !choices.enough_choices {
        return None;
    }
    let n = input.parse::<usize>().ok()?;
    choices.choices.get(n.checked_sub(1)?).map(|card| card.id())
}

async fn list_decks(services: &AppServices) -> Result<(), AppError> {
    let decks = services.decks().list_decks().await?;
    if decks.is_empty() {
        println!("No decks yet. Create one with `linguatron add-deck <name>`.");
        return Ok(());
    }
    println!(
        "{:>4}  {:<24} {:>6} {:>9} {:>7} {:>5}",
        "id", "name", "cards", "learning", "review", "due"
    );
    for deck in decks {
        let stats = services.cards().deck_stats(deck.id()).await?;
        println!(
            "{:>4}  {:<24} {:>6} {:>9} {:>7} {:>5}",
            deck.id(),
            deck.name(),
            stats.total,
            stats.learning,
            stats.review,
            stats.due
        );
    }
    Ok(())
}

/// Every card, or only what `queue` would draw from at `now`.
fn listing_filter(queue: Option<Queue>, now: DateTime<Utc>) -> CardFilter {
    queue.map_or_else(CardFilter::all, |queue| queue.filter(now))
}

async fn list_cards(
    services: &AppServices,
    deck_id: DeckId,
    queue: Option<Queue>,
) -> Result<(), AppError> {
    let filter = listing_filter(queue, services.study().now());
    let cards = services.cards().list_cards(deck_id, filter).await?;
    if cards.is_empty() {
        println!("No cards to show.");
        return Ok(());
    }
    println!(
        "{:>5}  {:<8} {:>5}  {:<30}  {}",
        "id", "stage", "ease", "due", "question"
    );
    for card in cards {
        println!(
            "{:>5}  {:<8} {:>5}  {:<30}  {}",
            card.id(),
            card.stage().to_string(),
            card.ease(),
            format_timestamp(card.review_due_at()),
            card.question()
        );
    }
    Ok(())
}

async fn study(
    services: &AppServices,
    deck_id: DeckId,
    queue: Queue,
    rng: &mut StdRng,
) -> Result<(), AppError> {
    let deck = services.decks().get_deck(deck_id).await?;
    let study = services.study();
    println!(
        "Studying {} ({} queue). Type the answer or a choice number; :q stops.",
        deck.name(),
        queue.as_str()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut answered = 0_u32;

    loop {
        let presentation = match study.next_card(deck_id, queue, rng).await? {
            NextCard::Present(presentation) => presentation,
            NextCard::Empty => {
                println!("Nothing left in the {} queue.", queue.as_str());
                break;
            }
        };

        let card = &presentation.card;
        let choices = &presentation.multiple_choice;
        println!();
        println!("{}", card.question());
        if choices.enough_choices {
            for (i, choice) in choices.choices.iter().enumerate() {
                println!("  {}. {}", i + 1, choice.answer());
            }
        }
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let input = line.trim();
        if input == ":q" {
            break;
        }

        let outcome = match pick_choice(choices, input) {
            Some(chosen) => study.answer_choice(card.id(), chosen).await,
            None => study.answer_typed(card.id(), input).await,
        };
        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(err) if err.is_conflict() => {
                warn!(card_id = %card.id(), "skipping card answered elsewhere");
                println!("That card was just answered elsewhere; moving on.");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if receipt.correct {
            println!("Correct.");
        } else {
            println!("Incorrect. The answer is: {}", receipt.card.answer());
        }
        println!(
            "Next due {} ({})",
            format_timestamp(receipt.card.review_due_at()),
            receipt.card.stage()
        );
        answered += 1;
    }

    info!(deck_id = %deck_id, answered, "study session ended");
    Ok(())
}

async fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let parsed = args::parse(std::env::args().skip(1), &EnvDefaults::from_process())
        .map_err(|e| {
            eprintln!("{e}");
            args::print_usage();
            e
        })?;
    let Args {
        db_url,
        lapse_policy,
        command,
    } = match parsed {
        Parsed::Run(args) => args,
        Parsed::Help => {
            args::print_usage();
            return Ok(());
        }
    };

    prepare_sqlite_file(&db_url)?;
    let scheduler = Scheduler::with_lapse_policy(lapse_policy);
    let services = AppServices::new_sqlite(&db_url, Clock::default(), scheduler).await?;
    info!(db_url = %db_url, ?lapse_policy, "storage ready");

    match command {
        Command::Decks => list_decks(&services).await,
        Command::AddDeck { name } => {
            let deck_id = services.decks().create_deck(name).await?;
            println!("Created deck {deck_id}");
            Ok(())
        }
        Command::DeleteDeck { deck_id } => {
            services.decks().delete_deck(deck_id).await?;
            println!("Deleted deck {deck_id}");
            Ok(())
        }
        Command::AddCard {
            deck_id,
            question,
            answer,
        } => {
            let card = services.cards().add_card(deck_id, question, answer).await?;
            println!("Added card {} to deck {deck_id}", card.id());
            Ok(())
        }
        Command::Study {
            deck_id,
            queue,
            seed,
        } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            study(&services, deck_id, queue, &mut rng).await
        }
        Command::Cards { deck_id, queue } => list_cards(&services, deck_id, queue).await,
        Command::Export { deck_id } => {
            println!("{}", services.cards().export_json(deck_id).await?);
            Ok(())
        }
    }
}

/// Create the database file (and its directory) so `SQLite` can open it.
fn prepare_sqlite_file(db_url: &str) -> Result<(), AppError> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let invalid = || ArgsError::InvalidDbUrl {
        raw: db_url.to_string(),
    };
    let path = db_url.strip_prefix("sqlite://").ok_or_else(invalid)?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(invalid().into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
