use std::fmt;

use linguatron_core::model::DeckId;
use linguatron_core::scheduler::LapsePolicy;
use services::Queue;

pub const DEFAULT_DB_URL: &str = "sqlite://dev.sqlite3";

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    MissingPositional { what: &'static str },
    InvalidDeckId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidQueue { raw: String },
    InvalidSeed { raw: String },
    InvalidLapsePolicy { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::MissingPositional { what } => write!(f, "missing {what}"),
            ArgsError::InvalidDeckId { raw } => write!(f, "invalid deck id: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidQueue { raw } => {
                write!(f, "invalid --queue value (expected learning or review): {raw}")
            }
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
            ArgsError::InvalidLapsePolicy { raw } => {
                write!(f, "invalid lapse policy (expected keep-stage or demote): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

/// Settings read from the environment before flags are applied.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub db_url: Option<String>,
    pub deck_id: Option<String>,
    pub lapse_policy: Option<String>,
}

impl EnvDefaults {
    pub fn from_process() -> Self {
        Self {
            db_url: std::env::var("LINGUATRON_DB_URL").ok(),
            deck_id: std::env::var("LINGUATRON_DECK_ID").ok(),
            lapse_policy: std::env::var("LINGUATRON_LAPSE_POLICY").ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Decks,
    AddDeck {
        name: String,
    },
    DeleteDeck {
        deck_id: DeckId,
    },
    AddCard {
        deck_id: DeckId,
        question: String,
        answer: String,
    },
    Study {
        deck_id: DeckId,
        queue: Queue,
        seed: Option<u64>,
    },
    Export {
        deck_id: DeckId,
    },
    /// List a deck's cards, optionally only those a queue would draw from.
    Cards {
        deck_id: DeckId,
        queue: Option<Queue>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub db_url: String,
    pub lapse_policy: LapsePolicy,
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Run(Args),
    Help,
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_deck_id(raw: &str) -> Result<DeckId, ArgsError> {
    raw.parse::<DeckId>().map_err(|_| ArgsError::InvalidDeckId {
        raw: raw.to_owned(),
    })
}

fn parse_queue(raw: &str) -> Result<Queue, ArgsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "learning" => Ok(Queue::Learning),
        "review" => Ok(Queue::Review),
        _ => Err(ArgsError::InvalidQueue {
            raw: raw.to_owned(),
        }),
    }
}

fn parse_lapse_policy(raw: &str) -> Result<LapsePolicy, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidLapsePolicy {
        raw: raw.to_owned(),
    })
}

/// Parse the arguments following the program name.
///
/// With no subcommand the learning queue of the default deck is studied.
pub fn parse(
    argv: impl IntoIterator<Item = String>,
    env: &EnvDefaults,
) -> Result<Parsed, ArgsError> {
    let mut argv = argv.into_iter().peekable();

    let first = argv.peek().cloned();
    let subcommand = match first.as_deref() {
        None => "study".to_owned(),
        Some("--help" | "-h") => return Ok(Parsed::Help),
        Some(flag) if flag.starts_with("--") => "study".to_owned(),
        Some(name) => {
            argv.next();
            name.to_owned()
        }
    };

    let mut db_url = env
        .db_url
        .clone()
        .map_or_else(|| DEFAULT_DB_URL.to_owned(), normalize_sqlite_url);
    let mut deck_id = env
        .deck_id
        .as_deref()
        .map(parse_deck_id)
        .transpose()?
        .unwrap_or_else(|| DeckId::new(1));
    let mut lapse_policy = env
        .lapse_policy
        .as_deref()
        .map(parse_lapse_policy)
        .transpose()?
        .unwrap_or_default();
    let mut queue = None;
    let mut seed = None;
    let mut positional = Vec::new();

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--db" => {
                let value = require_value(&mut argv, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                db_url = normalize_sqlite_url(value);
            }
            "--deck-id" => deck_id = parse_deck_id(&require_value(&mut argv, "--deck-id")?)?,
            "--queue" => queue = Some(parse_queue(&require_value(&mut argv, "--queue")?)?),
            "--lapse-policy" => {
                lapse_policy = parse_lapse_policy(&require_value(&mut argv, "--lapse-policy")?)?;
            }
            "--seed" => {
                let value = require_value(&mut argv, "--seed")?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| ArgsError::InvalidSeed { raw: value.clone() })?,
                );
            }
            "--help" | "-h" => return Ok(Parsed::Help),
            _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let mut take = |what: &'static str| {
        positional
            .next()
            .ok_or(ArgsError::MissingPositional { what })
    };

    let command = match subcommand.as_str() {
        "decks" => Command::Decks,
        "add-deck" => Command::AddDeck {
            name: take("deck name")?,
        },
        "delete-deck" => Command::DeleteDeck { deck_id },
        "add-card" => Command::AddCard {
            deck_id,
            question: take("question")?,
            answer: take("answer")?,
        },
        "study" => Command::Study {
            deck_id,
            queue: queue.unwrap_or(Queue::Learning),
            seed,
        },
        "export" => Command::Export { deck_id },
        "cards" => Command::Cards { deck_id, queue },
        _ => return Err(ArgsError::UnknownCommand(subcommand)),
    };

    if let Some(extra) = positional.next() {
        return Err(ArgsError::UnknownArg(extra));
    }

    Ok(Parsed::Run(Args {
        db_url,
        lapse_policy,
        command,
    }))
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  linguatron decks                                  List decks with card counts");
    eprintln!("  linguatron add-deck <name>                        Create a deck");
    eprintln!("  linguatron delete-deck --deck-id <id>             Delete a deck and its cards");
    eprintln!("  linguatron add-card --deck-id <id> <q> <a>        Add a card to a deck");
    eprintln!("  linguatron study [--deck-id <id>] [--queue learning|review] [--seed <n>]");
    eprintln!("  linguatron cards --deck-id <id> [--queue learning|review]  List a deck's cards");
    eprintln!("  linguatron export --deck-id <id>                  Print a deck's cards as JSON");
    eprintln!();
    eprintln!("Options for every subcommand:");
    eprintln!("  --db <sqlite_url>          (default: {DEFAULT_DB_URL})");
    eprintln!("  --lapse-policy <policy>    keep-stage (default) or demote");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LINGUATRON_DB_URL, LINGUATRON_DECK_ID, LINGUATRON_LAPSE_POLICY, RUST_LOG");
}

/// Turn a relative `sqlite:` path into an absolute `sqlite://` URL.
pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(argv: &[&str]) -> Result<Args, ArgsError> {
        run_with(argv, &EnvDefaults::default())
    }

    fn run_with(argv: &[&str], env: &EnvDefaults) -> Result<Args, ArgsError> {
        match parse(argv.iter().map(|s| (*s).to_owned()), env)? {
            Parsed::Run(args) => Ok(args),
            Parsed::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn no_subcommand_studies_learning_queue_of_deck_one() {
        let args = run(&[]).unwrap();
        assert_eq!(args.db_url, DEFAULT_DB_URL);
        assert_eq!(args.lapse_policy, LapsePolicy::KeepStage);
        assert_eq!(
            args.command,
            Command::Study {
                deck_id: DeckId::new(1),
                queue: Queue::Learning,
                seed: None,
            }
        );
    }

    #[test]
    fn add_card_takes_two_positionals() {
        let args = run(&["add-card", "--deck-id", "3", "水", "water"]).unwrap();
        assert_eq!(
            args.command,
            Command::AddCard {
                deck_id: DeckId::new(3),
                question: "水".into(),
                answer: "water".into(),
            }
        );
        assert_eq!(
            run(&["add-card", "水"]).unwrap_err(),
            ArgsError::MissingPositional { what: "answer" }
        );
    }

    #[test]
    fn flags_override_environment() {
        let env = EnvDefaults {
            db_url: Some("sqlite:///tmp/env.sqlite3".into()),
            deck_id: Some("7".into()),
            lapse_policy: Some("demote".into()),
        };
        let args = run_with(
            &["study", "--deck-id", "2", "--queue", "review", "--seed", "9"],
            &env,
        )
        .unwrap();
        assert_eq!(args.db_url, "sqlite:///tmp/env.sqlite3");
        assert_eq!(args.lapse_policy, LapsePolicy::DemoteToLearning);
        assert_eq!(
            args.command,
            Command::Study {
                deck_id: DeckId::new(2),
                queue: Queue::Review,
                seed: Some(9),
            }
        );
    }

    #[test]
    fn cards_lists_everything_unless_a_queue_is_named() {
        assert_eq!(
            run(&["cards", "--deck-id", "4"]).unwrap().command,
            Command::Cards {
                deck_id: DeckId::new(4),
                queue: None,
            }
        );
        assert_eq!(
            run(&["cards", "--queue", "review"]).unwrap().command,
            Command::Cards {
                deck_id: DeckId::new(1),
                queue: Some(Queue::Review),
            }
        );
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            run(&["study", "--queue", "later"]).unwrap_err(),
            ArgsError::InvalidQueue {
                raw: "later".into()
            }
        );
        assert_eq!(
            run(&["export", "--deck-id", "x"]).unwrap_err(),
            ArgsError::InvalidDeckId { raw: "x".into() }
        );
        assert_eq!(
            run(&["decks", "--deck-id"]).unwrap_err(),
            ArgsError::MissingValue { flag: "--deck-id" }
        );
        assert_eq!(
            run(&["grade"]).unwrap_err(),
            ArgsError::UnknownCommand("grade".into())
        );
        assert_eq!(
            run(&["decks", "extra"]).unwrap_err(),
            ArgsError::UnknownArg("extra".into())
        );
    }

    #[test]
    fn help_short_circuits() {
        let parsed = parse(["add-deck".to_owned(), "-h".to_owned()], &EnvDefaults::default());
        assert_eq!(parsed, Ok(Parsed::Help));
    }

    #[test]
    fn memory_and_absolute_urls_are_left_alone() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///var/db.sqlite3".into()),
            "sqlite:///var/db.sqlite3"
        );
        assert!(normalize_sqlite_url("sqlite:dev.sqlite3".into()).starts_with("sqlite:///"));
    }
}
