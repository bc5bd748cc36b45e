mod card;
mod deck;
mod ids;

pub use ids::{CardId, DeckId, ParseIdError};

pub use card::{Card, CardDraft, CardError, Schedule, Stage, ValidatedCard};
pub use deck::{Deck, DeckError};
