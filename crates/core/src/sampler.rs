//! Distractor sampling for multiple-choice prompts.

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Serialize;

use crate::model::{Card, CardId};

/// Combined choices (due card included) needed before multiple choice is offered.
pub const MIN_MULTIPLE_CHOICE: usize = 4;

/// How many distractors to draw when `other_card_count` cards besides the due one
/// are in the deck.
#[must_use]
pub fn sample_size(other_card_count: usize) -> usize {
    match other_card_count {
        0..=2 => 0,
        3..=4 => 3,
        _ => 5,
    }
}

/// Draw distractors uniformly without replacement, never returning `exclude`.
///
/// Sizing counts the deck without the excluded card's own slot, so the result always
/// holds 0, 3 or 5 cards.
pub fn sample_distractors<'a, R>(
    deck_cards: &'a [Card],
    exclude: CardId,
    rng: &mut R,
) -> Vec<&'a Card>
where
    R: Rng + ?Sized,
{
    let eligible: Vec<&Card> = deck_cards.iter().filter(|c| c.id() != exclude).collect();
    let wanted = sample_size(eligible.len());
    eligible.choose_multiple(rng, wanted).copied().collect()
}

/// The shuffled set of cards offered as answers for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultipleChoice {
    pub choices: Vec<Card>,
    /// False when there are too few choices and the prompt should ask for a typed answer.
    pub enough_choices: bool,
}

impl MultipleChoice {
    /// Append the due card to its distractors and shuffle.
    pub fn assemble<R>(due: &Card, distractors: Vec<&Card>, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut choices: Vec<Card> = distractors.into_iter().cloned().collect();
        choices.push(due.clone());
        choices.shuffle(rng);
        let enough_choices = choices.len() >= MIN_MULTIPLE_CHOICE;
        Self {
            choices,
            enough_choices,
        }
    }
}
