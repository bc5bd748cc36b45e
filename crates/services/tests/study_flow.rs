use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::TimeDelta;
use linguatron_core::model::{Card, CardId, DeckId, Schedule, Stage, ValidatedCard};
use linguatron_core::scheduler::{Grade, TransitionRule};
use linguatron_core::time::fixed_now;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use services::{CardService, Clock, DeckService, NextCard, Queue, StudyError, StudyService};
use storage::repository::{CardFilter, CardRepository, InMemoryRepository, Storage, StorageError};

fn present(next: NextCard) -> services::Presentation {
    match next {
        NextCard::Present(p) => p,
        NextCard::Empty => panic!("expected a card to present"),
    }
}

#[tokio::test]
async fn card_moves_from_learning_to_review_over_sqlite() {
    let storage = Storage::sqlite("sqlite:file:memdb_study_flow?mode=memory&cache=shared")
        .await
        .expect("connect sqlite");
    let start = fixed_now();
    let decks = DeckService::new(Clock::fixed(start), Arc::clone(&storage.decks));
    let cards = CardService::new(Clock::fixed(start), Arc::clone(&storage.cards));

    let deck_id = decks.create_deck("Japanese").await.unwrap();
    let water = cards.add_card(deck_id, "水", "water").await.unwrap();
    cards.add_card(deck_id, "火", "fire").await.unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let study = StudyService::new(Clock::fixed(start), Arc::clone(&storage.cards));

    let first = present(study.next_card(deck_id, Queue::Learning, &mut rng).await.unwrap());
    assert_eq!(first.card.id(), water.id());
    assert!(!first.multiple_choice.enough_choices);

    let step = study.answer_typed(water.id(), "Water").await.unwrap();
    assert_eq!(step.rule, TransitionRule::LearningStep);
    assert_eq!(step.card.review_due_at(), start + TimeDelta::minutes(1));

    // The other card is now the most overdue learning card.
    let second = present(study.next_card(deck_id, Queue::Learning, &mut rng).await.unwrap());
    assert_ne!(second.card.id(), water.id());

    let later = study
        .clone()
        .with_clock(Clock::fixed(start + TimeDelta::minutes(2)));
    let grad = later.answer(water.id(), Grade::Correct).await.unwrap();
    assert_eq!(grad.rule, TransitionRule::Graduate);
    assert_eq!(grad.card.stage(), Stage::Review);

    assert_eq!(
        later.next_card(deck_id, Queue::Review, &mut rng).await.unwrap(),
        NextCard::Empty
    );

    let tomorrow = study
        .clone()
        .with_clock(Clock::fixed(grad.card.review_due_at()));
    let due = present(tomorrow.next_card(deck_id, Queue::Review, &mut rng).await.unwrap());
    assert_eq!(due.card, grad.card);

    let stats = cards.deck_stats(deck_id).await.unwrap();
    assert_eq!((stats.total, stats.learning, stats.review), (2, 1, 1));
}

#[tokio::test]
async fn empty_deck_has_nothing_to_present() {
    let storage = Storage::in_memory();
    let deck_id = DeckService::new(Clock::fixed(fixed_now()), Arc::clone(&storage.decks))
        .create_deck("Empty")
        .await
        .unwrap();
    let study = StudyService::new(Clock::fixed(fixed_now()), Arc::clone(&storage.cards));
    let mut rng = StdRng::seed_from_u64(0);

    for queue in [Queue::Learning, Queue::Review] {
        assert_eq!(
            study.next_card(deck_id, queue, &mut rng).await.unwrap(),
            NextCard::Empty
        );
    }
}

#[tokio::test]
async fn single_card_deck_falls_back_to_typed_answer() {
    let storage = Storage::in_memory();
    let clock = Clock::fixed(fixed_now());
    let deck_id = DeckService::new(clock, Arc::clone(&storage.decks))
        .create_deck("Solo")
        .await
        .unwrap();
    let card = CardService::new(clock, Arc::clone(&storage.cards))
        .add_card(deck_id, "木", "tree")
        .await
        .unwrap();

    let study = StudyService::new(clock, Arc::clone(&storage.cards));
    let mut rng = StdRng::seed_from_u64(5);
    let presentation = present(study.next_card(deck_id, Queue::Learning, &mut rng).await.unwrap());

    assert_eq!(presentation.multiple_choice.choices, vec![card]);
    assert!(!presentation.multiple_choice.enough_choices);
}

/// Serves a fixed, possibly outdated, copy of one card on reads.
struct StaleReads {
    inner: InMemoryRepository,
    stale: Card,
}

#[async_trait]
impl CardRepository for StaleReads {
    async fn insert_new_card(&self, card: ValidatedCard) -> Result<Card, StorageError> {
        self.inner.insert_new_card(card).await
    }

    async fn get_card(&self, _id: CardId) -> Result<Card, StorageError> {
        Ok(self.stale.clone())
    }

    async fn cards_for_deck(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, StorageError> {
        self.inner.cards_for_deck(deck_id, filter).await
    }

    async fn count_cards(&self, deck_id: DeckId) -> Result<usize, StorageError> {
        self.inner.count_cards(deck_id).await
    }

    async fn save_card(&self, card: &Card, expected: &Schedule) -> Result<(), StorageError> {
        self.inner.save_card(card, expected).await
    }
}

#[tokio::test]
async fn concurrent_answer_is_reported_as_conflict() {
    let repo = InMemoryRepository::new();
    let storage = Storage {
        decks: Arc::new(repo.clone()),
        cards: Arc::new(repo.clone()),
    };
    let clock = Clock::fixed(fixed_now());
    let deck_id = DeckService::new(clock, Arc::clone(&storage.decks))
        .create_deck("Race")
        .await
        .unwrap();
    let card = CardService::new(clock, Arc::clone(&storage.cards))
        .add_card(deck_id, "山", "mountain")
        .await
        .unwrap();

    let winner = StudyService::new(clock, Arc::clone(&storage.cards));
    let loser = StudyService::new(
        clock,
        Arc::new(StaleReads {
            inner: repo.clone(),
            stale: card.clone(),
        }),
    );

    winner.answer(card.id(), Grade::Correct).await.unwrap();
    let err = loser.answer(card.id(), Grade::Incorrect).await.unwrap_err();
    assert!(err.is_conflict());

    let stored = repo.get_card(card.id()).await.unwrap();
    assert_eq!(stored.ease(), 2);
    assert_eq!(stored.schedule().incorrect(), 0);
}

/// Counts save attempts and fails every one of them.
struct FailingSaves {
    inner: InMemoryRepository,
    attempts: AtomicUsize,
}

#[async_trait]
impl CardRepository for FailingSaves {
    async fn insert_new_card(&self, card: ValidatedCard) -> Result<Card, StorageError> {
        self.inner.insert_new_card(card).await
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        self.inner.get_card(id).await
    }

    async fn cards_for_deck(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, StorageError> {
        self.inner.cards_for_deck(deck_id, filter).await
    }

    async fn count_cards(&self, deck_id: DeckId) -> Result<usize, StorageError> {
        self.inner.count_cards(deck_id).await
    }

    async fn save_card(&self, _card: &Card, _expected: &Schedule) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Connection("database is locked".into()))
    }
}

#[tokio::test]
async fn storage_failure_propagates_without_retry() {
    let repo = InMemoryRepository::new();
    let clock = Clock::fixed(fixed_now());
    let deck_id = DeckService::new(clock, Arc::new(repo.clone()))
        .create_deck("Flaky")
        .await
        .unwrap();
    let card = CardService::new(clock, Arc::new(repo.clone()))
        .add_card(deck_id, "川", "river")
        .await
        .unwrap();

    let failing = Arc::new(FailingSaves {
        inner: repo.clone(),
        attempts: AtomicUsize::new(0),
    });
    let study = StudyService::new(clock, Arc::clone(&failing) as Arc<dyn CardRepository>);

    let err = study.answer(card.id(), Grade::Correct).await.unwrap_err();
    assert!(matches!(
        err,
        StudyError::Storage(StorageError::Connection(_))
    ));
    assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(repo.get_card(card.id()).await.unwrap(), card);
}

/// Counts full-deck loads and deck size lookups.
struct CountedReads {
    inner: InMemoryRepository,
    full_loads: AtomicUsize,
    counts: AtomicUsize,
}

#[async_trait]
impl CardRepository for CountedReads {
    async fn insert_new_card(&self, card: ValidatedCard) -> Result<Card, StorageError> {
        self.inner.insert_new_card(card).await
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        self.inner.get_card(id).await
    }

    async fn cards_for_deck(
        &self,
        deck_id: DeckId,
        filter: CardFilter,
    ) -> Result<Vec<Card>, StorageError> {
        if filter == CardFilter::all() {
            self.full_loads.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.cards_for_deck(deck_id, filter).await
    }

    async fn count_cards(&self, deck_id: DeckId) -> Result<usize, StorageError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count_cards(deck_id).await
    }

    async fn save_card(&self, card: &Card, expected: &Schedule) -> Result<(), StorageError> {
        self.inner.save_card(card, expected).await
    }
}

#[tokio::test]
async fn deck_size_decides_whether_the_deck_is_loaded() {
    let clock = Clock::fixed(fixed_now());
    let mut rng = StdRng::seed_from_u64(8);

    for (size, loads, choices) in [(3_usize, 0_usize, 1_usize), (4, 1, 4)] {
        let repo = InMemoryRepository::new();
        let deck_id = DeckService::new(clock, Arc::new(repo.clone()))
            .create_deck("Counted")
            .await
            .unwrap();
        let adder = CardService::new(clock, Arc::new(repo.clone()));
        for i in 0..size {
            adder
                .add_card(deck_id, format!("q{i}"), format!("a{i}"))
                .await
                .unwrap();
        }

        let counted = Arc::new(CountedReads {
            inner: repo,
            full_loads: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
        });
        let study = StudyService::new(clock, Arc::clone(&counted) as Arc<dyn CardRepository>);
        let presentation =
            present(study.next_card(deck_id, Queue::Learning, &mut rng).await.unwrap());

        assert_eq!(counted.counts.load(Ordering::SeqCst), 1, "deck of {size}");
        assert_eq!(counted.full_loads.load(Ordering::SeqCst), loads, "deck of {size}");
        assert_eq!(presentation.multiple_choice.choices.len(), choices, "deck of {size}");
    }
}
