#![forbid(unsafe_code)]

pub mod app_services;
pub mod card_service;
pub mod deck_service;
pub mod error;
pub mod study_service;

pub use linguatron_core::Clock;

pub use app_services::AppServices;
pub use card_service::{CardService, DeckStats};
pub use deck_service::DeckService;
pub use error::{AppServicesError, CardServiceError, DeckServiceError, StudyError};
pub use study_service::{AnswerReceipt, NextCard, Presentation, Queue, StudyService};
