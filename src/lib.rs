// Domain layer
pub mod error;
pub mod models;
pub mod habit_service;

// Infrastructure
pub mod config;
pub mod database;

// Conversational front-end
pub mod dialogue;
pub mod dialogue_state;
pub mod keyboards;
pub mod transport;
pub mod telegram;

// Background jobs
pub mod notifications;

// REST surface
pub mod api;

pub use config::Config;
pub use database::Database;
pub use dialogue::DialogueEngine;
pub use dialogue_state::{DialogueMode, DialogueStateStore, InMemoryDialogueStore};
pub use error::{HabitError, HabitResult};
pub use habit_service::{HabitRules, HabitService, RolloverPolicy};
pub use notifications::{DailyTime, NotificationScheduler};
pub use transport::BotTransport;
