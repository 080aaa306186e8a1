pub mod calendar;
pub mod clock;
pub mod config;
pub mod config_store;
pub mod daemon;
pub mod dialogue;
pub mod error;
pub mod interfaces;
pub mod line;
pub mod poller;
pub mod providers;
pub mod scheduler;
pub mod store;

pub use crate::config::Config;
pub use crate::dialogue::{DialogueEngine, TextOutcome};
pub use crate::error::{ConciergeBotError, Result};
pub use crate::store::BotStore;
