// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod health;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod risk;
pub mod scheduler;
pub mod strategy;

// Re-export commonly used types
pub use api::TradingVenue;
pub use engine::Engine;
pub use error::BotError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
