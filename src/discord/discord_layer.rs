// Discord layer - commands and session report delivery.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "sessions/report_dispatcher.rs"]
pub mod sessions;

// Re-export command types for convenience
pub use commands::profile::{Context, Data, Error};
