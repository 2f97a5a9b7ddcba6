//! Telegram front end for the follow monitor.
//!
//! Wraps the Bot API ([`telegram`]), parses and authorizes chat commands
//! ([`commands`]), routes them to the registry and the monitoring loop
//! ([`bot`]) and delivers alerts back to the chat ([`notifier`]).

pub mod bot;
pub mod commands;
pub mod notifier;
pub mod telegram;

pub use bot::CommandBot;
pub use notifier::TelegramNotifier;
pub use telegram::TelegramClient;
