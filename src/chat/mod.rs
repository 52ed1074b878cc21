//! Chat application module for interactive conversations about Montreal.
//!
//! This module provides the chat session built on top of the fetcher,
//! prompt composer, inference client and session logger. It supports:
//!
//! - Answers grounded in the latest MTL Blog articles of a category
//! - Slash commands for session control
//! - Feedback on answers, appended to the CSV log
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The per-message state machine
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{
    ChatSession, ChatState, EMPTY_RESPONSE, FAILURE_MESSAGE, FAREWELL, FOLLOW_UP, GREETING,
    SessionStats, TurnOutcome,
};
