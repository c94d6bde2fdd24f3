//! Chat application module for conversations that reveal replies word by word.
//!
//! This module provides the session state machine and the REPL plumbing
//! built on top of it. It supports:
//!
//! - Word-by-word reveal of each reply, skippable with Ctrl+C
//! - Optional sign-in gating of sends
//! - Light and dark themes persisted in a key-value store
//! - Slash commands for session control
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The message log, generation state and send cycle
//! - [`commands`]: Slash command parsing
//! - [`repl`]: Sending a line and following its reveal

mod commands;
mod config;
mod repl;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer, RevealPrinter};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use repl::{INTERRUPT_POLL, converse, follow_reveal};
pub use session::{
    ChatSession, FAILURE_REPLY, GeneratingPolicy, Phase, SENT_MESSAGES_KEY, SendOutcome,
    SessionStats,
};
