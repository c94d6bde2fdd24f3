//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::animator::DEFAULT_REVEAL_PERIOD;
use crate::chat::session::GeneratingPolicy;
use crate::provider::{DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};

/// Command-line arguments for the trickle-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: deepseek/deepseek-r1:free)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Milliseconds between revealed chunks.
    #[arrrg(optional, "Milliseconds between revealed words (default: 20)", "MILLIS")]
    pub reveal_ms: Option<u64>,

    /// Where preferences and the sent-message mirror are stored.
    #[arrrg(optional, "JSON file for preferences (default: in memory)", "PATH")]
    pub store: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Require /login before sending.
    #[arrrg(flag, "Require /login <name> before messages are sent")]
    pub require_sign_in: bool,

    /// Keep the typing indicator up until the reveal finishes.
    #[arrrg(flag, "Show the typing indicator until the reply is fully revealed")]
    pub clear_on_revealed: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// The model to request replies from.
    pub model: String,

    /// Optional system prompt to set conversation context.
    pub system_prompt: Option<String>,

    /// Time between revealed chunks.
    pub reveal_period: Duration,

    /// JSON file backing the key-value store, or `None` for memory.
    pub store_path: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether sends need a signed-in user.
    pub require_sign_in: bool,

    /// When the generating flag clears.
    pub generating_policy: GeneratingPolicy,

    /// Value of the `HTTP-Referer` attribution header.
    pub site_url: Option<String>,

    /// Value of the `X-Title` attribution header.
    pub site_name: Option<String>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: deepseek/deepseek-r1:free
    /// - System prompt: the built-in financial-advice persona
    /// - Reveal period: 20ms
    /// - Store: in memory
    /// - Color: enabled
    /// - Sign-in: not required
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            reveal_period: DEFAULT_REVEAL_PERIOD,
            store_path: None,
            use_color: true,
            require_sign_in: false,
            generating_policy: GeneratingPolicy::ClearOnPlaceholder,
            site_url: None,
            site_name: None,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Sets the time between revealed chunks.
    pub fn with_reveal_period(mut self, period: Duration) -> Self {
        self.reveal_period = period;
        self
    }

    /// Persists the store at `path`.
    pub fn with_store_path(mut self, path: Option<PathBuf>) -> Self {
        self.store_path = path;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets whether sends require a signed-in user.
    pub fn with_sign_in(mut self, required: bool) -> Self {
        self.require_sign_in = required;
        self
    }

    /// Sets when the generating flag clears.
    pub fn with_generating_policy(mut self, policy: GeneratingPolicy) -> Self {
        self.generating_policy = policy;
        self
    }

    /// Sets the attribution headers.
    pub fn with_site(mut self, site_url: Option<String>, site_name: Option<String>) -> Self {
        self.site_url = site_url;
        self.site_name = site_name;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        let generating_policy = if args.clear_on_revealed {
            GeneratingPolicy::ClearOnRevealed
        } else {
            GeneratingPolicy::ClearOnPlaceholder
        };

        ChatConfig {
            model: args.model.unwrap_or(defaults.model),
            system_prompt: args.system.or(defaults.system_prompt),
            reveal_period: args
                .reveal_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reveal_period),
            store_path: args.store.map(PathBuf::from),
            use_color: !args.no_color,
            require_sign_in: args.require_sign_in,
            generating_policy,
            site_url: None,
            site_name: None,
        }
    }
}
