// Public modules
pub mod animator;
pub mod auth;
pub mod chat;
pub mod error;
pub mod message;
pub mod provider;
pub mod provider_logger;
pub mod render;
pub mod scheduler;
pub mod store;
pub mod theme;
pub mod utils;

mod observability;

// Re-exports
pub use animator::{DEFAULT_REVEAL_PERIOD, ResponseAnimator, RunHandle, tokenize};
pub use auth::{AlwaysSignedIn, AuthGate, StoredIdentity};
pub use error::{Error, Result};
pub use message::{Message, MessageId, Sender};
pub use observability::register_biometrics;
pub use provider::{CompletionProvider, OpenRouter};
pub use provider_logger::ProviderLogger;
pub use render::{PlainTextRenderer, Renderer, RevealPrinter};
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, Tick, TokioScheduler};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use theme::{Theme, ThemePreference};
