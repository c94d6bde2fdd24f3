//! Logging trait for completion-provider traffic.
//!
//! This module provides the [`ProviderLogger`] trait that allows users to
//! capture every prompt sent through the [`OpenRouter`](crate::OpenRouter)
//! client together with the reply or failure it produced.

use crate::error::Error;

/// A trait for logging completion requests.
///
/// # Example
///
/// ```rust,ignore
/// use std::io::Write;
/// use std::sync::Mutex;
/// use trickle::{Error, ProviderLogger};
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ProviderLogger for FileLogger {
///     fn log_request(&self, model: &str, prompt: &str, context: &[String]) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "-> {model} ({} prior): {prompt}", context.len()).unwrap();
///     }
///
///     fn log_reply(&self, reply: &str) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "<- {reply}").unwrap();
///     }
///
///     fn log_failure(&self, error: &Error) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "!! {error}").unwrap();
///     }
/// }
/// ```
pub trait ProviderLogger: Send + Sync {
    /// Called before a request is sent.
    fn log_request(&self, model: &str, prompt: &str, context: &[String]);

    /// Called with the reply text of a successful request.
    fn log_reply(&self, reply: &str);

    /// Called when a request fails for any reason.
    fn log_failure(&self, error: &Error);
}
