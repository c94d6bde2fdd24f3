//! Output rendering for the chat surface.
//!
//! This module provides the [`Renderer`] trait and a plain-text
//! implementation that paints the message log to a terminal, optionally with
//! ANSI styling chosen from the active [`Theme`].

use std::io::{self, Stdout, Write};

use time::OffsetDateTime;

use crate::message::{MessageId, Sender};
use crate::theme::Theme;
use crate::utils::time::{format_relative, now};

/// ANSI escape code for dim text (used for the typing indicator).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for message headers).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code to return to column zero and erase the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

const ANSI_BLUE: &str = "\x1b[34m";
const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_BRIGHT_GREEN: &str = "\x1b[92m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_BRIGHT_RED: &str = "\x1b[91m";

/// Text shown while the provider is working.
pub const TYPING_INDICATOR: &str = "Generating response...";

/// Colors for one theme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Palette {
    user: &'static str,
    assistant: &'static str,
    error: &'static str,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Palette {
                user: ANSI_BLUE,
                assistant: ANSI_GREEN,
                error: ANSI_RED,
            },
            Theme::Dark => Palette {
                user: ANSI_CYAN,
                assistant: ANSI_BRIGHT_GREEN,
                error: ANSI_BRIGHT_RED,
            },
        }
    }
}

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Called before the text of a new message that entered the log at
    /// `created_at`.
    fn start_message(&mut self, sender: Sender, created_at: OffsetDateTime);

    /// Print a chunk of message text.
    ///
    /// During a reveal this is called with each newly revealed suffix.
    fn print_text(&mut self, text: &str);

    /// Called when a message is complete.
    fn finish_message(&mut self);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Show or hide the typing indicator.
    fn set_typing(&mut self, typing: bool);

    /// Switch the palette.
    fn set_theme(&mut self, theme: Theme) {
        _ = theme;
    }

    /// Ask the user to sign in.
    fn print_sign_in_prompt(&mut self) {
        self.print_info("Please sign in with /login <name> to send messages.");
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Output goes to stdout unless another writer is supplied.  Errors go to
/// the same writer so the transcript stays in order.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    palette: Palette,
    typing: bool,
    line_start: bool,
    clock: fn() -> OffsetDateTime,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            palette: Palette::for_theme(Theme::Light),
            typing: false,
            line_start: true,
            clock: now,
        }
    }

    /// Sets the initial theme.
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.palette = Palette::for_theme(theme);
        self
    }

    /// Measures message ages against `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Consumes the renderer, returning its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        if let Some(last) = text.chars().last() {
            self.line_start = last == '\n';
        }
    }

    fn styled(&mut self, style: &str, text: &str) {
        if self.use_color {
            self.write(style);
            self.write(text);
            self.write(ANSI_RESET);
        } else {
            self.write(text);
        }
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn clear_typing(&mut self) {
        if !self.typing {
            return;
        }
        self.typing = false;
        if self.use_color {
            self.write(ANSI_CLEAR_LINE);
            self.line_start = true;
        }
    }

    fn ensure_line_start(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_message(&mut self, sender: Sender, created_at: OffsetDateTime) {
        self.clear_typing();
        self.ensure_line_start();
        let color = match sender {
            Sender::User => self.palette.user,
            Sender::Assistant => self.palette.assistant,
        };
        let age = format!(" ({})", format_relative(created_at, (self.clock)()));
        if self.use_color {
            let style = format!("{ANSI_BOLD}{color}");
            self.styled(&style, &sender.to_string());
            self.styled(ANSI_DIM, &age);
        } else {
            self.write(&sender.to_string());
            self.write(&age);
        }
        self.write(": ");
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        self.write(text);
        self.flush();
    }

    fn finish_message(&mut self) {
        self.ensure_line_start();
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.clear_typing();
        self.ensure_line_start();
        let error_color = self.palette.error;
        self.styled(error_color, &format!("Error: {error}"));
        self.write("\n");
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        self.clear_typing();
        self.ensure_line_start();
        self.write(info);
        self.write("\n");
        self.flush();
    }

    fn set_typing(&mut self, typing: bool) {
        if typing == self.typing {
            return;
        }
        if !typing {
            self.clear_typing();
            self.flush();
            return;
        }
        self.ensure_line_start();
        if self.use_color {
            self.styled(ANSI_DIM, TYPING_INDICATOR);
        } else {
            self.write(TYPING_INDICATOR);
            self.write("\n");
        }
        self.typing = true;
        self.flush();
    }

    fn set_theme(&mut self, theme: Theme) {
        self.palette = Palette::for_theme(theme);
    }
}

/// Tracks how much of one message has been printed.
///
/// Revealed text only grows, so each sync prints the new suffix.  If the text
/// stops extending what was printed (a reveal skipped to a different text),
/// the rest of the message is printed on a fresh line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealPrinter {
    message_id: MessageId,
    printed: String,
}

impl RevealPrinter {
    /// Starts tracking `message_id` with nothing printed.
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            printed: String::new(),
        }
    }

    /// The message being tracked.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Prints whatever part of `text` has not been printed yet.
    pub fn sync(&mut self, renderer: &mut dyn Renderer, text: &str) {
        if let Some(suffix) = text.strip_prefix(self.printed.as_str()) {
            if !suffix.is_empty() {
                renderer.print_text(suffix);
                self.printed.push_str(suffix);
            }
        } else {
            renderer.finish_message();
            renderer.print_text(text);
            self.printed = text.to_string();
        }
    }
}
