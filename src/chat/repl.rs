//! The send-and-follow cycle behind the interactive prompt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::message::{MessageId, Sender};
use crate::render::{Renderer, RevealPrinter};

use super::session::{ChatSession, SendOutcome};

/// How often a running reveal checks for Ctrl+C between updates.
pub const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Sends `line` and paints whatever comes back.
///
/// `interrupted` is raised by the Ctrl+C handler.  Raising it while a reply
/// is being revealed skips to the full text; raising it while the provider
/// is still working does nothing.
pub async fn converse(
    session: &ChatSession,
    renderer: &mut dyn Renderer,
    interrupted: &AtomicBool,
    line: &str,
) {
    renderer.set_typing(true);
    let outcome = session.send(line).await;
    renderer.set_typing(false);
    interrupted.store(false, Ordering::Relaxed);
    match outcome {
        SendOutcome::Empty | SendOutcome::Superseded => {}
        SendOutcome::SignInRequired => renderer.print_sign_in_prompt(),
        SendOutcome::Busy => renderer.print_info("Still answering the previous message."),
        SendOutcome::Failed { message_id, error } => {
            if let Some(message) = session.message(message_id) {
                renderer.start_message(Sender::Assistant, message.created_at);
                renderer.print_text(&message.text);
                renderer.finish_message();
            }
            renderer.print_error(&error.to_string());
        }
        SendOutcome::Revealing { message_id } => {
            follow_reveal(session, renderer, interrupted, message_id).await;
        }
    }
}

/// Prints the reveal of `message_id` as it grows, until it completes, is
/// skipped or is reset away.
pub async fn follow_reveal(
    session: &ChatSession,
    renderer: &mut dyn Renderer,
    interrupted: &AtomicBool,
    message_id: MessageId,
) {
    let mut updates = session.subscribe();
    let mut printer = RevealPrinter::new(message_id);
    let Some(placeholder) = session.message(message_id) else {
        return;
    };
    renderer.start_message(Sender::Assistant, placeholder.created_at);
    loop {
        if interrupted.swap(false, Ordering::Relaxed) {
            session.skip_reveal();
        }
        let Some(message) = session.message(message_id) else {
            break;
        };
        printer.sync(renderer, &message.text);
        if session.active_message() != Some(message_id) {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(INTERRUPT_POLL) => {}
        }
    }
    if let Some(message) = session.message(message_id) {
        printer.sync(renderer, &message.text);
    }
    renderer.finish_message();
}
