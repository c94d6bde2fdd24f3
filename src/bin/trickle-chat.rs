//! Interactive chat that reveals replies word by word.
//!
//! This binary provides a REPL on top of [`trickle::chat::ChatSession`],
//! sending each line to OpenRouter and painting the reply as it is revealed.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! OPENROUTER_API_KEY=sk-or-... trickle-chat
//!
//! # Specify a model and slow the reveal down
//! trickle-chat --model openai/gpt-4o-mini --reveal-ms 60
//!
//! # Keep the theme and sign-in across runs
//! trickle-chat --store ~/.trickle.json --require-sign-in
//!
//! # Disable colors (useful for piping output)
//! trickle-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/theme [light|dark]` - Switch themes
//! - `/login <name>` / `/logout` - Sign in or out
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application
//!
//! Ctrl+C while a reply is being revealed shows the rest of it at once.

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use trickle::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, converse, help_text, parse_command,
};
use trickle::{
    AuthGate, FileStore, KeyValueStore, MemoryStore, OpenRouter, PlainTextRenderer, Renderer,
    ResponseAnimator, StoredIdentity, Theme, ThemePreference, TokioScheduler,
};

/// Main entry point for the trickle-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("trickle-chat [OPTIONS]");
    let config = ChatConfig::from(args).with_site(
        env::var("OPENROUTER_SITE_URL").ok(),
        env::var("OPENROUTER_SITE_NAME").ok(),
    );

    let store: Arc<dyn KeyValueStore> = match &config.store_path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let provider = OpenRouter::new(None)?
        .with_model(config.model.clone())
        .with_system_prompt(config.system_prompt.clone())
        .with_site(config.site_url.clone(), config.site_name.clone());
    let animator = ResponseAnimator::new(Arc::new(TokioScheduler::current()?))
        .with_period(config.reveal_period);
    let identity = Arc::new(StoredIdentity::new(Arc::clone(&store)));
    let mut session = ChatSession::new(Arc::new(provider), animator, Arc::clone(&store))
        .with_policy(config.generating_policy);
    if config.require_sign_in {
        session = session.with_auth(identity.clone());
    }

    let fallback = env::var("COLORFGBG")
        .ok()
        .and_then(|value| Theme::from_colorfgbg(&value))
        .unwrap_or(Theme::Dark);
    let mut theme = ThemePreference::load(Arc::clone(&store), fallback);
    let mut renderer = PlainTextRenderer::with_color(config.use_color).with_theme(theme.current());
    let mut rl = DefaultEditor::new()?;

    // Flag for interrupt handling during reveals
    let interrupted = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("Trickle Chat (model: {})", config.model);
    println!("Type /help for commands, /quit to exit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.reset();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Theme(choice) => {
                            let result = match choice {
                                Some(next) => theme.set(next).map(|()| next),
                                None => theme.toggle(),
                            };
                            match result {
                                Ok(next) => {
                                    renderer.set_theme(next);
                                    renderer.print_info(&format!("Theme set to {next}."));
                                }
                                Err(err) => renderer
                                    .print_error(&format!("Failed to save theme: {}", err)),
                            }
                        }
                        ChatCommand::Login(name) => match identity.sign_in(&name) {
                            Ok(()) => renderer.print_info(&format!("Signed in as {}.", name.trim())),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Logout => match identity.sign_out() {
                            Ok(()) => renderer.print_info("Signed out."),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Stats => {
                            print_stats(&session, &identity, theme.current());
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                converse(&session, &mut renderer, &interrupted, line).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    if let Err(err) = session.teardown() {
        renderer.print_error(&format!("Failed to clear sent messages: {}", err));
    }
    Ok(())
}

fn print_stats(session: &ChatSession, identity: &StoredIdentity, theme: Theme) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Messages: {}", stats.message_count);
    println!(
        "      From you / assistant: {} / {}",
        stats.user_messages, stats.assistant_messages
    );
    println!("      Sends: {} ({} failed)", stats.sends, stats.failures);
    if stats.mirror_failures > 0 {
        println!("      Unsaved sends: {}", stats.mirror_failures);
    }
    println!("      Phase: {}", stats.phase);
    println!("      Theme: {}", theme);
    match identity.user() {
        Some(user) if identity.is_authenticated() => println!("      Signed in as: {}", user),
        _ => println!("      Signed in as: (nobody)"),
    }
}
