//! Core chat session management.
//!
//! [`ChatSession`] owns the message log and the generation state.  A send
//! appends the user's message, awaits the provider, appends an empty assistant
//! placeholder and hands the reply to the [`ResponseAnimator`], whose updates
//! are patched into the placeholder by id.
//!
//! The log and the generation state share one mutex.  That lock is never held
//! across an `.await` or while calling into the animator, because animator
//! callbacks take it from the scheduler's task.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::watch;

use crate::animator::{ResponseAnimator, RunHandle};
use crate::auth::{AlwaysSignedIn, AuthGate};
use crate::error::{Error, Result};
use crate::message::{Message, MessageId, Sender};
use crate::observability::{
    SESSION_BUSY_SENDS, SESSION_EMPTY_SENDS, SESSION_FAILURES, SESSION_MIRROR_FAILURES,
    SESSION_RESETS, SESSION_SENDS, SESSION_SIGN_IN_PROMPTS, SESSION_SUPERSEDED,
};
use crate::provider::CompletionProvider;
use crate::store::KeyValueStore;

/// Text of the assistant message appended when a send fails.
pub const FAILURE_REPLY: &str = "Sorry, something went wrong generating a response.";

/// Store key holding the JSON array of texts sent in this session.
pub const SENT_MESSAGES_KEY: &str = "sent_messages";

/// Where the session is in its send cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Ready to accept a send.
    #[default]
    Idle,
    /// A user message was appended and the provider has not answered yet.
    AwaitingProvider,
    /// The reply is being revealed into the placeholder message.
    Animating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::AwaitingProvider => write!(f, "awaiting provider"),
            Phase::Animating => write!(f, "animating"),
        }
    }
}

/// When the `is_generating` flag drops back to false on a successful send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GeneratingPolicy {
    /// As soon as the placeholder message exists.
    #[default]
    ClearOnPlaceholder,
    /// Only after the whole reply has been revealed.
    ClearOnRevealed,
}

/// Result of a call to [`ChatSession::send`].
#[derive(Clone, Debug)]
pub enum SendOutcome {
    /// The trimmed input was empty; nothing changed.
    Empty,
    /// The auth gate refused the send and was asked to prompt for sign-in.
    SignInRequired,
    /// Another send is still in flight; the input was ignored.
    Busy,
    /// The reply is being revealed into `message_id`.
    Revealing {
        /// The assistant placeholder receiving the reply.
        message_id: MessageId,
    },
    /// The provider failed and `message_id` holds the fixed apology.
    Failed {
        /// The assistant message holding [`FAILURE_REPLY`].
        message_id: MessageId,
        /// What went wrong, for logging.
        error: Error,
    },
    /// The session was reset while the provider call was pending.
    Superseded,
}

impl SendOutcome {
    /// True if the send produced an assistant reply that is being revealed.
    pub fn is_revealing(&self) -> bool {
        matches!(self, SendOutcome::Revealing { .. })
    }
}

/// Snapshot of session counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStats {
    /// The number of messages in the log.
    pub message_count: usize,
    /// Messages written by the user.
    pub user_messages: usize,
    /// Messages written by the assistant, apologies included.
    pub assistant_messages: usize,
    /// Sends that reached the provider.
    pub sends: u64,
    /// Sends that ended in the fixed apology.
    pub failures: u64,
    /// Sends whose texts could not be mirrored to the store.
    pub mirror_failures: u64,
    /// The current phase.
    pub phase: Phase,
    /// The current value of the generating flag.
    pub is_generating: bool,
}

struct ActiveReveal {
    message_id: MessageId,
    full_text: String,
    run: Option<RunHandle>,
}

#[derive(Default)]
struct State {
    log: Vec<Message>,
    phase: Phase,
    is_generating: bool,
    active: Option<ActiveReveal>,
    next_id: u64,
    // Bumped by reset so replies to abandoned sends are dropped.
    epoch: u64,
    sends: u64,
    failures: u64,
    mirror_failures: u64,
}

impl State {
    fn append(&mut self, sender: Sender, text: impl Into<String>) -> MessageId {
        self.next_id += 1;
        let id = MessageId::new(self.next_id);
        self.log.push(Message::new(id, sender, text));
        id
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.log.iter_mut().rev().find(|m| m.id == id)
    }

    fn user_texts(&self) -> Vec<String> {
        self.log
            .iter()
            .filter(|m| m.is_user())
            .map(|m| m.text.clone())
            .collect()
    }

    fn is_revealing(&self, id: MessageId) -> bool {
        self.active.as_ref().is_some_and(|a| a.message_id == id)
    }

    fn finish_reveal(&mut self) -> Option<ActiveReveal> {
        let active = self.active.take();
        self.phase = Phase::Idle;
        self.is_generating = false;
        active
    }
}

struct Shared {
    state: Mutex<State>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn patch(&self, id: MessageId, partial: &str) {
        {
            let mut state = self.lock();
            if !state.is_revealing(id) {
                return;
            }
            if let Some(message) = state.message_mut(id) {
                message.text.clear();
                message.text.push_str(partial);
            }
        }
        self.bump();
    }

    fn complete(&self, id: MessageId) {
        {
            let mut state = self.lock();
            if !state.is_revealing(id) {
                return;
            }
            state.finish_reveal();
        }
        self.bump();
    }
}

/// A chat session that manages the message log and generation state.
pub struct ChatSession {
    provider: Arc<dyn CompletionProvider>,
    animator: ResponseAnimator,
    store: Arc<dyn KeyValueStore>,
    auth: Arc<dyn AuthGate>,
    policy: GeneratingPolicy,
    shared: Arc<Shared>,
}

impl ChatSession {
    /// Creates an idle session with an empty log that never asks for sign-in.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        animator: ResponseAnimator,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            provider,
            animator,
            store,
            auth: Arc::new(AlwaysSignedIn),
            policy: GeneratingPolicy::default(),
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                revision,
            }),
        }
    }

    /// Gates sends behind `auth`.
    pub fn with_auth(mut self, auth: Arc<dyn AuthGate>) -> Self {
        self.auth = auth;
        self
    }

    /// Sets when `is_generating` clears on a successful send.
    pub fn with_policy(mut self, policy: GeneratingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The configured generating policy.
    pub fn policy(&self) -> GeneratingPolicy {
        self.policy
    }

    /// Sends `text` to the provider and starts revealing the reply.
    ///
    /// Returns once the reveal has been started (or the send failed); the
    /// reveal itself continues on the animator's scheduler.  Leading and
    /// trailing whitespace is trimmed before anything else happens.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            SESSION_EMPTY_SENDS.click();
            return SendOutcome::Empty;
        }
        if !self.auth.is_authenticated() {
            SESSION_SIGN_IN_PROMPTS.click();
            self.auth.prompt_sign_in();
            return SendOutcome::SignInRequired;
        }

        let (epoch, context, sent) = {
            let mut state = self.shared.lock();
            if state.phase != Phase::Idle {
                SESSION_BUSY_SENDS.click();
                return SendOutcome::Busy;
            }
            let context = state.user_texts();
            state.append(Sender::User, text);
            state.phase = Phase::AwaitingProvider;
            state.is_generating = true;
            state.sends += 1;
            (state.epoch, context, state.user_texts())
        };
        SESSION_SENDS.click();
        self.shared.bump();
        // Mirror failures never block a send.
        if self.mirror_sent(&sent).is_err() {
            SESSION_MIRROR_FAILURES.click();
            self.shared.lock().mirror_failures += 1;
        }

        let reply = match self.provider.complete(text, &context).await {
            Ok(reply) if reply.trim().is_empty() => Err(Error::EmptyResponse),
            other => other,
        };

        match reply {
            Ok(reply) => self.begin_reveal(epoch, reply),
            Err(error) => self.fail(epoch, error),
        }
    }

    fn begin_reveal(&self, epoch: u64, reply: String) -> SendOutcome {
        let message_id = {
            let mut state = self.shared.lock();
            if state.epoch != epoch {
                SESSION_SUPERSEDED.click();
                return SendOutcome::Superseded;
            }
            let message_id = state.append(Sender::Assistant, "");
            state.phase = Phase::Animating;
            state.is_generating = self.policy == GeneratingPolicy::ClearOnRevealed;
            state.active = Some(ActiveReveal {
                message_id,
                full_text: reply.clone(),
                run: None,
            });
            message_id
        };
        self.shared.bump();

        let on_update = {
            let shared = Arc::clone(&self.shared);
            move |partial: &str| shared.patch(message_id, partial)
        };
        let on_done = {
            let shared = Arc::clone(&self.shared);
            move || shared.complete(message_id)
        };
        let run = self.animator.start(reply, on_update, on_done);

        let orphaned = {
            let mut state = self.shared.lock();
            match state.active.as_mut() {
                Some(active) if active.message_id == message_id => {
                    active.run = Some(run);
                    None
                }
                // Skipped, reset or finished before the handle was recorded.
                _ => Some(run),
            }
        };
        if let Some(run) = orphaned {
            self.animator.cancel(&run);
        }
        SendOutcome::Revealing { message_id }
    }

    fn fail(&self, epoch: u64, error: Error) -> SendOutcome {
        let message_id = {
            let mut state = self.shared.lock();
            if state.epoch != epoch {
                SESSION_SUPERSEDED.click();
                return SendOutcome::Superseded;
            }
            let message_id = state.append(Sender::Assistant, FAILURE_REPLY);
            state.phase = Phase::Idle;
            state.is_generating = false;
            state.failures += 1;
            message_id
        };
        SESSION_FAILURES.click();
        self.shared.bump();
        SendOutcome::Failed { message_id, error }
    }

    /// Writes the full reply into the placeholder at once and returns to
    /// Idle.  Returns false if no reveal was running.
    pub fn skip_reveal(&self) -> bool {
        let active = {
            let mut state = self.shared.lock();
            if state.phase != Phase::Animating {
                return false;
            }
            let Some(active) = state.finish_reveal() else {
                return false;
            };
            if let Some(message) = state.message_mut(active.message_id) {
                message.text.clone_from(&active.full_text);
            }
            active
        };
        if let Some(run) = &active.run {
            self.animator.cancel(run);
        }
        self.shared.bump();
        true
    }

    /// Cancels any reveal, clears the log and returns to Idle.
    ///
    /// A provider call still in flight is superseded: its reply is dropped.
    pub fn reset(&self) {
        let active = {
            let mut state = self.shared.lock();
            state.epoch += 1;
            state.log.clear();
            state.finish_reveal()
        };
        if let Some(run) = active.and_then(|a| a.run) {
            self.animator.cancel(&run);
        }
        SESSION_RESETS.click();
        self.shared.bump();
    }

    /// Stops any reveal and forgets the mirror of sent texts.
    ///
    /// Call this when the view that owns the session goes away.  The log is
    /// left intact.
    pub fn teardown(&self) -> Result<()> {
        let active = {
            let mut state = self.shared.lock();
            if state.phase == Phase::Animating {
                state.finish_reveal()
            } else {
                None
            }
        };
        if let Some(run) = active.and_then(|a| a.run) {
            self.animator.cancel(&run);
            self.shared.bump();
        }
        self.store.remove(SENT_MESSAGES_KEY)
    }

    fn mirror_sent(&self, sent: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(sent)?;
        self.store.set(SENT_MESSAGES_KEY, &encoded)
    }

    /// A copy of the log in display order.
    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().log.clone()
    }

    /// The message with `id`, if it is still in the log.
    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.shared.lock().log.iter().find(|m| m.id == id).cloned()
    }

    /// Returns the number of messages in the log.
    pub fn message_count(&self) -> usize {
        self.shared.lock().log.len()
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// True while input should be disabled and the typing indicator shown.
    pub fn is_generating(&self) -> bool {
        self.shared.lock().is_generating
    }

    /// The placeholder currently receiving a reveal, if any.
    pub fn active_message(&self) -> Option<MessageId> {
        self.shared.lock().active.as_ref().map(|a| a.message_id)
    }

    /// A receiver whose value changes on every log or state mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Revisions as a stream.  Intermediate revisions may be coalesced.
    pub fn updates(&self) -> impl Stream<Item = u64> + Send + 'static {
        futures::stream::unfold(self.subscribe(), |mut rx| async move {
            rx.changed().await.ok()?;
            let revision = *rx.borrow_and_update();
            Some((revision, rx))
        })
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let state = self.shared.lock();
        let user_messages = state.log.iter().filter(|m| m.is_user()).count();
        SessionStats {
            message_count: state.log.len(),
            user_messages,
            assistant_messages: state.log.len() - user_messages,
            sends: state.sends,
            failures: state.failures,
            mirror_failures: state.mirror_failures,
            phase: state.phase,
            is_generating: state.is_generating,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::sync::Notify;

    use biometrics::Sensor;

    use super::*;
    use crate::auth::StoredIdentity;
    use crate::scheduler::ManualScheduler;
    use crate::store::MemoryStore;

    const PERIOD: Duration = Duration::from_millis(20);

    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedProvider {
        fn replying(replies: impl IntoIterator<Item = Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                ..Self::default()
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, prompt: &str, context: &[String]) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), context.to_vec()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::service_unavailable("script exhausted")))
        }
    }

    struct Fixture {
        session: Arc<ChatSession>,
        scheduler: ManualScheduler,
        provider: Arc<ScriptedProvider>,
        store: Arc<MemoryStore>,
    }

    fn fixture(provider: ScriptedProvider) -> Fixture {
        let scheduler = ManualScheduler::new();
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryStore::new());
        let animator =
            ResponseAnimator::new(Arc::new(scheduler.clone())).with_period(PERIOD);
        let session = ChatSession::new(provider.clone(), animator, store.clone());
        Fixture {
            session: Arc::new(session),
            scheduler,
            provider,
            store,
        }
    }

    fn texts(session: &ChatSession) -> Vec<(Sender, String)> {
        session
            .messages()
            .into_iter()
            .map(|m| (m.sender, m.text))
            .collect()
    }

    async fn wait_for(session: &ChatSession, phase: Phase) {
        for _ in 0..100 {
            if session.phase() == phase {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("session never reached {phase}");
    }

    #[tokio::test]
    async fn send_reveals_reply() {
        let fx = fixture(ScriptedProvider::replying([Ok("go get it".to_string())]));
        let outcome = fx.session.send("hi").await;
        let SendOutcome::Revealing { message_id } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(
            texts(&fx.session),
            vec![
                (Sender::User, "hi".to_string()),
                (Sender::Assistant, String::new()),
            ]
        );
        assert_eq!(fx.session.phase(), Phase::Animating);
        assert_eq!(fx.session.active_message(), Some(message_id));
        assert!(!fx.session.is_generating());

        fx.scheduler.advance(PERIOD);
        assert_eq!(fx.session.message(message_id).unwrap().text, "go");

        fx.scheduler.run_until_idle();
        assert_eq!(
            texts(&fx.session),
            vec![
                (Sender::User, "hi".to_string()),
                (Sender::Assistant, "go get it".to_string()),
            ]
        );
        assert_eq!(fx.session.phase(), Phase::Idle);
        assert!(!fx.session.is_generating());
        assert!(fx.session.active_message().is_none());
    }

    #[tokio::test]
    async fn clear_on_revealed_keeps_flag_until_done() {
        let scheduler = ManualScheduler::new();
        let animator = ResponseAnimator::new(Arc::new(scheduler.clone())).with_period(PERIOD);
        let session = ChatSession::new(
            Arc::new(ScriptedProvider::replying([Ok("a b".to_string())])),
            animator,
            Arc::new(MemoryStore::new()),
        )
        .with_policy(GeneratingPolicy::ClearOnRevealed);
        assert!(session.send("x").await.is_revealing());
        assert!(session.is_generating());
        scheduler.advance(PERIOD * 2);
        assert!(session.is_generating());
        scheduler.advance(PERIOD);
        assert!(!session.is_generating());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn provider_failure_appends_apology() {
        let fx = fixture(ScriptedProvider::replying([Err(Error::timeout("slow"))]));
        let outcome = fx.session.send("x").await;
        let SendOutcome::Failed { message_id, error } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(error.is_timeout());
        assert_eq!(
            texts(&fx.session),
            vec![
                (Sender::User, "x".to_string()),
                (Sender::Assistant, FAILURE_REPLY.to_string()),
            ]
        );
        assert_eq!(fx.session.message(message_id).unwrap().text, FAILURE_REPLY);
        assert!(!fx.session.is_generating());
        assert_eq!(fx.session.phase(), Phase::Idle);
        assert_eq!(fx.scheduler.pending(), 0);
        assert_eq!(fx.session.stats().failures, 1);
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let fx = fixture(ScriptedProvider::replying([Ok("   ".to_string())]));
        let outcome = fx.session.send("x").await;
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                error: Error::EmptyResponse,
                ..
            }
        ));
        assert_eq!(fx.session.messages()[1].text, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn blank_input_changes_nothing() {
        let fx = fixture(ScriptedProvider::default());
        let mut revisions = fx.session.subscribe();
        for input in ["", "   ", "\n\t"] {
            assert!(matches!(fx.session.send(input).await, SendOutcome::Empty));
        }
        assert!(fx.session.messages().is_empty());
        assert!(!fx.session.is_generating());
        assert!(fx.provider.calls().is_empty());
        assert!(!revisions.has_changed().unwrap());
    }

    #[tokio::test]
    async fn input_is_trimmed() {
        let fx = fixture(ScriptedProvider::replying([Ok("ok".to_string())]));
        fx.session.send("  hello there \n").await;
        assert_eq!(fx.session.messages()[0].text, "hello there");
        assert_eq!(fx.provider.calls()[0].0, "hello there");
    }

    #[tokio::test]
    async fn context_is_prior_user_messages() {
        let fx = fixture(ScriptedProvider::replying([
            Ok("one".to_string()),
            Err(Error::timeout("slow")),
            Ok("three".to_string()),
        ]));
        fx.session.send("a").await;
        fx.scheduler.run_until_idle();
        fx.session.send("b").await;
        fx.session.send("c").await;
        let calls = fx.provider.calls();
        assert_eq!(calls[0], ("a".to_string(), vec![]));
        assert_eq!(calls[1], ("b".to_string(), vec!["a".to_string()]));
        assert_eq!(
            calls[2],
            ("c".to_string(), vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn sends_while_animating_are_ignored() {
        let fx = fixture(ScriptedProvider::replying([
            Ok("first reply here".to_string()),
            Ok("second".to_string()),
        ]));
        let SendOutcome::Revealing { message_id } = fx.session.send("one").await else {
            panic!("expected a reveal");
        };
        fx.scheduler.advance(PERIOD);
        for _ in 0..3 {
            assert!(matches!(fx.session.send("two").await, SendOutcome::Busy));
            fx.scheduler.advance(PERIOD);
        }
        assert_eq!(fx.session.message_count(), 2);
        assert_eq!(fx.session.active_message(), Some(message_id));
        fx.scheduler.run_until_idle();
        assert_eq!(fx.session.messages()[1].text, "first reply here");
        assert_eq!(fx.provider.calls().len(), 1);

        assert!(fx.session.send("two").await.is_revealing());
        fx.scheduler.run_until_idle();
        let assistants: Vec<_> = fx
            .session
            .messages()
            .into_iter()
            .filter(|m| m.is_assistant())
            .map(|m| m.text)
            .collect();
        assert_eq!(assistants, vec!["first reply here", "second"]);
    }

    #[tokio::test]
    async fn sends_while_awaiting_are_ignored() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(
            ScriptedProvider::replying([Ok("done".to_string())]).gated(gate.clone()),
        );
        let session = fx.session.clone();
        let pending = tokio::spawn(async move { session.send("first").await });
        wait_for(&fx.session, Phase::AwaitingProvider).await;
        assert!(fx.session.is_generating());
        assert!(matches!(fx.session.send("second").await, SendOutcome::Busy));
        assert_eq!(fx.session.message_count(), 1);

        gate.notify_one();
        assert!(pending.await.unwrap().is_revealing());
        fx.scheduler.run_until_idle();
        assert_eq!(
            texts(&fx.session),
            vec![
                (Sender::User, "first".to_string()),
                (Sender::Assistant, "done".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn reset_supersedes_pending_reply() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(
            ScriptedProvider::replying([Ok("late".to_string())]).gated(gate.clone()),
        );
        let session = fx.session.clone();
        let pending = tokio::spawn(async move { session.send("hello").await });
        wait_for(&fx.session, Phase::AwaitingProvider).await;

        fx.session.reset();
        assert!(fx.session.messages().is_empty());
        assert!(!fx.session.is_generating());

        gate.notify_one();
        assert!(matches!(pending.await.unwrap(), SendOutcome::Superseded));
        assert!(fx.session.messages().is_empty());
        assert_eq!(fx.scheduler.pending(), 0);
        assert_eq!(fx.session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn reset_cancels_reveal() {
        let fx = fixture(ScriptedProvider::replying([Ok("a b c d".to_string())]));
        fx.session.send("x").await;
        fx.scheduler.advance(PERIOD);
        fx.session.reset();
        assert_eq!(fx.scheduler.pending(), 0);
        fx.scheduler.run_until_idle();
        assert!(fx.session.messages().is_empty());
        assert_eq!(fx.session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn skip_reveal_writes_full_text() {
        let fx = fixture(ScriptedProvider::replying([Ok("go get it".to_string())]));
        let SendOutcome::Revealing { message_id } = fx.session.send("hi").await else {
            panic!("expected a reveal");
        };
        fx.scheduler.advance(PERIOD);
        assert!(fx.session.skip_reveal());
        assert_eq!(fx.session.message(message_id).unwrap().text, "go get it");
        assert_eq!(fx.session.phase(), Phase::Idle);
        assert_eq!(fx.scheduler.run_until_idle(), 0);
        assert_eq!(fx.session.message(message_id).unwrap().text, "go get it");
        assert!(!fx.session.skip_reveal());
    }

    #[tokio::test]
    async fn later_reveal_never_sees_earlier_updates() {
        let fx = fixture(ScriptedProvider::replying([
            Ok("alpha beta gamma".to_string()),
            Ok("delta".to_string()),
        ]));
        let SendOutcome::Revealing { message_id: first } = fx.session.send("1").await else {
            panic!("expected a reveal");
        };
        fx.scheduler.advance(PERIOD);
        assert_eq!(fx.session.message(first).unwrap().text, "alpha");
        fx.session.skip_reveal();

        let SendOutcome::Revealing { message_id: second } = fx.session.send("2").await else {
            panic!("expected a reveal");
        };
        fx.scheduler.run_until_idle();
        assert_eq!(fx.session.message(first).unwrap().text, "alpha beta gamma");
        assert_eq!(fx.session.message(second).unwrap().text, "delta");
    }

    #[tokio::test]
    async fn unauthenticated_send_prompts() {
        let scheduler = ManualScheduler::new();
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(StoredIdentity::new(store.clone()));
        let provider = Arc::new(ScriptedProvider::replying([Ok("hey".to_string())]));
        let session = ChatSession::new(
            provider.clone(),
            ResponseAnimator::new(Arc::new(scheduler.clone())),
            store,
        )
        .with_auth(gate.clone());

        assert!(matches!(session.send("hi").await, SendOutcome::SignInRequired));
        assert!(gate.take_sign_in_prompt());
        assert!(session.messages().is_empty());
        assert!(provider.calls().is_empty());

        gate.sign_in("ada").unwrap();
        assert!(session.send("hi").await.is_revealing());
        assert!(!gate.take_sign_in_prompt());
    }

    #[tokio::test]
    async fn sent_texts_are_mirrored_until_teardown() {
        let fx = fixture(ScriptedProvider::replying([
            Ok("a".to_string()),
            Ok("b".to_string()),
        ]));
        fx.session.send("first").await;
        fx.scheduler.run_until_idle();
        fx.session.send("second").await;
        let mirrored: Vec<String> =
            serde_json::from_str(&fx.store.get(SENT_MESSAGES_KEY).unwrap()).unwrap();
        assert_eq!(mirrored, vec!["first", "second"]);

        fx.session.teardown().unwrap();
        assert!(fx.store.get(SENT_MESSAGES_KEY).is_none());
        assert_eq!(fx.scheduler.pending(), 0);
        assert_eq!(fx.session.phase(), Phase::Idle);
        assert_eq!(fx.session.message_count(), 4);
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _: &str) -> Option<String> {
            None
        }

        fn set(&self, key: &str, _: &str) -> Result<()> {
            Err(Error::validation(format!("{key} is read-only"), None))
        }

        fn remove(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn mirror_failure_is_counted_and_send_proceeds() {
        let scheduler = ManualScheduler::new();
        let animator = ResponseAnimator::new(Arc::new(scheduler.clone())).with_period(PERIOD);
        let session = ChatSession::new(
            Arc::new(ScriptedProvider::replying([Ok("still here".to_string())])),
            animator,
            Arc::new(ReadOnlyStore),
        );
        let before = SESSION_MIRROR_FAILURES.read();
        assert!(session.send("hi").await.is_revealing());
        scheduler.run_until_idle();
        assert_eq!(session.messages()[1].text, "still here");
        assert_eq!(session.stats().mirror_failures, 1);
        assert!(SESSION_MIRROR_FAILURES.read() > before);
    }

    #[tokio::test]
    async fn updates_stream_follows_mutations() {
        let fx = fixture(ScriptedProvider::replying([Ok("x y".to_string())]));
        let mut updates = Box::pin(fx.session.updates());
        fx.session.send("hi").await;
        let first = updates.next().await.unwrap();
        fx.scheduler.run_until_idle();
        let second = updates.next().await.unwrap();
        assert!(second > first);
        assert_eq!(*fx.session.subscribe().borrow(), second);
    }

    #[tokio::test]
    async fn stats_count_messages() {
        let fx = fixture(ScriptedProvider::replying([
            Ok("fine".to_string()),
            Err(Error::timeout("slow")),
        ]));
        fx.session.send("a").await;
        fx.scheduler.run_until_idle();
        fx.session.send("b").await;
        assert_eq!(
            fx.session.stats(),
            SessionStats {
                message_count: 4,
                user_messages: 2,
                assistant_messages: 2,
                sends: 2,
                failures: 1,
                mirror_failures: 0,
                phase: Phase::Idle,
                is_generating: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_on_tokio_clock() {
        let animator = ResponseAnimator::new(Arc::new(
            crate::scheduler::TokioScheduler::current().unwrap(),
        ));
        let session = ChatSession::new(
            Arc::new(ScriptedProvider::replying([Ok("go get it".to_string())])),
            animator,
            Arc::new(MemoryStore::new()),
        );
        let SendOutcome::Revealing { message_id } = session.send("hi").await else {
            panic!("expected a reveal");
        };
        assert_eq!(session.message(message_id).unwrap().text, "");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(session.message(message_id).unwrap().text, "go get it");
        assert_eq!(session.phase(), Phase::Idle);
    }
}
