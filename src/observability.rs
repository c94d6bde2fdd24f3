use biometrics::{Collector, Counter, Moments};

pub(crate) static SESSION_SENDS: Counter = Counter::new("trickle.session.sends");
pub(crate) static SESSION_EMPTY_SENDS: Counter = Counter::new("trickle.session.empty_sends");
pub(crate) static SESSION_BUSY_SENDS: Counter = Counter::new("trickle.session.busy_sends");
pub(crate) static SESSION_SIGN_IN_PROMPTS: Counter =
    Counter::new("trickle.session.sign_in_prompts");
pub(crate) static SESSION_FAILURES: Counter = Counter::new("trickle.session.failures");
pub(crate) static SESSION_MIRROR_FAILURES: Counter =
    Counter::new("trickle.session.mirror_failures");
pub(crate) static SESSION_SUPERSEDED: Counter = Counter::new("trickle.session.superseded");
pub(crate) static SESSION_RESETS: Counter = Counter::new("trickle.session.resets");

pub(crate) static PROVIDER_REQUESTS: Counter = Counter::new("trickle.provider.requests");
pub(crate) static PROVIDER_ERRORS: Counter = Counter::new("trickle.provider.errors");
pub(crate) static PROVIDER_DURATION: Moments =
    Moments::new("trickle.provider.request_duration_seconds");

pub(crate) static ANIMATOR_RUNS_STARTED: Counter = Counter::new("trickle.animator.runs_started");
pub(crate) static ANIMATOR_RUNS_COMPLETED: Counter =
    Counter::new("trickle.animator.runs_completed");
pub(crate) static ANIMATOR_RUNS_CANCELLED: Counter =
    Counter::new("trickle.animator.runs_cancelled");
pub(crate) static ANIMATOR_CHUNKS: Counter = Counter::new("trickle.animator.chunks");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&SESSION_SENDS);
    collector.register_counter(&SESSION_EMPTY_SENDS);
    collector.register_counter(&SESSION_BUSY_SENDS);
    collector.register_counter(&SESSION_SIGN_IN_PROMPTS);
    collector.register_counter(&SESSION_FAILURES);
    collector.register_counter(&SESSION_MIRROR_FAILURES);
    collector.register_counter(&SESSION_SUPERSEDED);
    collector.register_counter(&SESSION_RESETS);

    collector.register_counter(&PROVIDER_REQUESTS);
    collector.register_counter(&PROVIDER_ERRORS);
    collector.register_moments(&PROVIDER_DURATION);

    collector.register_counter(&ANIMATOR_RUNS_STARTED);
    collector.register_counter(&ANIMATOR_RUNS_COMPLETED);
    collector.register_counter(&ANIMATOR_RUNS_CANCELLED);
    collector.register_counter(&ANIMATOR_CHUNKS);
}
