use biometrics::{Collector, Counter, Moments};

pub(crate) static FETCH_REQUESTS: Counter = Counter::new("chatmtl.fetch.requests");
pub(crate) static FETCH_ERRORS: Counter = Counter::new("chatmtl.fetch.errors");
pub(crate) static FETCH_ARTICLES: Counter = Counter::new("chatmtl.fetch.articles");

pub(crate) static INFERENCE_REQUESTS: Counter = Counter::new("chatmtl.inference.requests");
pub(crate) static INFERENCE_ERRORS: Counter = Counter::new("chatmtl.inference.errors");
pub(crate) static INFERENCE_RETRIES: Counter = Counter::new("chatmtl.inference.retries");
pub(crate) static INFERENCE_DURATION: Moments =
    Moments::new("chatmtl.inference.duration_seconds");

pub(crate) static LOG_WRITES: Counter = Counter::new("chatmtl.log.writes");
pub(crate) static LOG_ERRORS: Counter = Counter::new("chatmtl.log.errors");

pub(crate) static CHAT_TURNS: Counter = Counter::new("chatmtl.chat.turns");
pub(crate) static CHAT_FAILED_TURNS: Counter = Counter::new("chatmtl.chat.failed_turns");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&FETCH_REQUESTS);
    collector.register_counter(&FETCH_ERRORS);
    collector.register_counter(&FETCH_ARTICLES);

    collector.register_counter(&INFERENCE_REQUESTS);
    collector.register_counter(&INFERENCE_ERRORS);
    collector.register_counter(&INFERENCE_RETRIES);
    collector.register_moments(&INFERENCE_DURATION);

    collector.register_counter(&LOG_WRITES);
    collector.register_counter(&LOG_ERRORS);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_FAILED_TURNS);
}
