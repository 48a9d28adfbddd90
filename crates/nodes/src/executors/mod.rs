//! Built-in executors, one module per node family.

pub mod ai;
pub mod discord;
pub mod http_request;
pub mod slack;
pub mod telegram;
pub mod trigger;

pub use ai::{AiCompletionExecutor, AiProvider};
pub use discord::DiscordExecutor;
pub use http_request::HttpRequestExecutor;
pub use slack::SlackExecutor;
pub use telegram::TelegramExecutor;
pub use trigger::TriggerExecutor;

/// First `max` characters of `s`.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
