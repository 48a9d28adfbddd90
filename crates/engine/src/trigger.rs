//! Normalisation of inbound trigger events into an initial context.

use serde_json::{json, Value};

use nodes::ExecutionContext;

use crate::EngineError;

/// Context key a Telegram update is stored under.
pub const TELEGRAM_KEY: &str = "telegram";

/// Initial context for a manual run.
///
/// `None` and `null` start the run empty; anything other than an object
/// is rejected.
pub fn manual_context(input: Option<Value>) -> Result<ExecutionContext, EngineError> {
    ExecutionContext::from_value(input.unwrap_or(Value::Null)).map_err(EngineError::InvalidContext)
}

/// Map a Telegram Bot API update onto `{ telegram: { ... } }`.
///
/// Returns `None` for updates that carry no `message` (edits, callbacks,
/// member changes), which do not start a run.
pub fn telegram_context(update: &Value) -> Option<ExecutionContext> {
    let message = update.get("message").filter(|m| m.is_object())?;
    let from = message.get("from");
    let field = |v: Option<&Value>, key: &str| {
        v.and_then(|v| v.get(key)).cloned().unwrap_or(Value::Null)
    };

    let payload = json!({
        "updateId": field(Some(update), "update_id"),
        "chatId": field(message.get("chat"), "id"),
        "text": message.get("text").and_then(Value::as_str).unwrap_or_default(),
        "from": {
            "id": field(from, "id"),
            "username": field(from, "username"),
            "firstName": field(from, "first_name"),
        },
        "raw": update,
    });
    Some(ExecutionContext::new().with(TELEGRAM_KEY, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_message_is_namespaced_under_telegram() {
        let update = json!({
            "update_id": 9001,
            "message": {
                "message_id": 5,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 7, "username": "ada", "first_name": "Ada" },
                "text": "hello"
            }
        });

        let ctx = telegram_context(&update).unwrap();
        assert_eq!(ctx.keys().collect::<Vec<_>>(), vec!["telegram"]);
        assert_eq!(ctx.lookup("telegram.updateId"), Some(&json!(9001)));
        assert_eq!(ctx.lookup("telegram.chatId"), Some(&json!(42)));
        assert_eq!(ctx.lookup("telegram.text"), Some(&json!("hello")));
        assert_eq!(ctx.lookup("telegram.from.firstName"), Some(&json!("Ada")));
        assert_eq!(ctx.lookup("telegram.raw"), Some(&update));
    }

    #[test]
    fn message_without_text_gets_empty_text() {
        let update = json!({ "update_id": 1, "message": { "chat": { "id": 3 } } });
        let ctx = telegram_context(&update).unwrap();
        assert_eq!(ctx.lookup("telegram.text"), Some(&json!("")));
        assert_eq!(ctx.lookup("telegram.from.username"), Some(&Value::Null));
    }

    #[test]
    fn updates_without_message_are_ignored() {
        assert!(telegram_context(&json!({ "update_id": 1, "edited_message": {} })).is_none());
    }

    #[test]
    fn manual_input_must_be_an_object() {
        assert!(manual_context(None).unwrap().is_empty());
        assert_eq!(manual_context(Some(json!({ "a": 1 }))).unwrap().len(), 1);
        assert!(matches!(
            manual_context(Some(json!([1, 2]))),
            Err(EngineError::InvalidContext(_))
        ));
    }
}
