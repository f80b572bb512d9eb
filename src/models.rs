//! The message resource and its create payload.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Shortest accepted message text, in characters.
pub const MIN_TEXT_LEN: usize = 3;
/// Longest accepted message text, in characters.
pub const MAX_TEXT_LEN: usize = 160;

/// Text written by `moc seed`.
pub const SEED_TEXT: &str = "Hallo ich bin eine Test Nachricht";

/// Body of `POST /messages`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MessageRequest {
    #[serde(default, rename = "message")]
    pub text: Option<String>,
}

impl MessageRequest {
    /// Checks the payload and hands back the accepted text.
    ///
    /// Violations are reported per field, keyed by the JSON field name, with
    /// the tag of the rule that failed: `required`, `min` or `max`.
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::default();

        match self.text {
            None => errors.add("message", "required"),
            Some(ref text) if text.is_empty() => errors.add("message", "required"),
            Some(ref text) => {
                let len = text.chars().count();
                if len < MIN_TEXT_LEN {
                    errors.add("message", "min");
                } else if len > MAX_TEXT_LEN {
                    errors.add("message", "max");
                }
            }
        }

        match (errors.is_empty(), self.text) {
            (true, Some(text)) => Ok(text),
            _ => Err(errors),
        }
    }
}

/// A stored message.
///
/// Deletion is soft: `deleted_at` is stamped and the row disappears from
/// list and find, but the deleted message is still returned to the caller
/// that removed it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "message")]
    pub text: String,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// A new, not yet stored message with a fresh identifier.
    pub fn new(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            text: text.into(),
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Field name → violated rule tag.
#[derive(Debug, Default, PartialEq)]
pub struct FieldErrors(BTreeMap<&'static str, &'static str>);

impl FieldErrors {
    fn add(&mut self, field: &'static str, tag: &'static str) {
        self.0.insert(field, tag);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }
}

impl From<FieldErrors> for Value {
    fn from(errors: FieldErrors) -> Self {
        let map: Map<String, Value> = errors
            .0
            .into_iter()
            .map(|(field, tag)| (field.to_owned(), Value::from(tag)))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: Option<&str>) -> MessageRequest {
        MessageRequest { text: text.map(str::to_owned) }
    }

    #[test]
    fn accepts_text_within_bounds() {
        assert_eq!(request(Some("Hello there")).validate().unwrap(), "Hello there");
        assert_eq!(request(Some("abc")).validate().unwrap(), "abc");
        assert!(request(Some(&"x".repeat(MAX_TEXT_LEN))).validate().is_ok());
    }

    #[test]
    fn missing_or_empty_text_is_required() {
        assert_eq!(request(None).validate().unwrap_err().get("message"), Some("required"));
        assert_eq!(request(Some("")).validate().unwrap_err().get("message"), Some("required"));
    }

    #[test]
    fn short_and_long_texts_report_their_rule() {
        assert_eq!(request(Some("Hi")).validate().unwrap_err().get("message"), Some("min"));
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        assert_eq!(request(Some(&long)).validate().unwrap_err().get("message"), Some("max"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // three characters, six bytes
        assert!(request(Some("äöü")).validate().is_ok());
    }

    #[test]
    fn field_errors_render_as_flat_object() {
        let errors = request(Some("Hi")).validate().unwrap_err();
        assert_eq!(Value::from(errors), serde_json::json!({"message": "min"}));
    }

    #[test]
    fn message_serializes_text_under_message_key() {
        let message = Message::new("Hello there");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["message"], "Hello there");
        assert_eq!(value["id"], message.id.as_str());
        assert!(value.get("deleted_at").is_none());
        assert!(Uuid::parse_str(&message.id).is_ok());
    }
}
