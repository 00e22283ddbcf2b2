use std::fmt::{self, Display, Write};

use consumer_types::{Disposition, InputMessage, TopicName};
use log::{error, info};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn decode(body: &[u8]) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(body)?;
    Ok(serde_json::from_str(text)?)
}

/// Handles the messages of exactly one topic. Each reader gets its own.
#[derive(Clone, Debug)]
pub struct MessageHandler {
    topic: TopicName,
}

impl MessageHandler {
    pub fn new(topic: TopicName) -> Self {
        Self { topic }
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Never fails: decode errors are logged and turned into [`Disposition::Requeue`].
    pub fn handle(&self, message: &InputMessage) -> Disposition {
        match self.describe(message) {
            Ok(line) => {
                info!("{line}");
                Disposition::Finish
            }
            Err(e) => {
                error!("{}", self.failure_line(&e));
                Disposition::Requeue
            }
        }
    }

    pub(crate) fn describe(&self, message: &InputMessage) -> Result<String, DecodeError> {
        let payload = decode(&message.message)?;
        let line = if message.attempt > 1 {
            format!(
                "[{}] Received message (attempt {}): {}",
                self.topic,
                message.attempt,
                Rendered(&payload)
            )
        } else {
            format!("[{}] Received message: {}", self.topic, Rendered(&payload))
        };
        Ok(line)
    }

    pub(crate) fn failure_line(&self, e: &DecodeError) -> String {
        format!("[{}] Error processing message: {e}", self.topic)
    }
}

/// Compact rendering of a decoded payload: keys and strings unquoted,
/// so `{"event":"created"}` reads `{event: created}`.
pub struct Rendered<'a>(pub &'a Value);

impl Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", Rendered(item))?;
                }
                f.write_char(']')
            }
            Value::Object(map) => {
                f.write_char('{')?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {}", Rendered(value))?;
                }
                f.write_char('}')
            }
            other => write!(f, "{other}"),
        }
    }
}
