use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// Appended to a topic name to form the channel its reader joins.
pub const CHANNEL_SUFFIX: &str = "_consumer";

/// Longest topic or channel name nsqd accepts, ephemeral suffix included.
pub const MAX_NAME_LEN: usize = 64;

const EPHEMERAL_SUFFIX: &str = "#ephemeral";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("{kind} name is empty")]
    Empty { kind: &'static str },
    #[error("{kind} name `{name}` is longer than {} characters", MAX_NAME_LEN)]
    TooLong { kind: &'static str, name: String },
    #[error("{kind} name `{name}` contains invalid character {character:?}")]
    InvalidCharacter {
        kind: &'static str,
        name: String,
        character: char,
    },
}

fn validate(kind: &'static str, name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty { kind });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong {
            kind,
            name: name.to_string(),
        });
    }
    let base = name.strip_suffix(EPHEMERAL_SUFFIX).unwrap_or(name);
    if base.is_empty() {
        return Err(NameError::Empty { kind });
    }
    match base
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        Some(character) => Err(NameError::InvalidCharacter {
            kind,
            name: name.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicName(String);

impl TopicName {
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate("topic", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_ephemeral(&self) -> bool {
        self.0.ends_with(EPHEMERAL_SUFFIX)
    }

    /// The channel this topic's reader consumes from: the topic name followed
    /// by [`CHANNEL_SUFFIX`].
    pub fn channel(&self) -> Result<ChannelName, NameError> {
        ChannelName::new(format!("{}{CHANNEL_SUFFIX}", self.0))
    }
}

impl TryFrom<String> for TopicName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TopicName::new(value)
    }
}

impl From<TopicName> for String {
    fn from(value: TopicName) -> Self {
        value.0
    }
}

impl Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate("channel", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the queue client should do with a message once the handler is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: the message is consumed.
    Finish,
    /// Leave the message for redelivery under the client's policy.
    Requeue,
}

impl Disposition {
    pub fn is_success(self) -> bool {
        matches!(self, Disposition::Finish)
    }
}

#[derive(Clone, Default, Debug)]
pub struct InputMessage {
    pub message: Vec<u8>,
    pub attempt: u16,
}
