use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::ids::{MessageId, SessionId};

/// Author of a stored message.
///
/// Only `"user"` is treated as user-authored; any other sender string the
/// backend hands back is read as the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn from_wire(raw: &str) -> Self {
        if raw == "user" { Self::User } else { Self::Ai }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

/// Message body as it arrives from persisted state.
///
/// Text is supposed to be a plain string, but older records were saved with
/// object-valued text. Those are kept as `Malformed` so they can be detected
/// and coerced instead of failing the whole session load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageText {
    Plain(String),
    Malformed(Value),
}

impl MessageText {
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain(_))
    }

    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Malformed(_) => None,
        }
    }

    /// String form of the text; malformed values are rendered as compact JSON.
    pub fn to_plain_string(&self) -> Cow<'_, str> {
        match self {
            Self::Plain(text) => Cow::Borrowed(text),
            Self::Malformed(value) => Cow::Owned(value.to_string()),
        }
    }

    pub fn into_plain(self) -> Self {
        match self {
            Self::Plain(_) => self,
            Self::Malformed(value) => Self::Plain(value.to_string()),
        }
    }
}

impl Default for MessageText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl From<String> for MessageText {
    fn from(value: String) -> Self {
        Self::Plain(value)
    }
}

impl From<&str> for MessageText {
    fn from(value: &str) -> Self {
        Self::Plain(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    #[serde(default)]
    pub text: MessageText,
    /// Backend fields this crate does not interpret, written back untouched.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(id: MessageId, sender: Sender, text: impl Into<MessageText>) -> Self {
        Self {
            id,
            sender,
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageId::generate_user(), Sender::User, text.into())
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(MessageId::generate_ai(), Sender::Ai, text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ChatSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == message_id)
    }

    pub fn malformed_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| !message.text.is_plain())
            .count()
    }
}

/// Accepted shapes of a bulk session read.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum SessionsPayload {
    Wrapped { sessions: Vec<ChatSession> },
    Bare(Vec<ChatSession>),
}

impl SessionsPayload {
    pub(crate) fn into_sessions(self) -> Vec<ChatSession> {
        match self {
            Self::Wrapped { sessions } | Self::Bare(sessions) => sessions,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionsEnvelope<'a> {
    pub sessions: &'a [ChatSession],
}
