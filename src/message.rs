//! Chat log entries.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque identifier of a message, unique within one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person typing.
    User,
    /// The completion provider.
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "You"),
            Sender::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One entry in the chat log.
///
/// Only assistant messages change after creation, and only while their reply
/// is being revealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, unique within the session.
    pub id: MessageId,
    /// Text shown for the message.
    pub text: String,
    /// Author of the message.
    pub sender: Sender,
    /// When the message entered the log.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(id: MessageId, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            sender,
            created_at: crate::utils::time::now(),
        }
    }

    /// True for messages written by the user.
    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    /// True for messages written by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }
}
