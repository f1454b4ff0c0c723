//! Conversation transcript

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered user and assistant messages of one conversation
///
/// The system prompt is not stored here; it is prepended per request.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<Message>,
}

impl ChatLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the content of the message at `index`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `index` is out of range
    pub fn edit(&mut self, index: usize, content: impl Into<String>) -> Result<()> {
        let len = self.messages.len();
        let message = self
            .messages
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("message {index} (log has {len})")))?;
        message.content = content.into();
        Ok(())
    }

    /// Drop every message
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Request messages: the system prompt followed by the log
    #[must_use]
    pub fn with_system(&self, system_prompt: &str) -> Vec<Message> {
        std::iter::once(Message::system(system_prompt))
            .chain(self.messages.iter().cloned())
            .collect()
    }
}
