//! Transcript entries kept by the coordinator and specialist loops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// One turn of an agent's running conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: MessageRole,

    pub content: String,

    /// Capability that produced this observation (tool entries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// An observation returned by a capability or by the dispatcher.
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::new(MessageRole::Tool, content)
        }
    }

    /// Plain-text form used when the transcript is replayed to a model
    /// that has no native tool role.
    pub fn as_prompt_text(&self) -> String {
        match (&self.role, &self.tool_name) {
            (MessageRole::Tool, Some(name)) => format!("[Observación: {name}]\n{}", self.content),
            _ => self.content.clone(),
        }
    }
}
