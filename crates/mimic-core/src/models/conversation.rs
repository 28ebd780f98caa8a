use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl Display for ChatRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            audio_path: None,
            video_id: None,
        }
    }
}

/// Ordered message log of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub persona: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, persona: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            persona,
            created_at: now,
            updated_at: now,
        }
    }

    /// The last `window` messages, oldest first.
    pub fn recent(&self, window: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Message must be between 1 and 2000 characters"
    ))]
    pub message: String,
    pub clone_id: Option<String>,
    pub image_id: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default = "default_generate_video")]
    pub generate_video: bool,
}

fn default_generate_video() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_window() {
        let mut conv = Conversation::new("c1", None);
        for i in 0..15 {
            conv.messages.push(ChatMessage::user(format!("m{}", i)));
        }
        let recent = conv.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[9].content, "m14");
    }

    #[test]
    fn test_recent_window_shorter_than_history() {
        let mut conv = Conversation::new("c1", None);
        conv.messages.push(ChatMessage::assistant("hi"));
        assert_eq!(conv.recent(10).len(), 1);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("audio_path").is_none());
    }

    #[test]
    fn test_chat_request_length_limits() {
        let ok: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(ok.validate().is_ok());
        assert!(ok.generate_video);

        let too_long = ChatRequest {
            message: "x".repeat(2001),
            ..ok
        };
        assert!(too_long.validate().is_err());
    }
}
