//! JSON envelope exchanged over the chat channel, tagged by `type`.

use chrono::{DateTime, Utc};
use emotia_core::{emoji_for_label, ChatMessage, EmotionAnnotation};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Message(MessageFrame),
    Typing(TypingFrame),
    Ping,
    /// Server-side classification of the sender's last message
    Emotion(EmotionFrame),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender: String,
    #[serde(default)]
    pub receiver: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<FrameEmotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEmotion {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingFrame {
    pub sender: String,
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionFrame {
    pub emotion: String,
    pub score: f64,
}

impl Frame {
    /// Decode one inbound text frame; unknown tags are an error
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the text is not a frame this client understands
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("type").is_none() {
            return Err(FrameError::Untagged);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn message(message: &ChatMessage) -> Self {
        Self::Message(MessageFrame::from(message))
    }

    #[must_use]
    pub fn typing(sender: &str, is_typing: bool) -> Self {
        Self::Typing(TypingFrame {
            sender: sender.to_string(),
            is_typing,
        })
    }

    /// Short tag for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
            Self::Ping => "ping",
            Self::Emotion(_) => "emotion",
        }
    }
}

impl From<&ChatMessage> for MessageFrame {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: Some(message.id.clone()),
            sender: message.sender_id.clone(),
            receiver: message.receiver_id.clone(),
            message: message.text.clone(),
            emotion: message.emotion.as_ref().map(|emotion| FrameEmotion {
                label: emotion.label.clone(),
                score: emotion.score,
                emoji: Some(emotion.emoji.clone()),
            }),
            timestamp: Some(message.timestamp.to_rfc3339()),
        }
    }
}

impl From<FrameEmotion> for EmotionAnnotation {
    fn from(emotion: FrameEmotion) -> Self {
        let emoji = emotion
            .emoji
            .unwrap_or_else(|| emoji_for_label(&emotion.label).to_string());
        Self {
            label: emotion.label.to_lowercase(),
            emoji,
            score: emotion.score,
        }
    }
}

impl From<EmotionFrame> for EmotionAnnotation {
    fn from(frame: EmotionFrame) -> Self {
        Self {
            emoji: emoji_for_label(&frame.emotion).to_string(),
            label: frame.emotion.to_lowercase(),
            score: Some(frame.score),
        }
    }
}

impl MessageFrame {
    /// Build the local copy of an inbound message.
    ///
    /// Missing ids get a fresh one; missing or unparsable timestamps become `received_at`.
    #[must_use]
    pub fn into_chat_message(self, received_at: DateTime<Utc>) -> ChatMessage {
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or(received_at, |parsed| parsed.with_timezone(&Utc));
        ChatMessage {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            sender_id: self.sender,
            receiver_id: self.receiver,
            text: self.message,
            timestamp,
            emotion: self.emotion.map(EmotionAnnotation::from),
        }
    }
}
