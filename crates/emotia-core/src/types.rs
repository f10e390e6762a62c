//! Shared domain types for classification results and chat traffic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Sender id used for notices generated locally rather than by a peer
pub const SYSTEM_SENDER: &str = "system";

/// Emoji used for labels outside the known vocabulary
pub const UNKNOWN_EMOJI: &str = "\u{2753}";

/// Emoji attached to local system notices
const SYSTEM_EMOJI: &str = "\u{1F310}";

/// Emotion vocabulary reported by the classification model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Anger,
    Disgust,
    Fear,
    Joy,
    Neutral,
    Sadness,
    Surprise,
}

impl Emotion {
    pub const ALL: [Self; 7] = [
        Self::Anger,
        Self::Disgust,
        Self::Fear,
        Self::Joy,
        Self::Neutral,
        Self::Sadness,
        Self::Surprise,
    ];

    /// Parse a provider label, ignoring case and surrounding whitespace
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|emotion| emotion.label().eq_ignore_ascii_case(label))
    }

    /// Canonical lower-case label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Anger => "anger",
            Self::Disgust => "disgust",
            Self::Fear => "fear",
            Self::Joy => "joy",
            Self::Neutral => "neutral",
            Self::Sadness => "sadness",
            Self::Surprise => "surprise",
        }
    }

    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Anger => "\u{1F620}",
            Self::Disgust => "\u{1F922}",
            Self::Fear => "\u{1F628}",
            Self::Joy => "\u{1F60A}",
            Self::Neutral => "\u{1F610}",
            Self::Sadness => "\u{1F622}",
            Self::Surprise => "\u{1F62E}",
        }
    }

    /// Human-readable adjective for the emotion
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Anger => "Angry",
            Self::Disgust => "Disgusted",
            Self::Fear => "Afraid",
            Self::Joy => "Happy",
            Self::Neutral => "Neutral",
            Self::Sadness => "Sad",
            Self::Surprise => "Surprised",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Dominant emotion plus the full label -> score distribution.
///
/// Scores come straight from the provider and are not normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub label: String,
    pub scores: BTreeMap<String, f64>,
}

impl EmotionResult {
    #[must_use]
    pub fn new(label: impl Into<String>, scores: BTreeMap<String, f64>) -> Self {
        Self {
            label: label.into(),
            scores,
        }
    }

    /// Fixed fallback result used for blank input and unusable payloads
    #[must_use]
    pub fn neutral() -> Self {
        Self::new(Emotion::Neutral.label(), BTreeMap::new())
    }

    #[must_use]
    pub fn emotion(&self) -> Option<Emotion> {
        Emotion::parse_label(&self.label)
    }

    /// Score of the dominant label, if the provider reported one
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        self.scores.get(&self.label).copied().or_else(|| {
            self.scores
                .iter()
                .find(|(label, _)| label.eq_ignore_ascii_case(&self.label))
                .map(|(_, score)| *score)
        })
    }

    #[must_use]
    pub fn annotation(&self) -> EmotionAnnotation {
        EmotionAnnotation {
            label: self.label.clone(),
            emoji: emoji_for_label(&self.label).to_string(),
            score: self.score(),
        }
    }
}

/// Look up the emoji for a provider label, falling back to [`UNKNOWN_EMOJI`]
#[must_use]
pub fn emoji_for_label(label: &str) -> &'static str {
    Emotion::parse_label(label).map_or(UNKNOWN_EMOJI, Emotion::emoji)
}

/// Emotion hint attached to a chat message once it is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionAnnotation {
    pub label: String,
    pub emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl EmotionAnnotation {
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self {
            label: label.to_lowercase(),
            emoji: emoji_for_label(label).to_string(),
            score: None,
        }
    }
}

/// A single chat entry, either submitted locally or built from an inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Correlation id
    pub id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub emotion: Option<EmotionAnnotation>,
}

impl ChatMessage {
    /// Stamp a new outbound message with a fresh correlation id and the current time
    #[must_use]
    pub fn outgoing(sender_id: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: None,
            text: text.to_string(),
            timestamp: Utc::now(),
            emotion: None,
        }
    }

    /// Local notice such as "Connected to chat"
    #[must_use]
    pub fn system(text: &str) -> Self {
        let mut message = Self::outgoing(SYSTEM_SENDER, text);
        message.emotion = Some(EmotionAnnotation {
            label: Emotion::Neutral.label().to_string(),
            emoji: SYSTEM_EMOJI.to_string(),
            score: None,
        });
        message
    }

    #[must_use]
    pub fn with_emotion(mut self, emotion: Option<EmotionAnnotation>) -> Self {
        self.emotion = emotion;
        self
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.sender_id == SYSTEM_SENDER
    }
}

/// Generate an opaque client user id of the form `user_xxxxxxxxx`
#[must_use]
pub fn generate_user_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("user_{}", &raw[..9])
}
