pub mod config;
pub mod types;

pub use config::{
    default_config_path, get_data_dir, CacheConfig, ClassifierConfig, Config, CredentialProvider,
    RateLimitConfig, SessionConfig, StaticCredential,
};
pub use types::{
    emoji_for_label, generate_user_id, ChatMessage, Emotion, EmotionAnnotation, EmotionResult,
    SYSTEM_SENDER, UNKNOWN_EMOJI,
};
