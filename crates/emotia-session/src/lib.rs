//! Reconnecting real-time chat session: envelope frames, backoff, typing
//! state and the session driver.

pub mod backoff;
pub mod error;
pub mod frame;
pub mod machine;
pub mod manager;
pub mod transport;
pub mod typing;

pub use backoff::ReconnectPolicy;
pub use error::{ConnectionError, FrameError, SendError, TransitionError};
pub use frame::{EmotionFrame, Frame, FrameEmotion, MessageFrame, TypingFrame};
pub use machine::{SessionMachine, SessionStatus};
pub use manager::SessionManager;
pub use transport::{Connection, Transport, WsTransport};
pub use typing::TypingTracker;
