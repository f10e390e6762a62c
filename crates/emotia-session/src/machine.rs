use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::ReconnectPolicy;
use crate::error::TransitionError;

/// Connection state reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl SessionStatus {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Session lifecycle, independent of any transport or timer.
///
/// Once closed, every further event is rejected.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    status: SessionStatus,
    attempt: u32,
    closed: bool,
    policy: ReconnectPolicy,
}

impl SessionMachine {
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            status: SessionStatus::Disconnected,
            attempt: 0,
            closed: false,
            policy,
        }
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Reconnect attempts since the last successful connection
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// `Disconnected -> Connecting`
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or already past `Disconnected`
    pub fn open(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(&[SessionStatus::Disconnected], SessionStatus::Connecting, "open")
    }

    /// `Connecting -> Connected`; resets the attempt counter
    ///
    /// # Errors
    ///
    /// Fails unless the session is `Connecting`
    pub fn on_connected(&mut self) -> Result<SessionStatus, TransitionError> {
        let status =
            self.transition(&[SessionStatus::Connecting], SessionStatus::Connected, "connect")?;
        self.attempt = 0;
        Ok(status)
    }

    /// `Connecting | Connected -> Reconnecting`, returning the delay before the next try
    ///
    /// # Errors
    ///
    /// Fails unless the session is `Connecting` or `Connected`
    pub fn on_lost(&mut self) -> Result<Duration, TransitionError> {
        self.transition(
            &[SessionStatus::Connecting, SessionStatus::Connected],
            SessionStatus::Reconnecting,
            "reconnect",
        )?;
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Ok(delay)
    }

    /// `Reconnecting -> Connecting` once the reconnect delay has elapsed
    ///
    /// # Errors
    ///
    /// Fails unless the session is `Reconnecting`
    pub fn on_retry(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(&[SessionStatus::Reconnecting], SessionStatus::Connecting, "retry")
    }

    /// Any state `-> Disconnected`, permanently. Returns whether anything changed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let changed = self.status != SessionStatus::Disconnected;
        self.status = SessionStatus::Disconnected;
        changed
    }

    fn transition(
        &mut self,
        from: &[SessionStatus],
        next: SessionStatus,
        action: &'static str,
    ) -> Result<SessionStatus, TransitionError> {
        if self.closed || !from.contains(&self.status) {
            return Err(TransitionError {
                from: self.status,
                action,
            });
        }
        log::debug!("Session {} -> {next}", self.status);
        self.status = next;
        Ok(next)
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut machine = SessionMachine::default();
        assert_eq!(machine.status(), SessionStatus::Disconnected);
        assert_eq!(machine.open(), Ok(SessionStatus::Connecting));
        assert_eq!(machine.on_connected(), Ok(SessionStatus::Connected));
        assert_eq!(machine.attempt(), 0);
    }

    #[test]
    fn test_reconnect_delays_grow_and_reset() {
        let mut machine = SessionMachine::default();
        machine.open().unwrap();

        let mut delays = Vec::new();
        for _ in 0..6 {
            delays.push(machine.on_lost().unwrap().as_millis());
            machine.on_retry().unwrap();
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000]);
        assert_eq!(machine.attempt(), 6);

        machine.on_connected().unwrap();
        assert_eq!(machine.attempt(), 0);
        assert_eq!(machine.on_lost().unwrap().as_millis(), 1000);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut machine = SessionMachine::default();
        let err = machine.on_connected().unwrap_err();
        assert_eq!(err.from, SessionStatus::Disconnected);
        assert_eq!(err.to_string(), "cannot connect while disconnected");
        assert!(machine.on_retry().is_err());
        assert!(machine.on_lost().is_err());
    }

    #[test]
    fn test_close_is_terminal() {
        let mut machine = SessionMachine::default();
        machine.open().unwrap();
        machine.on_connected().unwrap();

        assert!(machine.close());
        assert_eq!(machine.status(), SessionStatus::Disconnected);
        assert!(machine.is_closed());
        assert!(!machine.close());
        assert!(machine.open().is_err());
        assert!(machine.on_lost().is_err());
    }
}
