use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per-peer typing flags that clear themselves after a quiet period.
///
/// Each typing event replaces the peer's deadline rather than extending it.
#[derive(Debug, Clone)]
pub struct TypingTracker {
    timeout: Duration,
    deadlines: HashMap<String, Instant>,
}

impl TypingTracker {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadlines: HashMap::new(),
        }
    }

    /// Apply an inbound typing event observed at `now`
    pub fn set(&mut self, peer: &str, is_typing: bool, now: Instant) {
        if is_typing {
            self.deadlines.insert(peer.to_string(), now + self.timeout);
        } else {
            self.deadlines.remove(peer);
        }
    }

    #[must_use]
    pub fn is_typing(&self, peer: &str, now: Instant) -> bool {
        self.deadlines
            .get(peer)
            .is_some_and(|deadline| *deadline > now)
    }

    /// Peers currently typing, sorted
    #[must_use]
    pub fn peers(&self, now: Instant) -> Vec<String> {
        let mut peers: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline > now)
            .map(|(peer, _)| peer.clone())
            .collect();
        peers.sort();
        peers
    }

    /// Earliest pending auto-clear
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Drop every flag whose deadline has passed and return those peers
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in &expired {
            self.deadlines.remove(peer);
        }
        expired.sort();
        expired
    }

    /// Forget every flag, returning the peers that were typing
    pub fn clear(&mut self) -> Vec<String> {
        let mut peers: Vec<String> = self.deadlines.drain().map(|(peer, _)| peer).collect();
        peers.sort();
        peers
    }
}
