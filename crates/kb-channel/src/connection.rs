//! Per-role connection state with deduplicated transition logs.

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Independent connection a replication channel holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Publisher,
    Subscriber,
    Cache,
}

impl ConnectionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
            Self::Cache => "cache",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connect,
    Ready,
    Reconnecting,
    End,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::End => "end",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    current: Option<ConnectionState>,
    last_error: Option<String>,
}

/// Tracks one role's connection state.
///
/// A transition into the state the connection is already in is not logged
/// again.
#[derive(Debug)]
pub struct ConnectionTracker {
    role: ConnectionRole,
    state: Mutex<TrackerState>,
    attempts: AtomicU32,
}

impl ConnectionTracker {
    pub fn new(role: ConnectionRole) -> Self {
        Self {
            role,
            state: Mutex::new(TrackerState::default()),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Move to `next`; returns whether the state changed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.current == Some(next) {
            return false;
        }
        state.current = Some(next);
        if next == ConnectionState::Ready {
            self.attempts.store(0, Ordering::Relaxed);
            state.last_error = None;
        }

        let role = self.role.as_str();
        match next {
            ConnectionState::Connect => debug!(role, "connecting"),
            ConnectionState::Ready => info!(role, "connection ready"),
            ConnectionState::Reconnecting => {
                warn!(role, attempt = self.attempts.load(Ordering::Relaxed), "reconnecting")
            }
            ConnectionState::End => info!(role, "connection closed"),
            ConnectionState::Error => warn!(
                role,
                error = state.last_error.as_deref().unwrap_or("unknown"),
                "connection error"
            ),
        }
        true
    }

    /// Record a failure and move to [`ConnectionState::Error`].
    pub fn record_error(&self, error: impl fmt::Display) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.last_error = Some(error.to_string());
        }
        self.transition(ConnectionState::Error)
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).current
    }

    /// Most recent error since the connection was last ready.
    pub fn last_error(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last_error
            .clone()
    }

    /// Count a reconnect attempt, 1-based.
    pub fn next_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_state_is_not_relogged() {
        let tracker = ConnectionTracker::new(ConnectionRole::Subscriber);
        assert!(tracker.transition(ConnectionState::Connect));
        assert!(tracker.transition(ConnectionState::Ready));
        assert!(!tracker.transition(ConnectionState::Ready));
        assert!(tracker.transition(ConnectionState::End));
    }

    #[test]
    fn ready_clears_error_and_attempts() {
        let tracker = ConnectionTracker::new(ConnectionRole::Cache);
        tracker.record_error("refused");
        assert_eq!(tracker.next_attempt(), 1);
        assert_eq!(tracker.next_attempt(), 2);
        assert_eq!(tracker.last_error().as_deref(), Some("refused"));

        tracker.transition(ConnectionState::Ready);
        assert_eq!(tracker.last_error(), None);
        assert_eq!(tracker.next_attempt(), 1);
    }

    #[test]
    fn repeated_errors_log_once_but_keep_latest_message() {
        let tracker = ConnectionTracker::new(ConnectionRole::Publisher);
        assert!(tracker.record_error("first"));
        assert!(!tracker.record_error("second"));
        assert_eq!(tracker.last_error().as_deref(), Some("second"));
    }
}
