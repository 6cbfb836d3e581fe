//! Connection lifecycle with bounded reconnects.

use std::time::{Duration, Instant};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// How many times to retry after losing the connection, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// Tracks the state machine
/// `Disconnected -> Connecting -> Connected -> Disconnected -> ...`
/// and schedules retries. Once `max_attempts` consecutive retries have
/// failed the connection gives up and stays disconnected until
/// [`Connection::begin`] is called again.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    policy: ReconnectPolicy,
    attempts: u32,
    retry_at: Option<Instant>,
    gave_up: bool,
}

impl Connection {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            attempts: 0,
            retry_at: None,
            gave_up: false,
        }
    }

    /// A fresh, user-initiated connection attempt.
    pub fn begin(&mut self) {
        self.state = ConnectionState::Connecting;
        self.attempts = 0;
        self.retry_at = None;
        self.gave_up = false;
    }

    /// The transport reported an open socket.
    pub fn opened(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.retry_at = None;
        self.gave_up = false;
    }

    /// The connection dropped or an attempt failed. Returns `true` if a
    /// retry was scheduled, `false` if the budget is spent.
    pub fn failed(&mut self, now: Instant) -> bool {
        self.state = ConnectionState::Disconnected;
        if self.gave_up {
            return false;
        }
        if self.attempts >= self.policy.max_attempts {
            self.retry_at = None;
            self.gave_up = true;
            return false;
        }
        self.attempts += 1;
        self.retry_at = Some(now + self.policy.delay);
        true
    }

    /// Whether a scheduled retry is due. Moves to `Connecting` if so.
    pub fn retry_due(&mut self, now: Instant) -> bool {
        match self.retry_at {
            Some(at) if now >= at => {
                self.retry_at = None;
                self.state = ConnectionState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// Deliberate teardown: no retries.
    pub fn close(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.retry_at = None;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Retries spent since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }
}
