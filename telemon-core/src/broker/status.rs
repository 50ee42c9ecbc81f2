//! Connection state machine of the broker link.
//!
//! ```text
//! Disconnected --connect--> Connecting --ack ok--> Connected --suback--> Subscribed
//! Connecting --refused/timeout--> Reconnecting --backoff--> Connecting
//! Connected|Subscribed --transport error--> Reconnecting
//! any --shutdown--> Disconnected (terminal)
//! ```

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Reconnecting,
}

impl ConnectionState {
    /// States in which outbound publishes are accepted.
    pub fn can_publish(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Subscribed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStatus {
    pub state: ConnectionState,
    /// Last CONNACK return code reported by the broker (0 = accepted).
    pub return_code: Option<u8>,
    pub last_error: Option<String>,
    pub reconnects: u32,
    /// Set by shutdown; no transition leaves `Disconnected` afterwards.
    pub closed: bool,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            return_code: None,
            last_error: None,
            reconnects: 0,
            closed: false,
        }
    }
}

impl LinkStatus {
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Reconnecting if !self.closed => {
                self.move_to(ConnectionState::Connecting)
            }
            _ => self.reject("connect"),
        }
    }

    pub fn connack(&mut self, code: u8) -> bool {
        if self.state != ConnectionState::Connecting {
            return self.reject("connack");
        }
        self.return_code = Some(code);
        if code == 0 {
            self.last_error = None;
            self.move_to(ConnectionState::Connected)
        } else {
            self.connection_lost(&ConnectionError::Refused(code))
        }
    }

    pub fn subscribed(&mut self) -> bool {
        match self.state {
            ConnectionState::Connected => self.move_to(ConnectionState::Subscribed),
            _ => self.reject("suback"),
        }
    }

    pub fn connection_lost(&mut self, err: &ConnectionError) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Subscribed => {
                if let ConnectionError::Refused(code) = err {
                    self.return_code = Some(*code);
                }
                self.last_error = Some(err.to_string());
                self.reconnects += 1;
                self.move_to(ConnectionState::Reconnecting)
            }
            _ => self.reject("connection lost"),
        }
    }

    pub fn shut_down(&mut self) -> bool {
        self.closed = true;
        match self.state {
            ConnectionState::Disconnected => false,
            _ => self.move_to(ConnectionState::Disconnected),
        }
    }

    fn move_to(&mut self, next: ConnectionState) -> bool {
        match next {
            ConnectionState::Reconnecting => warn!("[link] {} -> {}", self.state, next),
            _ => info!("[link] {} -> {}", self.state, next),
        }
        self.state = next;
        true
    }

    fn reject(&self, event: &str) -> bool {
        debug!("[link] ignoring {event} while {}", self.state);
        false
    }
}
