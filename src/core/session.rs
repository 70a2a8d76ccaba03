//! Per-connection handshake state.
//!
//! A session walks `Uninitialized → Initializing → Ready → Closed` and never
//! goes back. Tool access is only granted in `Ready`.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::error::ErrorRecord;

/// Protocol revision spoken when the client asks for one we do not know.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol revisions the server accepts verbatim.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// What the client told us during `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Negotiated {
    pub protocol_version: String,
    pub client_info: Option<Value>,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    negotiated: Option<Negotiated>,
}

/// Handshake state for one transport connection.
#[derive(Debug)]
pub struct Session {
    inner: Mutex<Inner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session awaiting `initialize`.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                negotiated: None,
            }),
        }
    }

    /// A session that is already usable (HTTP requests skip the handshake).
    pub fn ready() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Ready,
                negotiated: None,
            }),
        }
    }

    // A panic while holding the lock cannot leave `Inner` half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn negotiated(&self) -> Option<Negotiated> {
        self.lock().negotiated.clone()
    }

    /// Handle an `initialize` request.
    ///
    /// Only valid from `Uninitialized`; returns the protocol version to
    /// answer with.
    pub fn begin_initialize(
        &self,
        requested_version: Option<&str>,
        client_info: Option<Value>,
    ) -> Result<String, ErrorRecord> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Uninitialized => {}
            SessionState::Closed => {
                return Err(ErrorRecord::validation("Session is closed"));
            }
            _ => {
                return Err(ErrorRecord::validation("Session already initialized"));
            }
        }

        let protocol_version = match requested_version {
            Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v.to_string(),
            Some(v) => {
                debug!(
                    "Client requested unsupported protocol version {}, offering {}",
                    v, DEFAULT_PROTOCOL_VERSION
                );
                DEFAULT_PROTOCOL_VERSION.to_string()
            }
            None => DEFAULT_PROTOCOL_VERSION.to_string(),
        };

        inner.state = SessionState::Initializing;
        inner.negotiated = Some(Negotiated {
            protocol_version: protocol_version.clone(),
            client_info,
        });
        Ok(protocol_version)
    }

    /// Handle `notifications/initialized`.
    ///
    /// Returns whether the session moved to `Ready`. Out-of-order
    /// notifications leave the state untouched.
    pub fn mark_ready(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == SessionState::Initializing {
            inner.state = SessionState::Ready;
            info!("Session ready");
            true
        } else {
            false
        }
    }

    /// Move to the absorbing `Closed` state.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.state != SessionState::Closed {
            debug!("Session closed (was {:?})", inner.state);
            inner.state = SessionState::Closed;
        }
    }

    /// Fail unless tools may be used right now.
    pub fn require_ready(&self) -> Result<(), ErrorRecord> {
        match self.state() {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(ErrorRecord::not_initialized("Session is closed")),
            _ => Err(ErrorRecord::not_initialized(
                "Session not initialized: send initialize and notifications/initialized first",
            )),
        }
    }
}
