//! Connection status and shared session state.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Status of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// `run` is not executing.
    Offline,
    /// `run` is executing but no session is established.
    Disconnected,
    /// Handshake complete; events are flowing.
    Connected,
}

/// Atomic wrapper for connection status.
#[derive(Debug)]
pub struct AtomicConnectionStatus(AtomicU32);

impl AtomicConnectionStatus {
    /// Create a new atomic status.
    #[must_use]
    pub const fn new(status: ConnectionStatus) -> Self {
        Self(AtomicU32::new(status as u32))
    }

    /// Load the current status.
    #[must_use]
    pub fn load(&self) -> ConnectionStatus {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectionStatus::Offline,
            1 => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Connected,
        }
    }

    /// Store a new status.
    pub fn store(&self, status: ConnectionStatus) {
        self.0.store(status as u32, Ordering::SeqCst);
    }
}

/// Session bookkeeping shared by the control, sender and receiver tasks.
///
/// Only the payload reader writes the sequence number and ack timestamp.
#[derive(Debug)]
pub struct SessionState {
    session_id: Mutex<Option<String>>,
    /// Highest sequence seen in this session; 0 means none yet.
    last_sequence: AtomicU64,
    /// Micros since `epoch` of the last ack, plus one; 0 means never.
    last_ack: AtomicU64,
    reconnect_requested: AtomicBool,
    heartbeat_requested: AtomicBool,
    epoch: Instant,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Empty session state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Mutex::new(None),
            last_sequence: AtomicU64::new(0),
            last_ack: AtomicU64::new(0),
            reconnect_requested: AtomicBool::new(false),
            heartbeat_requested: AtomicBool::new(false),
            epoch: Instant::now(),
        }
    }

    /// Current session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Record a newly established session.
    pub fn begin(&self, session_id: impl Into<String>) {
        *self.session_id.lock() = Some(session_id.into());
    }

    /// Forget the session so the next handshake identifies.
    pub fn clear(&self) {
        *self.session_id.lock() = None;
        self.last_sequence.store(0, Ordering::SeqCst);
    }

    /// Highest sequence seen, if any.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        match self.last_sequence.load(Ordering::SeqCst) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Record a received sequence number. Never moves backwards.
    pub fn observe_sequence(&self, sequence: u64) {
        self.last_sequence.fetch_max(sequence, Ordering::SeqCst);
    }

    /// Record a heartbeat acknowledgement received now.
    pub fn record_ack(&self) {
        self.record_ack_at(Instant::now());
    }

    fn record_ack_at(&self, at: Instant) {
        let micros = at.saturating_duration_since(self.epoch).as_micros() as u64;
        self.last_ack.fetch_max(micros + 1, Ordering::SeqCst);
    }

    /// Whether an ack arrived at or after `sent`.
    #[must_use]
    pub fn acked_since(&self, sent: Instant) -> bool {
        match self.last_ack.load(Ordering::SeqCst) {
            0 => false,
            stored => {
                let sent = sent.saturating_duration_since(self.epoch).as_micros() as u64;
                stored - 1 >= sent
            }
        }
    }

    /// Ask the control task to reconnect.
    pub fn request_reconnect(&self) {
        self.reconnect_requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending reconnect request.
    pub fn take_reconnect_request(&self) -> bool {
        self.reconnect_requested.swap(false, Ordering::SeqCst)
    }

    /// Ask the sender to heartbeat immediately.
    pub fn request_heartbeat(&self) {
        self.heartbeat_requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending heartbeat request.
    pub fn take_heartbeat_request(&self) -> bool {
        self.heartbeat_requested.swap(false, Ordering::SeqCst)
    }
}
