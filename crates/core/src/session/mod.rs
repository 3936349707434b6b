//! RTSP session model (RFC 2326 §3, §12.37).
//!
//! One session exists per control connection. It tracks:
//!
//! - An opaque session ID (hex string, returned in the `Session` header).
//! - The control state: Init -> Ready -> Playing -> Teardown.
//! - Transport parameters (client address and ports) negotiated during SETUP.
//! - The SSRC the client will see on its RTP packets.
//!
//! ## Session lifecycle
//!
//! ```text
//! accept         -> Init
//! SETUP          -> Ready     (from Init or Ready)
//! PLAY           -> Playing   (from Ready)
//! TEARDOWN       -> Teardown  (from any state, connection closed)
//! TCP disconnect -> (dropped, no response)
//! ```
//!
//! Only one session receives media at a time. The server keeps that one in
//! a single slot (see [`crate::stream`]); a later SETUP from another
//! connection takes the slot over.

pub mod transport;

pub use transport::{Transport, TransportHeader};

/// Idle time after which a silent control connection is dropped.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// RTSP control state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, no SETUP yet.
    Init,
    /// SETUP succeeded, transport negotiated.
    Ready,
    /// Media is being delivered.
    Playing,
    /// Terminal; the connection is closed.
    Teardown,
}

/// The session currently holding the media slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub transport: Transport,
    pub ssrc: u32,
}

impl Session {
    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }
}

/// Generate an opaque session token (16 hex digits).
pub fn new_session_id() -> String {
    format!("{:016X}", rand::random::<u64>())
}

/// Format the `Session` response header value per RFC 2326 §12.37.
///
/// Example: `"9F0C3A11D2E4B5C6;timeout=30"`
pub fn session_header_value(id: &str, timeout_secs: u64) -> String {
    format!("{};timeout={}", id, timeout_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_hex_and_distinct() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn header_value_carries_timeout() {
        assert_eq!(session_header_value("ABC", 30), "ABC;timeout=30");
    }
}
