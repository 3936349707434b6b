//! SDP (Session Description Protocol) generation (RFC 4566).
//!
//! Produces the SDP body returned by DESCRIBE responses:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 0 0 IN IP4 <server-ip>                   ← origin
//! s=Android H264                               ← session name
//! t=0 0                                        ← timing (live stream)
//! a=control:*                                  ← aggregate control
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1; sprop-parameter-sets=<SPS>,<PPS>
//! a=control:trackID=0                          ← track control URL
//! ```
//!
//! The parameter sets are base64 encoded from whatever the encoder has
//! reported so far. Before the first keyframe both fields are empty, which
//! still yields a well-formed description.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::media::ParameterSets;
use crate::media::rtp::VIDEO_CLOCK_RATE;

/// Track control attribute; SETUP URLs end in this.
pub const TRACK_CONTROL: &str = "trackID=0";

/// Generate the SDP session description for the H.264 stream.
pub fn generate_sdp(
    ip: &str,
    session_name: &str,
    payload_type: u8,
    parameter_sets: &ParameterSets,
) -> String {
    let sprop = format!(
        "{},{}",
        BASE64_STANDARD.encode(&parameter_sets.sps),
        BASE64_STANDARD.encode(&parameter_sets.pps)
    );

    let sdp = [
        "v=0".to_string(),
        format!("o=- 0 0 IN IP4 {}", ip),
        format!("s={}", session_name),
        "t=0 0".to_string(),
        "a=control:*".to_string(),
        format!("m=video 0 RTP/AVP {}", payload_type),
        format!("a=rtpmap:{} H264/{}", payload_type, VIDEO_CLOCK_RATE),
        format!(
            "a=fmtp:{} packetization-mode=1; sprop-parameter-sets={}",
            payload_type, sprop
        ),
        format!("a=control:{}", TRACK_CONTROL),
    ];

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
