/// Size of the RTP fixed header without CSRCs or extensions.
pub const RTP_HEADER_SIZE: usize = 12;

/// RTP clock rate for video (RFC 3551 §5).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// RTP fixed header writer and per-stream state (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The sequence number wraps at 16 bits and is post-incremented on every
/// [`write`](Self::write). The timestamp is set once per access unit with
/// [`set_timestamp`](Self::set_timestamp) so all of its packets share it.
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpHeader {
    /// Create a new RTP header state with explicit SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP header state created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::random::<u32>())
    }

    /// Sequence number the next [`write`](Self::write) will use.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence number.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_SIZE] {
        let mut header = [0u8; RTP_HEADER_SIZE];
        header[0] = 2 << 6;
        header[1] = ((marker as u8) << 7) | (self.pt & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }
}

/// 90 kHz media clock for one PLAY of the stream.
///
/// [`reset`](Self::reset) is called on PLAY; the first access unit after it
/// is stamped 0. Later units are stamped either from their presentation time
/// relative to that first unit, or by a fixed per-frame step when a frame
/// rate is configured.
#[derive(Debug, Clone)]
pub struct MediaClock {
    frame_step: Option<u32>,
    base_us: Option<u64>,
    next_fixed: u64,
}

impl MediaClock {
    /// Clock derived from presentation timestamps.
    pub fn from_presentation_time() -> Self {
        Self {
            frame_step: None,
            base_us: None,
            next_fixed: 0,
        }
    }

    /// Clock advancing by `90000 / fps` per access unit.
    pub fn fixed_rate(fps: u32) -> Self {
        Self {
            frame_step: Some(VIDEO_CLOCK_RATE / fps.max(1)),
            base_us: None,
            next_fixed: 0,
        }
    }

    pub fn reset(&mut self) {
        self.base_us = None;
        self.next_fixed = 0;
    }

    /// Map an access unit's presentation time to a 32-bit RTP timestamp.
    pub fn timestamp(&mut self, pts_us: u64) -> u32 {
        if let Some(step) = self.frame_step {
            let ts = self.next_fixed;
            self.next_fixed = self.next_fixed.wrapping_add(step as u64);
            return ts as u32;
        }

        let base = *self.base_us.get_or_insert(pts_us);
        let elapsed_us = pts_us.saturating_sub(base) as u128;
        (elapsed_us * VIDEO_CLOCK_RATE as u128 / 1_000_000) as u32
    }
}
