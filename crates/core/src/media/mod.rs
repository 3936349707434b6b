//! Encoder output types and RTP packetization.
//!
//! The encoder side of the server is described by two things:
//!
//! - [`AccessUnit`]: one encoded frame as length-prefixed NAL units, a
//!   keyframe flag and a presentation timestamp in microseconds. Handed to
//!   [`Server::ingest`](crate::Server::ingest) once and not retained.
//! - [`ParameterSetProvider`]: read access to the most recent SPS/PPS the
//!   encoder has produced. Queried on every DESCRIBE and before every
//!   keyframe is sent, so a client joining late still gets them in-band.
//!
//! ## RTP overview (RFC 3550, RFC 6184)
//!
//! Each access unit becomes one or more RTP packets sharing a single
//! 90 kHz timestamp. The marker bit is set on the last packet of the unit.
//! NAL units that do not fit the MTU are split into FU-A fragments.

pub mod h264;
pub mod nal;
pub mod rtp;

use std::sync::Arc;

use parking_lot::RwLock;

use nal::{NAL_TYPE_IDR, NAL_TYPE_PPS, NAL_TYPE_SPS};

/// One encoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// NAL units, each preceded by a 4-byte big-endian length.
    pub data: Vec<u8>,
    pub is_keyframe: bool,
    /// Capture-domain presentation time in microseconds.
    pub pts_us: u64,
}

impl AccessUnit {
    pub fn new(data: Vec<u8>, is_keyframe: bool, pts_us: u64) -> Self {
        Self {
            data,
            is_keyframe,
            pts_us,
        }
    }

    /// Build an access unit from an Annex B (start code delimited) frame.
    ///
    /// The unit is flagged as a keyframe when it contains an IDR slice.
    pub fn from_annexb(data: &[u8], pts_us: u64) -> Self {
        let nal_units = nal::annexb_nal_units(data);
        let is_keyframe = nal_units
            .iter()
            .any(|n| nal::nal_type(n) == Some(NAL_TYPE_IDR));
        Self::new(nal::to_length_prefixed(nal_units), is_keyframe, pts_us)
    }

    /// Iterate the NAL units of this access unit.
    pub fn nal_units(&self) -> nal::NalUnits<'_> {
        nal::split_nal_units(&self.data)
    }
}

/// Most recently observed SPS and PPS, as raw NAL payloads.
///
/// Either may be empty before the encoder's first keyframe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

impl ParameterSets {
    /// Store SPS/PPS, stripping any start code or length prefix the
    /// encoder left on them.
    pub fn new(sps: &[u8], pps: &[u8]) -> Self {
        Self {
            sps: nal::strip_framing(sps).to_vec(),
            pps: nal::strip_framing(pps).to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sps.is_empty() && self.pps.is_empty()
    }
}

/// Read access to the encoder's current parameter sets.
///
/// Implementations must be cheap and must not block: the server calls this
/// from the encoder's own drain thread before each keyframe.
pub trait ParameterSetProvider: Send + Sync {
    fn parameter_sets(&self) -> ParameterSets;
}

impl<F> ParameterSetProvider for F
where
    F: Fn() -> ParameterSets + Send + Sync,
{
    fn parameter_sets(&self) -> ParameterSets {
        self()
    }
}

/// Thread-safe parameter set store an encoder can write into.
///
/// Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct SharedParameterSets {
    inner: Arc<RwLock<ParameterSets>>,
}

impl SharedParameterSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both parameter sets (e.g. from the encoder's codec config).
    pub fn update(&self, sps: &[u8], pps: &[u8]) {
        let sets = ParameterSets::new(sps, pps);
        tracing::debug!(
            sps_len = sets.sps.len(),
            pps_len = sets.pps.len(),
            "parameter sets updated"
        );
        *self.inner.write() = sets;
    }

    /// Record any SPS/PPS carried in-band by a keyframe.
    ///
    /// Non-keyframes are ignored. Returns `true` when something changed.
    pub fn observe(&self, access_unit: &AccessUnit) -> bool {
        if !access_unit.is_keyframe {
            return false;
        }

        let mut changed = false;
        for nal_unit in access_unit.nal_units() {
            let mut sets = self.inner.write();
            let slot = match nal::nal_type(nal_unit) {
                Some(NAL_TYPE_SPS) => &mut sets.sps,
                Some(NAL_TYPE_PPS) => &mut sets.pps,
                _ => continue,
            };
            if slot.as_slice() != nal_unit {
                *slot = nal_unit.to_vec();
                changed = true;
            }
        }

        if changed {
            tracing::debug!("parameter sets captured from keyframe");
        }
        changed
    }
}

impl ParameterSetProvider for SharedParameterSets {
    fn parameter_sets(&self) -> ParameterSets {
        self.inner.read().clone()
    }
}
