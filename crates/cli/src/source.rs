//! Looping H.264 elementary-stream source for demos and testing players.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rtsp::media::nal::{
    self, NAL_TYPE_AUD, NAL_TYPE_IDR, NAL_TYPE_PPS, NAL_TYPE_SEI, NAL_TYPE_SLICE, NAL_TYPE_SPS,
};
use rtsp::{AccessUnit, IngestHandle, SharedParameterSets};

/// Access units of an Annex B file, as length-prefixed frames.
pub struct FileSource {
    frames: Vec<AccessUnit>,
    frame_interval: Duration,
}

impl FileSource {
    pub fn open(path: &Path, fps: u32) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        let frames = group_access_units(&nal::annexb_nal_units(&data));
        if frames.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "no H.264 access units found",
            ));
        }
        tracing::info!(path = %path.display(), frames = frames.len(), "loaded elementary stream");
        Ok(Self {
            frames,
            frame_interval: Duration::from_micros(1_000_000 / fps.max(1) as u64),
        })
    }

    /// Feed frames in a loop until `running` is cleared, like an encoder
    /// drain thread would.
    pub fn run(
        self,
        encoder: IngestHandle,
        parameter_sets: SharedParameterSets,
        running: Arc<AtomicBool>,
    ) {
        let start = Instant::now();
        let mut next = start;
        let mut sent_frames: u64 = 0;

        while running.load(Ordering::SeqCst) {
            for frame in &self.frames {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let pts_us = start.elapsed().as_micros() as u64;
                let au = AccessUnit::new(frame.data.clone(), frame.is_keyframe, pts_us);
                parameter_sets.observe(&au);
                encoder.ingest(&au);
                sent_frames += 1;

                next += self.frame_interval;
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
            tracing::debug!(sent_frames, "elementary stream looped");
        }
    }
}

fn is_vcl(nal_type: u8) -> bool {
    (NAL_TYPE_SLICE..=NAL_TYPE_IDR).contains(&nal_type)
}

/// `first_mb_in_slice == 0` is coded as a single `1` bit, so the first
/// payload byte has its top bit set.
fn starts_new_picture(nal_unit: &[u8]) -> bool {
    nal_unit.get(1).is_some_and(|b| b & 0x80 != 0)
}

/// Group a flat NAL sequence into access units (H.264 §7.4.1.2.3, simplified).
fn group_access_units(nal_units: &[&[u8]]) -> Vec<AccessUnit> {
    let mut frames = Vec::new();
    let mut current: Vec<&[u8]> = Vec::new();
    let mut has_vcl = false;

    let mut flush = |current: &mut Vec<&[u8]>| {
        if current.is_empty() {
            return;
        }
        let is_keyframe = current.iter().any(|n| nal::nal_type(n) == Some(NAL_TYPE_IDR));
        frames.push(AccessUnit::new(
            nal::to_length_prefixed(current.drain(..)),
            is_keyframe,
            0,
        ));
    };

    for &nal_unit in nal_units {
        let Some(nal_type) = nal::nal_type(nal_unit) else {
            continue;
        };

        let boundary = match nal_type {
            NAL_TYPE_AUD | NAL_TYPE_SPS | NAL_TYPE_PPS | NAL_TYPE_SEI => has_vcl,
            t if is_vcl(t) => has_vcl && starts_new_picture(nal_unit),
            _ => false,
        };
        if boundary {
            flush(&mut current);
            has_vcl = false;
        }

        if is_vcl(nal_type) {
            has_vcl = true;
        }
        current.push(nal_unit);
    }
    flush(&mut current);

    frames
}
