//! H.264 NAL unit framing.
//!
//! Encoders hand over access units in the length-prefixed (AVCC) layout:
//! every NAL unit is preceded by a 4-byte big-endian size and no start code.
//! [`split_nal_units`] walks that layout lazily. [`annexb_nal_units`] handles
//! the start-code delimited Annex B layout used by raw `.h264` files and some
//! codec-config blobs.

/// Size of the big-endian length field in front of each NAL unit.
pub const LENGTH_PREFIX_SIZE: usize = 4;

pub const NAL_TYPE_MASK: u8 = 0x1f;
pub const NAL_NRI_MASK: u8 = 0x60;

pub const NAL_TYPE_SLICE: u8 = 1;
pub const NAL_TYPE_IDR: u8 = 5;
pub const NAL_TYPE_SEI: u8 = 6;
pub const NAL_TYPE_SPS: u8 = 7;
pub const NAL_TYPE_PPS: u8 = 8;
pub const NAL_TYPE_AUD: u8 = 9;

/// NAL unit type from the first header byte, or `None` for an empty unit.
pub fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| b & NAL_TYPE_MASK)
}

/// Lazy iterator over the NAL units of a length-prefixed access unit.
///
/// Yields borrowed slices without the length field. Iteration stops at the
/// first truncated length field or at a length that runs past the end of the
/// buffer; everything before the malformed entry is still yielded.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    offset: usize,
}

/// Split a length-prefixed access unit into its NAL units.
///
/// ```
/// use rtsp::media::nal::split_nal_units;
///
/// let au = [0, 0, 0, 2, 0x65, 0xAA, 0, 0, 0, 1, 0x41];
/// let nals: Vec<&[u8]> = split_nal_units(&au).collect();
/// assert_eq!(nals, vec![&[0x65, 0xAA][..], &[0x41][..]]);
/// ```
pub fn split_nal_units(data: &[u8]) -> NalUnits<'_> {
    NalUnits { data, offset: 0 }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.offset..];
        let prefix: [u8; LENGTH_PREFIX_SIZE] = rest.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
        let len = u32::from_be_bytes(prefix) as usize;

        let body = &rest[LENGTH_PREFIX_SIZE..];
        if len > body.len() {
            tracing::trace!(
                declared = len,
                available = body.len(),
                "length field exceeds access unit, dropping tail"
            );
            self.offset = self.data.len();
            return None;
        }

        self.offset += LENGTH_PREFIX_SIZE + len;
        Some(&body[..len])
    }
}

impl std::iter::FusedIterator for NalUnits<'_> {}

/// Extract NAL units from an H.264 Annex B bitstream.
///
/// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte `00 00 01`)
/// and returns the NAL data between them, excluding the start codes. The
/// start code length is tracked per NAL so boundaries stay correct when
/// both forms appear in one stream.
pub fn annexb_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut nal_units = Vec::new();
    let mut i = 0usize;

    // (nal_data_start_index, start_code_length)
    let mut start_entries: Vec<(usize, usize)> = Vec::new();

    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
            start_entries.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            start_entries.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    for (idx, &(start, _)) in start_entries.iter().enumerate() {
        let end = match start_entries.get(idx + 1) {
            Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
            None => data.len(),
        };

        if start < end {
            nal_units.push(&data[start..end]);
        }
    }

    nal_units
}

/// Write NAL units in the length-prefixed layout [`split_nal_units`] reads.
pub fn to_length_prefixed<'a, I>(nal_units: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = Vec::new();
    for nal in nal_units {
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Strip framing an encoder may leave on a single codec-config NAL unit.
///
/// Removes a leading Annex B start code, or a 4-byte length prefix whose
/// value equals the number of bytes that follow it. Anything else is
/// returned untouched.
pub fn strip_framing(nal: &[u8]) -> &[u8] {
    // Length check first: a 256..511 byte unit has a prefix of 00 00 01 xx.
    if let Some(prefix) = nal.get(..LENGTH_PREFIX_SIZE) {
        let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let rest = &nal[LENGTH_PREFIX_SIZE..];
        if declared > 0 && declared == rest.len() {
            return rest;
        }
    }
    if let Some(rest) = nal.strip_prefix(&[0, 0, 0, 1]) {
        return rest;
    }
    if let Some(rest) = nal.strip_prefix(&[0, 0, 1]) {
        return rest;
    }
    nal
}
