use super::ParameterSets;
use super::nal::{NAL_NRI_MASK, NAL_TYPE_MASK};
use super::rtp::{RTP_HEADER_SIZE, RtpHeader};

pub const DEFAULT_MTU: usize = 1400;

/// H.264 dynamic payload type used for all media packets.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

const FU_A_TYPE: u8 = 28;
const FU_HEADER_SIZE: usize = 2;
const FU_START_BIT: u8 = 0x80;
const FU_END_BIT: u8 = 0x40;

/// H.264 RTP packetizer (RFC 6184, packetization-mode=1).
///
/// Turns the NAL units of one access unit into RTP packets:
///
/// - **Single NAL Unit** (§5.6): a NAL whose packet (12-byte header + NAL)
///   fits within the MTU is sent as-is.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split. Each fragment
///   carries a 2-byte FU header before the NAL payload:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 14 bytes)
///   ```
///
/// On keyframes the current SPS and PPS are sent first as single NAL
/// packets, so a client that attached mid-stream can start decoding.
///
/// The marker bit is set on the last packet of the access unit only. All
/// packets of a unit share one timestamp.
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    mtu: usize,
}

impl H264Packetizer {
    /// Create with explicit payload type and SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        // Room for the RTP header, FU header and at least one payload byte.
        self.mtu = mtu.max(RTP_HEADER_SIZE + FU_HEADER_SIZE + 1);
        self
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.header.pt
    }

    /// Sequence number of the next packet (for the `RTP-Info` header).
    pub fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    /// Packetize one access unit.
    ///
    /// `parameter_sets` is `Some` for keyframes; non-empty SPS/PPS in it are
    /// emitted ahead of the unit's own NAL units. Empty NAL units are
    /// skipped. An access unit with no NAL units produces no packets.
    pub fn packetize(
        &mut self,
        nal_units: &[&[u8]],
        timestamp: u32,
        parameter_sets: Option<&ParameterSets>,
    ) -> Vec<Vec<u8>> {
        let nal_units: Vec<&[u8]> = nal_units.iter().copied().filter(|n| !n.is_empty()).collect();
        let mut packets = Vec::new();
        if nal_units.is_empty() {
            return packets;
        }

        self.header.set_timestamp(timestamp);

        if let Some(sets) = parameter_sets {
            for ps in [&sets.sps, &sets.pps] {
                if !ps.is_empty() {
                    self.packetize_nal(ps, false, &mut packets);
                }
            }
        }

        let last = nal_units.len() - 1;
        for (i, nal) in nal_units.iter().enumerate() {
            self.packetize_nal(nal, i == last, &mut packets);
        }

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            keyframe = parameter_sets.is_some(),
            seq = self.header.sequence(),
            ts = timestamp,
            "access unit packetized"
        );

        packets
    }

    /// Packetize a single non-empty NAL unit into one or more RTP packets.
    fn packetize_nal(&mut self, nal_unit: &[u8], is_last_nal: bool, packets: &mut Vec<Vec<u8>>) {
        if RTP_HEADER_SIZE + nal_unit.len() <= self.mtu {
            let hdr = self.header.write(is_last_nal);
            let mut packet = Vec::with_capacity(RTP_HEADER_SIZE + nal_unit.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(nal_unit);
            packets.push(packet);
            return;
        }

        let nal_header = nal_unit[0];
        let nal_type = nal_header & NAL_TYPE_MASK;
        // F and NRI bits carry over to the FU indicator.
        let fu_indicator = (nal_header & (0x80 | NAL_NRI_MASK)) | FU_A_TYPE;
        let payload = &nal_unit[1..];

        let max_fragment = self.mtu - RTP_HEADER_SIZE - FU_HEADER_SIZE;
        let fragments = payload.chunks(max_fragment);
        let count = fragments.len();

        for (i, chunk) in fragments.enumerate() {
            let first = i == 0;
            let last_fragment = i + 1 == count;

            let start_bit = if first { FU_START_BIT } else { 0 };
            let end_bit = if last_fragment { FU_END_BIT } else { 0 };
            let fu_header = start_bit | end_bit | nal_type;

            let hdr = self.header.write(is_last_nal && last_fragment);

            let mut packet = Vec::with_capacity(RTP_HEADER_SIZE + FU_HEADER_SIZE + chunk.len());
            packet.extend_from_slice(&hdr);
            packet.push(fu_indicator);
            packet.push(fu_header);
            packet.extend_from_slice(chunk);
            packets.push(packet);
        }

        tracing::trace!(
            nal_type,
            nal_size = nal_unit.len(),
            fragments = count,
            "FU-A fragmented NAL unit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &[u8] = &[];

    fn make_packetizer() -> H264Packetizer {
        H264Packetizer::new(96, 0xAABBCCDD)
    }

    fn seq(packet: &[u8]) -> u16 {
        u16::from_be_bytes([packet[2], packet[3]])
    }

    fn marker(packet: &[u8]) -> bool {
        packet[1] & 0x80 != 0
    }

    fn timestamp(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]])
    }

    #[test]
    fn small_nals_one_packet_each() {
        let mut p = make_packetizer();
        let a = vec![0x41; 50];
        let b = vec![0x41; 30];
        let packets = p.packetize(&[&a[..], &b[..]], 3000, None);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].len(), 62);
        assert_eq!(&packets[0][12..], &a[..]);
        assert!(!marker(&packets[0]));
        assert!(marker(&packets[1]));
        assert_eq!(seq(&packets[0]), 0);
        assert_eq!(seq(&packets[1]), 1);
        assert_eq!(p.next_sequence(), 2);
    }

    #[test]
    fn keyframe_prepends_parameter_sets() {
        let mut p = make_packetizer();
        let sets = ParameterSets {
            sps: vec![0x67, 0x42, 0x00, 0x1e],
            pps: vec![0x68, 0xce, 0x38, 0x80],
        };
        let idr = vec![0x65; 100];
        let packets = p.packetize(&[&idr[..]], 9000, Some(&sets));
        assert_eq!(packets.len(), 3);
        assert_eq!(&packets[0][12..], &sets.sps[..]);
        assert_eq!(&packets[1][12..], &sets.pps[..]);
        assert_eq!(packets.iter().filter(|pk| marker(pk)).count(), 1);
        assert!(marker(&packets[2]));
        assert!(packets.iter().all(|pk| timestamp(pk) == 9000));
    }

    #[test]
    fn keyframe_with_empty_parameter_sets() {
        let mut p = make_packetizer();
        let idr = vec![0x65; 10];
        let packets = p.packetize(&[&idr[..]], 0, Some(&ParameterSets::default()));
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn mtu_boundary() {
        let mut p = make_packetizer();
        let fits = vec![0x41; DEFAULT_MTU - RTP_HEADER_SIZE];
        assert_eq!(p.packetize(&[&fits[..]], 0, None).len(), 1);

        let too_big = vec![0x41; DEFAULT_MTU - RTP_HEADER_SIZE + 1];
        let packets = p.packetize(&[&too_big[..]], 0, None);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][12] & 0x1f, 28);
    }

    #[test]
    fn large_nal_fragmented_and_reassembles() {
        let mut p = make_packetizer();
        let mut nal = vec![0x65]; // NRI=3, type 5
        nal.extend((0..5000u32).map(|i| (i % 251) as u8));
        let packets = p.packetize(&[&nal[..]], 1234, None);

        let expected = (nal.len() - 1).div_ceil(DEFAULT_MTU - 14);
        assert_eq!(packets.len(), expected);

        for (i, pk) in packets.iter().enumerate() {
            assert!(pk.len() <= DEFAULT_MTU);
            assert_eq!(pk[12], 0x60 | 28);
            assert_eq!(pk[13] & 0x1f, 5);
            assert_eq!(pk[13] & 0x80 != 0, i == 0);
            assert_eq!(pk[13] & 0x40 != 0, i == packets.len() - 1);
            assert_eq!(marker(pk), i == packets.len() - 1);
            assert_eq!(seq(pk), i as u16);
            assert_eq!(timestamp(pk), 1234);
        }
        for pk in &packets[..packets.len() - 1] {
            assert_eq!(pk.len(), DEFAULT_MTU);
        }

        let mut rebuilt = vec![(packets[0][12] & 0xe0) | (packets[0][13] & 0x1f)];
        for pk in &packets {
            rebuilt.extend_from_slice(&pk[14..]);
        }
        assert_eq!(rebuilt, nal);
    }

    #[test]
    fn fragmented_non_last_nal_has_no_marker() {
        let mut p = make_packetizer();
        let big = vec![0x41; 3000];
        let small = vec![0x41; 10];
        let packets = p.packetize(&[&big[..], &small[..]], 0, None);
        assert_eq!(packets.len(), 4);
        assert_eq!(packets.iter().filter(|pk| marker(pk)).count(), 1);
        assert!(marker(packets.last().unwrap()));
        assert_eq!(packets[2][13] & 0x40, 0x40);
    }

    #[test]
    fn empty_access_unit_no_packets() {
        let mut p = make_packetizer();
        assert!(p.packetize(&[], 0, None).is_empty());
        assert!(p.packetize(&[EMPTY], 0, Some(&ParameterSets::new(&[0x67], &[0x68]))).is_empty());
        assert_eq!(p.next_sequence(), 0);
    }

    #[test]
    fn trailing_empty_nal_keeps_marker_on_last_real_nal() {
        let mut p = make_packetizer();
        let a = vec![0x41; 5];
        let packets = p.packetize(&[&a[..], EMPTY], 0, None);
        assert_eq!(packets.len(), 1);
        assert!(marker(&packets[0]));
    }

    #[test]
    fn sequence_continues_across_access_units() {
        let mut p = make_packetizer();
        let a = vec![0x41; 5];
        for expected in 0..5u16 {
            let packets = p.packetize(&[&a[..]], expected as u32 * 3000, None);
            assert_eq!(seq(&packets[0]), expected);
        }
    }

    #[test]
    fn smaller_mtu() {
        let mut p = make_packetizer().with_mtu(200);
        let nal = vec![0x41; 1000];
        let packets = p.packetize(&[&nal[..]], 0, None);
        assert_eq!(packets.len(), 999usize.div_ceil(186));
        assert!(packets.iter().all(|pk| pk.len() <= 200));
    }
}
