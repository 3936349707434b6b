//! The single live stream and the one session allowed to receive it.
//!
//! The session slot, RTP packetizer (sequence number and SSRC), media clock
//! and UDP socket sit behind one mutex. A SETUP arriving on another
//! connection therefore cannot interleave with an `ingest` that is halfway
//! through writing an access unit, and there is only ever one sequence
//! counter on the wire.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::media::h264::H264Packetizer;
use crate::media::rtp::MediaClock;
use crate::media::{AccessUnit, ParameterSetProvider, ParameterSets};
use crate::server::{ServerConfig, Viewer};
use crate::session::{Session, SessionState, Transport};
use crate::transport::UdpTransport;

/// Live H.264 stream shared by the control connections and the encoder.
pub struct Stream {
    inner: Mutex<StreamInner>,
    parameter_sets: Arc<dyn ParameterSetProvider>,
}

struct StreamInner {
    session: Option<Session>,
    packetizer: H264Packetizer,
    clock: MediaClock,
    udp: Option<UdpTransport>,
}

impl Stream {
    pub fn new(config: &ServerConfig, parameter_sets: Arc<dyn ParameterSetProvider>) -> Self {
        let clock = match config.frame_rate {
            Some(fps) => MediaClock::fixed_rate(fps),
            None => MediaClock::from_presentation_time(),
        };
        Self {
            inner: Mutex::new(StreamInner {
                session: None,
                packetizer: H264Packetizer::with_random_ssrc(config.payload_type)
                    .with_mtu(config.mtu),
                clock,
                udp: None,
            }),
            parameter_sets,
        }
    }

    /// Install the RTP socket (server start).
    pub fn attach(&self, udp: UdpTransport) {
        self.inner.lock().udp = Some(udp);
    }

    /// Drop the RTP socket and the current session (server stop).
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.udp = None;
        if let Some(session) = inner.session.take() {
            tracing::debug!(session_id = %session.id, "session dropped on stream close");
        }
    }

    /// Local port of the RTP socket, if the server is running.
    pub fn rtp_port(&self) -> Option<u16> {
        self.inner.lock().udp.as_ref()?.local_port().ok()
    }

    pub fn ssrc(&self) -> u32 {
        self.inner.lock().packetizer.ssrc()
    }

    pub fn payload_type(&self) -> u8 {
        self.inner.lock().packetizer.payload_type()
    }

    /// Current SPS/PPS as reported by the encoder.
    pub fn parameter_sets(&self) -> ParameterSets {
        self.parameter_sets.parameter_sets()
    }

    /// Give the stream to a newly set up session, replacing any previous one.
    ///
    /// Returns the SSRC the session will receive.
    pub fn setup(&self, id: &str, transport: Transport) -> u32 {
        let mut inner = self.inner.lock();
        let ssrc = inner.packetizer.ssrc();

        if let Some(previous) = &inner.session
            && previous.id != id
        {
            tracing::info!(
                previous = %previous.id,
                session_id = id,
                "new SETUP supersedes current session"
            );
        }

        let session = inner.session.insert(Session {
            id: id.to_string(),
            state: SessionState::Ready,
            transport,
            ssrc,
        });
        session.ssrc
    }

    /// Start delivery to session `id` and reset the media clock.
    ///
    /// Returns the next RTP sequence number, or `None` when `id` no longer
    /// holds the stream or is not in the Ready state.
    pub fn play(&self, id: &str) -> Option<u16> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let session = inner.session.as_mut().filter(|s| s.id == id)?;
        if session.state != SessionState::Ready {
            return None;
        }
        session.state = SessionState::Playing;
        inner.clock.reset();
        Some(inner.packetizer.next_sequence())
    }

    /// Whether session `id` still holds the stream.
    pub fn holds(&self, id: &str) -> bool {
        self.inner
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.id == id)
    }

    /// Release the stream if session `id` holds it (TEARDOWN or disconnect).
    pub fn release(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.session.as_ref().is_some_and(|s| s.id == id) {
            inner.session = None;
            tracing::debug!(session_id = id, "stream released");
            return true;
        }
        false
    }

    /// The session currently receiving media, if any.
    pub fn viewer(&self) -> Option<Viewer> {
        let inner = self.inner.lock();
        let session = inner.session.as_ref().filter(|s| s.is_playing())?;
        Some(Viewer {
            session_id: session.id.clone(),
            client_addr: session.transport.client_addr,
            client_rtcp_port: session.transport.client_rtcp_port,
        })
    }

    /// Packetize one access unit and send it to the playing session.
    ///
    /// A no-op unless a session is playing. Send failures are dropped per
    /// packet and do not stop the rest of the unit. Returns the number of
    /// datagrams handed to the socket.
    pub fn ingest(&self, access_unit: &AccessUnit) -> usize {
        let parameter_sets = access_unit
            .is_keyframe
            .then(|| self.parameter_sets.parameter_sets());

        let mut inner = self.inner.lock();
        let StreamInner {
            session,
            packetizer,
            clock,
            udp,
        } = &mut *inner;

        let (Some(session), Some(udp)) = (session.as_ref(), udp.as_ref()) else {
            return 0;
        };
        if !session.is_playing() {
            return 0;
        }
        let dest = session.transport.client_addr;

        let nal_units: Vec<&[u8]> = access_unit.nal_units().collect();
        let timestamp = clock.timestamp(access_unit.pts_us);
        let packets = packetizer.packetize(&nal_units, timestamp, parameter_sets.as_ref());

        let mut sent = 0;
        for packet in &packets {
            match udp.send_to(packet, dest) {
                Ok(_) => sent += 1,
                Err(e) => tracing::trace!(%dest, error = %e, "RTP send failed, dropping packet"),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::nal::to_length_prefixed;
    use std::net::{SocketAddr, UdpSocket};
    use std::time::Duration;

    fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn transport_to(addr: SocketAddr) -> Transport {
        Transport {
            client_rtp_port: addr.port(),
            client_rtcp_port: addr.port() + 1,
            server_rtp_port: 0,
            server_rtcp_port: 1,
            client_addr: addr,
        }
    }

    fn make_stream() -> Stream {
        let stream = Stream::new(&ServerConfig::default(), Arc::new(ParameterSets::default));
        stream.attach(UdpTransport::bind([127, 0, 0, 1].into()).unwrap());
        stream
    }

    fn frame(len: usize) -> AccessUnit {
        AccessUnit::new(to_length_prefixed([&vec![0x41; len][..]]), false, 0)
    }

    #[test]
    fn ingest_requires_playing_session() {
        let stream = make_stream();
        let (_rx, addr) = receiver();
        assert_eq!(stream.ingest(&frame(10)), 0);

        stream.setup("A", transport_to(addr));
        assert_eq!(stream.ingest(&frame(10)), 0);
        assert!(stream.viewer().is_none());

        assert_eq!(stream.play("A"), Some(0));
        assert_eq!(stream.ingest(&frame(10)), 1);
        assert_eq!(stream.viewer().unwrap().session_id, "A");
    }

    #[test]
    fn play_only_from_ready() {
        let stream = make_stream();
        let (_rx, addr) = receiver();
        assert_eq!(stream.play("A"), None);
        stream.setup("A", transport_to(addr));
        assert!(stream.play("A").is_some());
        assert_eq!(stream.play("A"), None);
    }

    #[test]
    fn new_setup_supersedes_playing_session() {
        let stream = make_stream();
        let (_rx_a, addr_a) = receiver();
        let (rx_b, addr_b) = receiver();

        stream.setup("A", transport_to(addr_a));
        stream.play("A");
        assert_eq!(stream.ingest(&frame(10)), 1);

        stream.setup("B", transport_to(addr_b));
        assert!(!stream.holds("A"));
        assert_eq!(stream.play("A"), None);
        assert_eq!(stream.ingest(&frame(10)), 0);

        // Sequence numbers continue across sessions.
        assert_eq!(stream.play("B"), Some(1));
        assert_eq!(stream.ingest(&frame(10)), 1);
        let mut buf = [0u8; 64];
        let n = rx_b.recv(&mut buf).unwrap();
        assert_eq!(n, 22);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 1);
    }

    #[test]
    fn release_only_by_holder() {
        let stream = make_stream();
        let (_rx, addr) = receiver();
        stream.setup("A", transport_to(addr));
        assert!(!stream.release("B"));
        assert!(stream.holds("A"));
        assert!(stream.release("A"));
        assert!(!stream.holds("A"));
    }

    #[test]
    fn closed_stream_sends_nothing() {
        let stream = make_stream();
        let (_rx, addr) = receiver();
        stream.setup("A", transport_to(addr));
        stream.play("A");
        stream.close();
        assert_eq!(stream.ingest(&frame(10)), 0);
        assert!(stream.rtp_port().is_none());
    }
}
