use std::net::SocketAddr;

/// Client RTP port used when the `Transport` header has no usable `client_port`.
pub const DEFAULT_CLIENT_RTP_PORT: u16 = 5000;

/// Negotiated RTP/RTCP transport parameters for a session (RFC 2326 §12.39).
///
/// Created during SETUP from the client's `Transport` header and the
/// server's RTP socket. Used to address UDP packets.
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=8000-8001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=8000-8001;server_port=40000-40001;ssrc=1A2B3C4D
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,
    /// Local port of the shared RTP socket.
    pub server_rtp_port: u16,
    /// Advertised only; nothing is bound or sent there.
    pub server_rtcp_port: u16,
    /// Full socket address for RTP delivery (`client_ip:client_rtp_port`).
    pub client_addr: SocketAddr,
}

impl Transport {
    /// Value of the `Transport` header in the SETUP response.
    pub fn response_header(&self, ssrc: u32) -> String {
        format!(
            "RTP/AVP;unicast;client_port={}-{};server_port={}-{};ssrc={:08X}",
            self.client_rtp_port,
            self.client_rtcp_port,
            self.server_rtp_port,
            self.server_rtcp_port,
            ssrc
        )
    }
}

/// Client ports requested in the RTSP `Transport` header.
///
/// Parsing never fails: an unparsable RTP port falls back to
/// [`DEFAULT_CLIENT_RTP_PORT`] and a missing or unparsable RTCP port to
/// RTP + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,
}

impl TransportHeader {
    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001");
    /// assert_eq!((th.client_rtp_port, th.client_rtcp_port), (8000, 8001));
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast");
    /// assert_eq!((th.client_rtp_port, th.client_rtcp_port), (5000, 5001));
    /// ```
    pub fn parse(header: &str) -> Self {
        let ports = header
            .split(';')
            .find_map(|part| part.trim().strip_prefix("client_port="))
            .unwrap_or("");

        let mut pair = ports.splitn(2, '-');
        let rtp = pair.next().and_then(|p| p.trim().parse::<u16>().ok());
        let rtcp = pair.next().and_then(|p| p.trim().parse::<u16>().ok());

        if rtp.is_none() {
            tracing::debug!(header, "no usable client_port, using default");
        }

        let client_rtp_port = rtp.unwrap_or(DEFAULT_CLIENT_RTP_PORT);
        TransportHeader {
            client_rtp_port,
            client_rtcp_port: rtcp.unwrap_or(client_rtp_port.wrapping_add(1)),
        }
    }

    /// Whether the client asked for RTP interleaved on the RTSP connection.
    pub fn is_interleaved(header: &str) -> bool {
        header.contains("RTP/AVP/TCP") || header.contains("interleaved=")
    }
}
