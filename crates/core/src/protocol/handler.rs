use std::net::SocketAddr;
use std::sync::Arc;

use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp::{self, TRACK_CONTROL};
use crate::server::ServerConfig;
use crate::session::transport::TransportHeader;
use crate::session::{self, SessionState, Transport};
use crate::stream::Stream;

/// Methods advertised in the OPTIONS `Public` header.
pub const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN";

/// RTSP control state machine for a single TCP connection.
///
/// Starts in [`SessionState::Init`]. SETUP negotiates the client's UDP ports
/// and takes over the server's single stream slot, PLAY starts delivery,
/// TEARDOWN releases the slot and asks the connection to close.
pub struct RtspSession {
    id: String,
    state: SessionState,
    stream: Arc<Stream>,
    client_addr: SocketAddr,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    /// Set once a SETUP has issued this connection's session token.
    set_up: bool,
}

impl RtspSession {
    pub fn new(
        stream: Arc<Stream>,
        client_addr: SocketAddr,
        local_addr: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Self {
        RtspSession {
            id: session::new_session_id(),
            state: SessionState::Init,
            stream,
            client_addr,
            local_addr,
            config,
            set_up: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq();
        self.sync_with_stream();

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(cseq),
            "DESCRIBE" => self.handle_describe(cseq, &request.uri),
            "SETUP" => self.handle_setup(cseq, request),
            "PLAY" => self.handle_play(cseq, &request.uri),
            "TEARDOWN" => self.handle_teardown(cseq),
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                RtspResponse::not_implemented(cseq)
            }
        }
    }

    /// Connection lost without TEARDOWN: give the stream back silently.
    pub fn close(&mut self) {
        if self.stream.release(&self.id) {
            tracing::info!(session_id = %self.id, "session released on disconnect");
        }
        self.state = SessionState::Teardown;
    }

    /// A later SETUP on another connection may have taken the stream away.
    fn sync_with_stream(&mut self) {
        if matches!(self.state, SessionState::Ready | SessionState::Playing)
            && !self.stream.holds(&self.id)
        {
            tracing::info!(session_id = %self.id, old_state = ?self.state, "session superseded");
            self.state = SessionState::Init;
        }
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(
            session_id = %self.id,
            old_state = ?self.state,
            new_state = ?state,
            "state transition"
        );
        self.state = state;
    }

    fn session_header(&self) -> String {
        session::session_header_value(&self.id, self.config.idle_timeout.as_secs())
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok(cseq).add_header("Public", PUBLIC_METHODS)
    }

    fn sdp_host(&self) -> String {
        match &self.config.public_host {
            Some(host) => host.clone(),
            None => self.local_addr.ip().to_string(),
        }
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");

        let parameter_sets = self.stream.parameter_sets();
        if parameter_sets.is_empty() {
            tracing::debug!("DESCRIBE before first keyframe, parameter sets empty");
        }

        let sdp = sdp::generate_sdp(
            &self.sdp_host(),
            &self.config.sdp_session_name,
            self.stream.payload_type(),
            &parameter_sets,
        );

        RtspResponse::ok(cseq)
            .add_header("Content-Base", uri)
            .add_header("Content-Type", "application/sdp")
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        if !matches!(self.state, SessionState::Init | SessionState::Ready) {
            tracing::warn!(%cseq, state = ?self.state, "SETUP not valid in this state");
            return RtspResponse::method_not_valid(cseq)
                .add_header("Session", &self.session_header());
        }

        let transport_header = request.get_header("Transport").unwrap_or("");

        if TransportHeader::is_interleaved(transport_header) {
            tracing::warn!(
                %cseq,
                transport = %transport_header,
                "client requested TCP transport (not implemented)"
            );
            return RtspResponse::unsupported_transport(cseq).add_header(
                "Unsupported",
                "RTP/AVP/TCP (interleaved) not supported; use RTP/AVP (UDP)",
            );
        }

        let Some(server_rtp_port) = self.stream.rtp_port() else {
            tracing::warn!(%cseq, "SETUP while RTP socket is closed");
            return RtspResponse::new(503, cseq);
        };

        let client_transport = TransportHeader::parse(transport_header);
        let client_rtp_addr =
            SocketAddr::new(self.client_addr.ip(), client_transport.client_rtp_port);

        let transport = Transport {
            client_rtp_port: client_transport.client_rtp_port,
            client_rtcp_port: client_transport.client_rtcp_port,
            server_rtp_port,
            server_rtcp_port: server_rtp_port.wrapping_add(1),
            client_addr: client_rtp_addr,
        };
        let ssrc = self.stream.setup(&self.id, transport.clone());
        let transport_response = transport.response_header(ssrc);
        self.set_up = true;
        self.set_state(SessionState::Ready);

        tracing::info!(
            session_id = %self.id,
            uri = %request.uri,
            client_rtp = %client_rtp_addr,
            server_rtp_port,
            ssrc = format_args!("{:08X}", ssrc),
            "session set up"
        );

        RtspResponse::ok(cseq)
            .add_header("Transport", &transport_response)
            .add_header("Session", &self.session_header())
    }

    fn handle_play(&mut self, cseq: &str, uri: &str) -> RtspResponse {
        if self.state != SessionState::Ready {
            tracing::warn!(%cseq, state = ?self.state, "PLAY without established session");
            return RtspResponse::session_not_found(cseq);
        }

        let Some(seq) = self.stream.play(&self.id) else {
            tracing::warn!(session_id = %self.id, "PLAY lost the stream to another session");
            self.set_state(SessionState::Init);
            return RtspResponse::session_not_found(cseq);
        };

        self.set_state(SessionState::Playing);
        tracing::info!(session_id = %self.id, seq, "session started playing");

        let rtp_info = format!("url={};seq={};rtptime=0", track_url(uri), seq);
        RtspResponse::ok(cseq)
            .add_header("RTP-Info", &rtp_info)
            .add_header("Session", &self.session_header())
    }

    fn handle_teardown(&mut self, cseq: &str) -> RtspResponse {
        self.stream.release(&self.id);
        self.set_state(SessionState::Teardown);
        tracing::info!(session_id = %self.id, "session terminated via TEARDOWN");
        let response = RtspResponse::ok(cseq);
        if self.set_up {
            response.add_header("Session", &self.session_header())
        } else {
            response
        }
    }
}

/// URL of the single track, derived from a PLAY request URL.
fn track_url(uri: &str) -> String {
    if uri.ends_with(TRACK_CONTROL) {
        uri.to_string()
    } else {
        format!("{}/{}", uri.trim_end_matches('/'), TRACK_CONTROL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ParameterSets;
    use crate::transport::UdpTransport;

    fn make_stream() -> Arc<Stream> {
        let provider = || ParameterSets::new(&[0x67, 0x42, 0x00, 0x1e], &[0x68, 0xce, 0x38, 0x80]);
        let stream = Stream::new(&ServerConfig::default(), Arc::new(provider));
        stream.attach(UdpTransport::bind([127, 0, 0, 1].into()).unwrap());
        Arc::new(stream)
    }

    fn make_session(stream: &Arc<Stream>) -> RtspSession {
        RtspSession::new(
            stream.clone(),
            "127.0.0.1:40000".parse().unwrap(),
            "127.0.0.1:8554".parse().unwrap(),
            Arc::new(ServerConfig::default()),
        )
    }

    fn request(method: &str, cseq: u32, extra: &str) -> RtspRequest {
        let raw = format!(
            "{} rtsp://127.0.0.1:8554/stream RTSP/1.0\r\nCSeq: {}\r\n{}\r\n",
            method, cseq, extra
        );
        RtspRequest::parse(&raw).unwrap()
    }

    fn setup(session: &mut RtspSession, cseq: u32) -> RtspResponse {
        session.handle(&request(
            "SETUP",
            cseq,
            "Transport: RTP/AVP;unicast;client_port=6000-6001\r\n",
        ))
    }

    #[test]
    fn options_lists_methods_in_any_state() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request("OPTIONS", 1, ""));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("Public"), Some(PUBLIC_METHODS));
        assert_eq!(resp.header("CSeq"), Some("1"));
        assert_eq!(s.state(), SessionState::Init);
    }

    #[test]
    fn describe_returns_sdp() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request("DESCRIBE", 2, ""));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("Content-Base"), Some("rtsp://127.0.0.1:8554/stream"));
        assert_eq!(resp.header("Content-Type"), Some("application/sdp"));
        let body = resp.body.as_deref().unwrap();
        assert!(body.contains("o=- 0 0 IN IP4 127.0.0.1\r\n"));
        assert!(body.contains("sprop-parameter-sets=Z0IAHg==,aM44gA=="));
        assert_eq!(s.state(), SessionState::Init);
    }

    #[test]
    fn setup_negotiates_transport() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = setup(&mut s, 3);
        assert_eq!(resp.status_code, 200);
        let transport = resp.header("Transport").unwrap();
        assert!(transport.starts_with("RTP/AVP;unicast;client_port=6000-6001;server_port="));
        assert!(transport.contains(&format!(";ssrc={:08X}", stream.ssrc())));
        assert!(resp.header("Session").unwrap().starts_with(s.id()));
        assert_eq!(s.state(), SessionState::Ready);
        assert!(stream.holds(s.id()));
    }

    #[test]
    fn setup_with_malformed_transport_uses_defaults() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request("SETUP", 3, "Transport: RTP/AVP;unicast;client_port=xyz\r\n"));
        assert_eq!(resp.status_code, 200);
        assert!(resp.header("Transport").unwrap().contains("client_port=5000-5001"));
    }

    #[test]
    fn setup_interleaved_rejected() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request(
            "SETUP",
            3,
            "Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n",
        ));
        assert_eq!(resp.status_code, 461);
        assert_eq!(s.state(), SessionState::Init);
    }

    #[test]
    fn play_before_setup_is_454() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request("PLAY", 4, ""));
        assert_eq!(resp.status_code, 454);
        assert_eq!(s.state(), SessionState::Init);
    }

    #[test]
    fn play_after_setup() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        setup(&mut s, 3);
        let resp = s.handle(&request("PLAY", 4, ""));
        assert_eq!(resp.status_code, 200);
        assert_eq!(
            resp.header("RTP-Info"),
            Some("url=rtsp://127.0.0.1:8554/stream/trackID=0;seq=0;rtptime=0")
        );
        assert!(resp.header("Session").is_some());
        assert_eq!(s.state(), SessionState::Playing);
        assert!(stream.viewer().is_some());

        // Already playing: not READY, so 454.
        assert_eq!(s.handle(&request("PLAY", 5, "")).status_code, 454);
        assert_eq!(s.state(), SessionState::Playing);
        // Re-SETUP while playing.
        assert_eq!(setup(&mut s, 6).status_code, 455);
    }

    #[test]
    fn second_connection_supersedes_first() {
        let stream = make_stream();
        let mut a = make_session(&stream);
        let mut b = make_session(&stream);
        setup(&mut a, 1);
        a.handle(&request("PLAY", 2, ""));

        setup(&mut b, 1);
        assert!(stream.viewer().is_none());

        // A is back to INIT, so a new PLAY is refused.
        assert_eq!(a.handle(&request("PLAY", 3, "")).status_code, 454);
        assert_eq!(a.state(), SessionState::Init);

        assert_eq!(b.handle(&request("PLAY", 2, "")).status_code, 200);
        assert_eq!(stream.viewer().unwrap().session_id, b.id());
    }

    #[test]
    fn teardown_releases_stream() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        setup(&mut s, 1);
        s.handle(&request("PLAY", 2, ""));
        let resp = s.handle(&request("TEARDOWN", 3, ""));
        assert_eq!(resp.status_code, 200);
        assert!(resp.header("Session").is_some());
        assert_eq!(s.state(), SessionState::Teardown);
        assert!(!stream.holds(s.id()));
    }

    #[test]
    fn teardown_without_setup_has_no_session_header() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request("TEARDOWN", 2, ""));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("Session"), None);
        assert_eq!(s.state(), SessionState::Teardown);
    }

    #[test]
    fn unknown_method_is_501() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        let resp = s.handle(&request("GET_PARAMETER", 7, ""));
        assert_eq!(resp.status_code, 501);
        assert_eq!(resp.header("CSeq"), Some("7"));
    }

    #[test]
    fn close_releases_silently() {
        let stream = make_stream();
        let mut s = make_session(&stream);
        setup(&mut s, 1);
        s.close();
        assert!(!stream.holds(s.id()));
    }

    #[test]
    fn track_url_forms() {
        assert_eq!(track_url("rtsp://h/s"), "rtsp://h/s/trackID=0");
        assert_eq!(track_url("rtsp://h/s/"), "rtsp://h/s/trackID=0");
        assert_eq!(track_url("rtsp://h/s/trackID=0"), "rtsp://h/s/trackID=0");
    }
}
