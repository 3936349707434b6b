use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::h264::{DEFAULT_MTU, DEFAULT_PAYLOAD_TYPE};
use crate::media::{AccessUnit, ParameterSetProvider};
use crate::session::DEFAULT_IDLE_TIMEOUT_SECS;
use crate::stream::Stream;
use crate::transport::UdpTransport;
use crate::transport::tcp::{self, ConnectionRegistry};

/// Default RTSP control port.
pub const DEFAULT_PORT: u16 = 8554;

/// Listen on every IPv4 interface at [`DEFAULT_PORT`].
pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT));

/// Server-level configuration used by protocol handlers and the packetizer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host advertised in the SDP `o=` line.
    /// When `None`, the local address of the control connection is used.
    pub public_host: Option<String>,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
    /// RTP payload type for the H.264 stream.
    pub payload_type: u8,
    /// Largest RTP packet (header included) sent on the wire.
    pub mtu: usize,
    /// Silence on a control connection after which it is dropped.
    pub idle_timeout: Duration,
    /// Fixed frame rate for the RTP clock. When `None`, RTP timestamps
    /// follow the access units' presentation times.
    pub frame_rate: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            sdp_session_name: "Android H264".to_string(),
            payload_type: DEFAULT_PAYLOAD_TYPE,
            mtu: DEFAULT_MTU,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            frame_rate: None,
        }
    }
}

/// Single-viewer RTSP server.
///
/// Owns the live [`Stream`] (session slot, packetizer, RTP socket) and the
/// TCP accept loop. The encoder calls [`ingest`](Self::ingest) (or an
/// [`IngestHandle`]) for every access unit it produces.
pub struct Server {
    stream: Arc<Stream>,
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    config: Arc<ServerConfig>,
    connections: ConnectionRegistry,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new<P>(bind_addr: &str, parameter_sets: P) -> Self
    where
        P: ParameterSetProvider + 'static,
    {
        Self::with_config(bind_addr, ServerConfig::default(), parameter_sets)
    }

    /// Create a server with custom protocol/SDP configuration.
    pub fn with_config<P>(bind_addr: &str, config: ServerConfig, parameter_sets: P) -> Self
    where
        P: ParameterSetProvider + 'static,
    {
        let stream = Stream::new(&config, Arc::new(parameter_sets));
        Self {
            stream: Arc::new(stream),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            config: Arc::new(config),
            connections: ConnectionRegistry::new(),
            accept_thread: None,
        }
    }

    /// Bind the RTSP listener and the RTP socket, then start accepting.
    ///
    /// Either bind failing is returned as an error and nothing is left
    /// listening.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        let local_addr = listener.local_addr()?;
        let udp = UdpTransport::bind(local_addr.ip())?;
        let rtp_port = udp.local_port()?;
        listener.set_nonblocking(true)?;

        self.stream.attach(udp);
        self.local_addr = Some(local_addr);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let stream = self.stream.clone();
        let config = self.config.clone();
        let connections = self.connections.clone();

        tracing::info!(addr = %local_addr, rtp_port, "RTSP server listening");

        self.accept_thread = Some(thread::spawn(move || {
            tcp::accept_loop(listener, stream, config, connections, running);
        }));

        Ok(())
    }

    /// Close the listener, all control connections and the RTP socket.
    ///
    /// Clients are not sent a TEARDOWN.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        if let Some(handle) = self.accept_thread.take()
            && handle.join().is_err()
        {
            tracing::warn!("accept loop panicked");
        }
        self.connections.shutdown_all();
        self.stream.close();
        self.local_addr = None;

        if was_running {
            tracing::info!("server stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the RTSP listener is bound to, while running.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// Local port of the RTP socket, while running.
    pub fn rtp_port(&self) -> Result<u16> {
        self.stream.rtp_port().ok_or(RtspError::NotStarted)
    }

    /// SSRC carried by every RTP packet this server sends.
    pub fn ssrc(&self) -> u32 {
        self.stream.ssrc()
    }

    /// Send one access unit to the playing client.
    ///
    /// Runs on the caller's thread and never blocks on the network: a no-op
    /// unless a client is playing, and datagrams that cannot be sent are
    /// dropped. Access units must arrive in presentation order. Returns the
    /// number of datagrams sent.
    pub fn ingest(&self, access_unit: &AccessUnit) -> usize {
        self.stream.ingest(access_unit)
    }

    /// Cloneable handle for the encoder's drain thread.
    pub fn ingest_handle(&self) -> IngestHandle {
        IngestHandle {
            stream: self.stream.clone(),
        }
    }

    /// The client currently receiving media, if any.
    pub fn viewer(&self) -> Option<Viewer> {
        self.stream.viewer()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encoder-side entry point, detached from the [`Server`] value.
///
/// Same contract as [`Server::ingest`]. Outlives a stopped server
/// harmlessly: ingesting then does nothing.
#[derive(Clone)]
pub struct IngestHandle {
    stream: Arc<Stream>,
}

impl IngestHandle {
    pub fn ingest(&self, access_unit: &AccessUnit) -> usize {
        self.stream.ingest(access_unit)
    }
}

/// Information about the connected viewer (client in PLAY state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub session_id: String,
    /// RTP destination (`client_ip:client_rtp_port`).
    pub client_addr: SocketAddr,
    pub client_rtcp_port: u16,
}
