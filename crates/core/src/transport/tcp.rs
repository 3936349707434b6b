use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::protocol::request::{DEFAULT_CSEQ, salvage_cseq};
use crate::protocol::{RtspRequest, RtspResponse, RtspSession};
use crate::server::ServerConfig;
use crate::session::SessionState;
use crate::stream::Stream;

/// Largest request head (request line and headers) a client may send.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Open control connections, kept so [`Server::stop`](crate::Server::stop)
/// can unblock their reads.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    streams: Arc<Mutex<HashMap<u64, TcpStream>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, stream: &TcpStream) -> Option<u64> {
        let clone = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.streams.lock().insert(id, clone);
        Some(id)
    }

    fn unregister(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    /// Shut down every open connection; their request loops then exit.
    pub fn shutdown_all(&self) {
        let streams: Vec<TcpStream> = self.streams.lock().drain().map(|(_, s)| s).collect();
        if !streams.is_empty() {
            tracing::debug!(count = streams.len(), "closing control connections");
        }
        for stream in streams {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(
    listener: TcpListener,
    stream: Arc<Stream>,
    config: Arc<ServerConfig>,
    connections: ConnectionRegistry,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((tcp, _)) => {
                if tcp.set_nonblocking(false).is_err() {
                    continue;
                }
                let s = stream.clone();
                let c = config.clone();
                let reg = connections.clone();
                let r = running.clone();
                thread::spawn(move || {
                    Connection::handle(tcp, s, c, reg, r);
                });
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP client connection with its own lifecycle.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    session: RtspSession,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        tcp: TcpStream,
        stream: Arc<Stream>,
        config: Arc<ServerConfig>,
        connections: ConnectionRegistry,
        running: Arc<AtomicBool>,
    ) {
        let (peer_addr, local_addr) = match (tcp.peer_addr(), tcp.local_addr()) {
            (Ok(peer), Ok(local)) => (peer, local),
            _ => return,
        };

        if let Err(e) = tcp.set_read_timeout(Some(config.idle_timeout)) {
            tracing::warn!(%peer_addr, error = %e, "could not set idle timeout");
            return;
        }

        let reader_stream = match tcp.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let Some(registration) = connections.register(&tcp) else {
            return;
        };

        let session = RtspSession::new(stream, peer_addr, local_addr, config);
        tracing::info!(%peer_addr, session_id = %session.id(), "client connected");

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: tcp,
            session,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.session.close();
        connections.unregister(registration);
        let _ = conn.writer.shutdown(Shutdown::Both);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let request_text = match self.read_head() {
                Ok(Some(text)) => text,
                Ok(None) => return "connection closed by client",
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return "idle timeout";
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "unreadable request head");
                    let response = RtspResponse::bad_request(DEFAULT_CSEQ);
                    let _ = self.writer.write_all(response.serialize().as_bytes());
                    return "bad request head";
                }
                Err(_) => return "read error",
            };

            if request_text.trim().is_empty() {
                continue;
            }

            let response = match RtspRequest::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        uri = %request.uri,
                        version = %request.version,
                        "request"
                    );

                    if let Some(len) = request.content_length()
                        && len > 0
                        && self.discard_body(len).is_err()
                    {
                        return "read error";
                    }

                    self.session.handle(&request)
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    RtspResponse::bad_request(&salvage_cseq(&request_text))
                }
            };

            tracing::debug!(peer = %self.peer_addr, status = response.status_code, "response");

            if self
                .writer
                .write_all(response.serialize().as_bytes())
                .is_err()
            {
                return "write error";
            }

            if self.session.state() == SessionState::Teardown {
                return "teardown";
            }
        }

        "server shutting down"
    }

    /// Read one request head up to the blank line. `None` on end of stream.
    ///
    /// A head longer than [`MAX_REQUEST_HEAD`] fails with `InvalidData`, as
    /// does one that is not UTF-8.
    fn read_head(&mut self) -> io::Result<Option<String>> {
        let mut request_text = String::new();
        loop {
            let remaining = MAX_REQUEST_HEAD.saturating_sub(request_text.len());
            if remaining == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "request head too large",
                ));
            }
            let mut line = String::new();
            if (&mut self.reader)
                .take(remaining as u64)
                .read_line(&mut line)?
                == 0
            {
                return Ok(None);
            }
            request_text.push_str(&line);
            if line == "\r\n" || line == "\n" {
                return Ok(Some(request_text));
            }
        }
    }

    fn discard_body(&mut self, len: usize) -> io::Result<()> {
        let copied = io::copy(&mut (&mut self.reader).take(len as u64), &mut io::sink())?;
        if copied < len as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }
}
