use std::net::{IpAddr, SocketAddr, UdpSocket};

use crate::error::Result;

/// UDP transport for outbound RTP packet delivery.
///
/// Binds a single ephemeral socket and sends RTP packets to whichever
/// client currently holds the stream. The socket is non-blocking: a full
/// send buffer drops the datagram instead of stalling the encoder thread.
///
/// This layer is address-only; it does not know about sessions.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket on the wildcard address of `family`'s
    /// IP version.
    pub fn bind(family: IpAddr) -> Result<Self> {
        let wildcard: IpAddr = match family {
            IpAddr::V4(_) => [0, 0, 0, 0].into(),
            IpAddr::V6(_) => [0u16; 8].into(),
        };
        let socket = UdpSocket::bind(SocketAddr::new(wildcard, 0))?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }
}
