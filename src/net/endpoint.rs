//! Connected UDP socket with blocking, timeout-bounded I/O.
//!
//! The endpoint binds its local address and `connect(2)`s the remote one, so
//! every subsequent send and receive uses the kernel-held peer. A connected
//! UDP socket also reports ICMP "port unreachable" back through `recv` as
//! `ECONNREFUSED`, which the RX worker treats as a transient condition while
//! the remote node is not yet listening.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::trace::info;

/// Error opening or using a [`UdpEndpoint`], naming the failing step.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("failed to create UDP socket: {0}")]
    Create(#[source] io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),
}

/// A bound-and-connected UDP socket.
///
/// Concurrent `send` from one thread and `recv` from another is permitted;
/// the kernel serializes each direction independently.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpEndpoint {
    /// Creates a datagram socket, sets `SO_REUSEADDR`, binds `src`, and
    /// connects to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] identifying which step failed; the
    /// partially configured socket is closed on the way out.
    pub fn open(src: SocketAddr, dst: SocketAddr) -> Result<Self, EndpointError> {
        let socket = Socket::new(Domain::for_address(src), Type::DGRAM, Some(Protocol::UDP))
            .map_err(EndpointError::Create)?;
        socket
            .set_reuse_address(true)
            .map_err(EndpointError::Create)?;
        socket
            .bind(&src.into())
            .map_err(|source| EndpointError::Bind { addr: src, source })?;
        socket
            .connect(&dst.into())
            .map_err(|source| EndpointError::Connect { addr: dst, source })?;

        let socket: UdpSocket = socket.into();
        info!(src = %src, dst = %dst, "UDP endpoint open");

        Ok(Self { socket, peer: dst })
    }

    /// Blocking unicast send to the connected peer.
    ///
    /// # Errors
    ///
    /// Propagates the OS send error.
    #[inline]
    pub fn send(&self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send(bytes)
    }

    /// Blocking receive, bounded by the configured receive timeout.
    ///
    /// # Errors
    ///
    /// A timeout surfaces as `WouldBlock`/`TimedOut`; see [`is_transient`]
    /// for the errors a receive loop should retry on.
    #[inline]
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }

    /// Sets the receive timeout used by [`UdpEndpoint::recv`].
    ///
    /// # Errors
    ///
    /// Returns an error if the socket option cannot be set.
    pub fn set_recv_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl AsFd for UdpEndpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }
}

/// Whether a receive error is a retry opportunity rather than a reason to
/// terminate the worker loop: interrupted-by-signal, would-block/timeout, or
/// the peer-unreachable report a connected UDP socket surfaces while the
/// remote is not yet listening.
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
    )
}
