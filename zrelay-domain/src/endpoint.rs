//! Endpoints and the descriptor hand-off.
//!
//! A [`Connection`] starts out *scheduled*: the tokio reactor polls its
//! descriptor and the handle can be read or written through `AsyncRead` /
//! `AsyncWrite` (protocol handshakes use this). [`Connection::disown`] moves
//! it to *detached* exactly once: the socket is deregistered from the reactor
//! and its descriptor is returned as an [`OwnedFd`]. Every later I/O attempt
//! on the handle fails with [`io::ErrorKind::NotConnected`].
//!
//! ```text
//!   Scheduled ──disown()──▶ Detached
//!      │                       │
//!   AsyncRead/Write         I/O → error, disown() → InvalidDescriptor
//! ```

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

// ---

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

// ---

use super::error::{RelayError, Result};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

// ---

impl Transport {
    // ---
    fn raw_fd(&self) -> RawFd {
        match self {
            Transport::Tcp(stream) => stream.as_raw_fd(),
            Transport::Unix(stream) => stream.as_raw_fd(),
        }
    }

    // ---

    /// Deregister from the reactor and surrender the descriptor.
    fn into_owned_fd(self) -> io::Result<OwnedFd> {
        // ---
        match self {
            Transport::Tcp(stream) => {
                // Nagle would hold back small relayed writes.
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("set_nodelay before hand-off failed: {e}");
                }
                Ok(OwnedFd::from(stream.into_std()?))
            }
            Transport::Unix(stream) => Ok(OwnedFd::from(stream.into_std()?)),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A live, reactor-driven connection that can be handed off once.
pub struct Connection {
    // ---
    /// `None` once the descriptor has been handed off.
    transport: Option<Transport>,
}

// ---

impl Connection {
    // ---
    /// `true` once [`Connection::disown`] has succeeded.
    pub fn is_detached(&self) -> bool {
        self.transport.is_none()
    }

    // ---

    /// Raw descriptor while still scheduled; `None` after hand-off.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.transport.as_ref().map(Transport::raw_fd)
    }

    // ---

    /// Take exclusive ownership of the underlying descriptor.
    ///
    /// The socket is removed from the reactor, so nothing in the runtime
    /// will poll, read or write it again. The descriptor stays open and is
    /// owned by the returned [`OwnedFd`]. Returns
    /// [`RelayError::InvalidDescriptor`] if the handle was already detached.
    pub fn disown(&mut self) -> Result<OwnedFd> {
        // ---
        let transport = self
            .transport
            .take()
            .ok_or(RelayError::InvalidDescriptor)?;

        let fd = transport.into_owned_fd()?;
        tracing::debug!(fd = fd.as_raw_fd(), "connection handed off");
        Ok(fd)
    }
}

// ---

impl From<TcpStream> for Connection {
    fn from(stream: TcpStream) -> Self {
        Self {
            transport: Some(Transport::Tcp(stream)),
        }
    }
}

impl From<UnixStream> for Connection {
    fn from(stream: UnixStream) -> Self {
        Self {
            transport: Some(Transport::Unix(stream)),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("fd", &self.raw_fd())
            .finish()
    }
}

// ---

fn handed_off() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection handed off")
}

// ---

impl AsyncRead for Connection {
    // ---
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // ---
        match self.get_mut().transport.as_mut() {
            Some(Transport::Tcp(stream)) => Pin::new(stream).poll_read(cx, buf),
            Some(Transport::Unix(stream)) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(handed_off())),
        }
    }
}

// ---

impl AsyncWrite for Connection {
    // ---
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        // ---
        match self.get_mut().transport.as_mut() {
            Some(Transport::Tcp(stream)) => Pin::new(stream).poll_write(cx, data),
            Some(Transport::Unix(stream)) => Pin::new(stream).poll_write(cx, data),
            None => Poll::Ready(Err(handed_off())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // ---
        match self.get_mut().transport.as_mut() {
            Some(Transport::Tcp(stream)) => Pin::new(stream).poll_flush(cx),
            Some(Transport::Unix(stream)) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(handed_off())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // ---
        match self.get_mut().transport.as_mut() {
            Some(Transport::Tcp(stream)) => Pin::new(stream).poll_shutdown(cx),
            Some(Transport::Unix(stream)) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Err(handed_off())),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One side of a relay session.
#[derive(Debug)]
pub enum Endpoint {
    // ---
    /// An already-open descriptor owned by the caller, used as-is.
    ///
    /// The caller must keep it open until the session completes. Sessions
    /// never close it.
    Descriptor(RawFd),

    /// A scheduled connection plus bytes already read from it.
    ///
    /// `head` is the prefix of the stream: it is relayed before anything
    /// read from the descriptor after hand-off.
    Connection {
        conn: Connection,
        head: Option<Bytes>,
    },
}

// ---

impl Endpoint {
    // ---
    pub fn descriptor(fd: RawFd) -> Self {
        Endpoint::Descriptor(fd)
    }

    // ---

    pub fn connection(conn: impl Into<Connection>) -> Self {
        Endpoint::Connection {
            conn: conn.into(),
            head: None,
        }
    }

    // ---

    /// Connection with pre-read bytes. An empty `head` is treated as none.
    pub fn with_head(conn: impl Into<Connection>, head: Option<Bytes>) -> Self {
        // ---
        Endpoint::Connection {
            conn: conn.into(),
            head: head.filter(|bytes| !bytes.is_empty()),
        }
    }

    // ---

    /// Perform the deferred hand-off and produce a descriptor ready for the
    /// accelerator.
    ///
    /// Deferred until the session consumes the endpoint so a connection is
    /// never detached before its peer side exists.
    pub fn resolve(self) -> Result<ResolvedEndpoint> {
        // ---
        match self {
            Endpoint::Descriptor(fd) if fd < 0 => Err(RelayError::InvalidDescriptor),
            Endpoint::Descriptor(fd) => Ok(ResolvedEndpoint {
                fd: Held::Borrowed(fd),
                head: None,
            }),
            Endpoint::Connection { mut conn, head } => Ok(ResolvedEndpoint {
                fd: Held::Owned(conn.disown()?),
                head,
            }),
        }
    }
}

// ---

impl From<Connection> for Endpoint {
    fn from(conn: Connection) -> Self {
        Endpoint::connection(conn)
    }
}

impl From<TcpStream> for Endpoint {
    fn from(stream: TcpStream) -> Self {
        Endpoint::connection(stream)
    }
}

impl From<UnixStream> for Endpoint {
    fn from(stream: UnixStream) -> Self {
        Endpoint::connection(stream)
    }
}

// ---------------------------------------------------------------------------
// ResolvedEndpoint
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Held {
    Owned(OwnedFd),
    Borrowed(RawFd),
}

/// A handed-off endpoint: a live descriptor plus its head bytes.
///
/// Descriptors taken from a [`Connection`] are owned and closed exactly once,
/// by [`ResolvedEndpoint::release`] or on drop. Caller descriptors are only
/// borrowed and are never closed.
#[derive(Debug)]
pub struct ResolvedEndpoint {
    fd: Held,
    head: Option<Bytes>,
}

// ---

impl ResolvedEndpoint {
    // ---
    pub fn as_fd(&self) -> BorrowedFd<'_> {
        // ---
        match &self.fd {
            Held::Owned(fd) => fd.as_fd(),
            // SAFETY: `Endpoint::Descriptor` requires the caller to keep the
            // descriptor open until the session completes, and `resolve`
            // rejected negative values.
            Held::Borrowed(fd) => unsafe { BorrowedFd::borrow_raw(*fd) },
        }
    }

    pub fn head(&self) -> Option<&Bytes> {
        self.head.as_ref()
    }

    /// `true` when the session owns (and will close) the descriptor.
    pub fn is_owned(&self) -> bool {
        matches!(self.fd, Held::Owned(_))
    }

    // ---

    /// Close the descriptor if this endpoint owns it.
    pub fn release(self) {
        // ---
        if let Held::Owned(fd) = self.fd {
            tracing::debug!(fd = fd.as_raw_fd(), "released connection");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::io::Write;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    // ---

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        // ---
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    // ---

    #[tokio::test]
    async fn disown_detaches_exactly_once() {
        // ---
        let (local, _peer) = tcp_pair().await;
        let mut conn = Connection::from(local);
        let before = conn.raw_fd().expect("scheduled connection has a descriptor");

        let fd = conn.disown().expect("first hand-off succeeds");
        assert_eq!(fd.as_raw_fd(), before, "hand-off keeps the same descriptor");
        assert!(conn.is_detached());
        assert_eq!(conn.raw_fd(), None);

        let err = conn.disown().unwrap_err();
        assert!(matches!(err, RelayError::InvalidDescriptor), "got: {err}");
    }

    // ---

    #[tokio::test]
    async fn detached_handle_refuses_io() {
        // ---
        let (local, _peer) = tcp_pair().await;
        let mut conn = Connection::from(local);
        let _fd = conn.disown().unwrap();

        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let err = conn.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    // ---

    /// The descriptor stays open and usable after leaving the reactor.
    #[tokio::test]
    async fn disowned_descriptor_still_carries_bytes() {
        // ---
        let (local, mut peer) = tcp_pair().await;
        let mut conn = Connection::from(local);
        let fd = conn.disown().unwrap();

        let mut std_stream = std::net::TcpStream::from(fd);
        std_stream.set_nonblocking(false).unwrap();
        std_stream.write_all(b"ping").unwrap();

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    // ---

    #[tokio::test]
    async fn release_closes_owned_descriptor() {
        // ---
        let (local, mut peer) = tcp_pair().await;
        let resolved = Endpoint::from(local).resolve().unwrap();
        assert!(resolved.is_owned());
        assert!(resolved.head().is_none());

        resolved.release();

        let mut buf = [0u8; 1];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "peer should observe EOF after release");
    }

    // ---

    #[tokio::test]
    async fn head_bytes_survive_resolution() {
        // ---
        let (local, _peer) = tcp_pair().await;
        let endpoint = Endpoint::with_head(local, Some(Bytes::from_static(b"yo")));
        let resolved = endpoint.resolve().unwrap();
        assert_eq!(resolved.head().map(|b| &b[..]), Some(&b"yo"[..]));
    }

    // ---

    #[tokio::test]
    async fn empty_head_is_none() {
        // ---
        let (local, _peer) = tcp_pair().await;
        match Endpoint::with_head(local, Some(Bytes::new())) {
            Endpoint::Connection { head, .. } => assert!(head.is_none()),
            other => panic!("unexpected endpoint {other:?}"),
        }
    }

    // ---

    #[test]
    fn descriptor_endpoint_is_borrowed() {
        // ---
        let file = std::fs::File::open("/dev/null").unwrap();
        let raw = file.as_raw_fd();

        let resolved = Endpoint::descriptor(raw).resolve().unwrap();
        assert!(!resolved.is_owned());
        assert!(resolved.head().is_none());
        assert_eq!(resolved.as_fd().as_raw_fd(), raw);
        resolved.release();

        // Still open: metadata on the caller's handle works.
        assert!(file.metadata().is_ok());
    }

    // ---

    #[test]
    fn negative_descriptor_rejected() {
        // ---
        let err = Endpoint::descriptor(-1).resolve().unwrap_err();
        assert!(matches!(err, RelayError::InvalidDescriptor));
    }
}
