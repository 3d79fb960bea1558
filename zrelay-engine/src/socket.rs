//! Descriptor helpers for the blocking copy loop.

use std::io;
use std::net::Shutdown;
use std::os::fd::AsFd;

use socket2::SockRef;

// ---

/// `true` if `fd` is a socket. Pipes, files and devices are not.
pub(crate) fn is_socket<F: AsFd>(fd: &F) -> bool {
    SockRef::from(fd).r#type().is_ok()
}

// ---

/// Clear `O_NONBLOCK`; the reactor left the socket in non-blocking mode.
pub(crate) fn set_blocking<F: AsFd>(fd: &F) -> io::Result<()> {
    SockRef::from(fd).set_nonblocking(false)
}

// ---

/// Shut down both directions, waking any thread blocked on the socket.
pub(crate) fn shutdown<F: AsFd>(fd: &F) {
    // ---
    if let Err(e) = SockRef::from(fd).shutdown(Shutdown::Both) {
        // Peer already gone, or not a socket at all.
        tracing::trace!("shutdown: {e}");
    }
}
