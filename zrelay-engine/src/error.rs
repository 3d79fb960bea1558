//! Error types for `zrelay-engine`.

use std::io;

use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum EngineError {
    // ---
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("read error: {0}")]
    Read(io::Error),

    #[error("cannot allocate a {0} byte transfer buffer")]
    Alloc(usize),

    #[error("zstd error: {0}")]
    Codec(io::Error),

    #[error("failed to spawn relay thread: {0}")]
    Spawn(io::Error),

    #[error("relay thread panicked")]
    Panicked,
}

// ---

impl EngineError {
    // ---
    /// Sort a sink error: socket failures carry an errno, codec failures
    /// surfaced by the zstd writer do not.
    pub(crate) fn from_sink(e: io::Error) -> Self {
        // ---
        if e.raw_os_error().is_some() {
            EngineError::Io(e)
        } else {
            EngineError::Codec(e)
        }
    }

    // ---

    /// A failed read after the other direction shut both sockets down is
    /// the shutdown itself, not lost data. Write and codec failures are not.
    pub(crate) fn is_shutdown_artefact(&self) -> bool {
        matches!(self, EngineError::Read(_))
    }

    // ---

    /// Numeric completion status for this failure.
    pub fn status(&self) -> i32 {
        // ---
        match self {
            EngineError::Io(e) | EngineError::Read(e) | EngineError::Spawn(e) => {
                e.raw_os_error().unwrap_or(libc::EIO)
            }
            EngineError::Alloc(_) => libc::ENOMEM,
            EngineError::Codec(_) => libc::EBADMSG,
            EngineError::Panicked => zrelay_domain::STATUS_ABANDONED,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn status_prefers_errno() {
        // ---
        let err = EngineError::from_sink(io::Error::from_raw_os_error(libc::EPIPE));
        assert!(matches!(err, EngineError::Io(_)));
        assert_eq!(err.status(), libc::EPIPE);
    }

    #[test]
    fn errno_less_sink_error_is_codec() {
        // ---
        let err = EngineError::from_sink(io::Error::other("Unknown frame descriptor"));
        assert!(matches!(err, EngineError::Codec(_)));
        assert_eq!(err.status(), libc::EBADMSG);
    }

    #[test]
    fn errno_less_io_error_falls_back_to_eio() {
        // ---
        let err = EngineError::Io(io::Error::new(io::ErrorKind::WriteZero, "short write"));
        assert_eq!(err.status(), libc::EIO);
    }

    #[test]
    fn failed_allocation_is_enomem() {
        // ---
        assert_eq!(EngineError::Alloc(usize::MAX).status(), libc::ENOMEM);
    }

    #[test]
    fn only_read_failures_count_as_shutdown_artefacts() {
        // ---
        let read = EngineError::Read(io::Error::from_raw_os_error(libc::ECONNRESET));
        assert!(read.is_shutdown_artefact());
        assert_eq!(read.status(), libc::ECONNRESET);

        let write = EngineError::from_sink(io::Error::from_raw_os_error(libc::EPIPE));
        assert!(!write.is_shutdown_artefact());
        assert!(!EngineError::Alloc(1).is_shutdown_artefact());
    }
}
