use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum RelayError {
    // ---
    #[error("invalid socket file descriptor")]
    InvalidDescriptor,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("accelerator error {code}")]
    Accelerator { code: i32 },

    #[error("failed to establish {side} endpoint: {source}")]
    Establishment {
        side: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("hop {hop} failed: {source}")]
    Hop {
        hop: String,
        #[source]
        source: Box<RelayError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ---

pub type Result<T> = std::result::Result<T, RelayError>;
