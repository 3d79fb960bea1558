//! Core types and the accelerator contract for the zrelay compressing relay.
//!
//! This crate defines the vocabulary of the system. The byte-moving engine
//! lives in `zrelay-engine`; sessions and hop topology in `zrelay-session`.
//!
//! # Structure
//!
//! - [`error`]       - [`RelayError`] and [`Result<T>`] alias
//! - [`endpoint`]    - [`Connection`] hand-off, [`Endpoint`], [`ResolvedEndpoint`]
//! - [`config`]      - [`RelayConfig`] and backend [`Capabilities`]
//! - [`accelerator`] - [`Accelerator`] trait, [`RelayRequest`], [`Completion`]

mod accelerator;
mod config;
mod endpoint;
mod error;

// --- error
pub use error::{RelayError, Result};

// --- endpoint
pub use endpoint::{Connection, Endpoint, ResolvedEndpoint};

// --- config
pub use config::{
    // ---
    AcceleratorConfig,
    Capabilities,
    CompressionConfig,
    RelayConfig,
    DEFAULT_BUFFER_SIZE,
    DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_QUEUE_DEPTH,
    MAX_BUFFER_SIZE,
};

// --- accelerator
pub use accelerator::{
    // ---
    Accelerator,
    Completion,
    RelayRequest,
    RelaySide,
    STATUS_ABANDONED,
};
