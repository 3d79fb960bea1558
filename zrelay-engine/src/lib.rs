//! Portable relay backend for zrelay.
//!
//! Implements [`zrelay_domain::Accelerator`] with blocking reads and writes on
//! duplicated descriptors, one thread per direction, and streaming zstd on
//! the compressed leg. Every chunk is flushed as its own zstd block, so the
//! far side can decode each message as soon as it arrives.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use zrelay_engine::CopyEngine;
//!
//! let engine = Arc::new(CopyEngine::new());
//! // hand `engine` to zrelay_session::RelaySession::run / spawn
//! ```

mod engine;
mod error;
mod pump;
mod socket;

pub use engine::CopyEngine;
pub use error::EngineError;
