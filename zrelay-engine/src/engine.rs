//! [`CopyEngine`]: portable [`Accelerator`] backend.
//!
//! # Design
//!
//! Every relay gets one supervisor thread. It duplicates nothing itself: the
//! descriptors were already duplicated in [`CopyEngine::relay`] while the
//! caller's borrow was alive, so the session may close its copies as soon as
//! completion fires. The supervisor runs the decompress direction inline and
//! the compress direction on a scoped thread:
//!
//! ```text
//!   compress fd ──read──▶ zstd compress ──write──▶ to fd
//!   compress fd ◀─write── zstd decompress ◀─read── to fd
//! ```
//!
//! Completion fires once both directions have returned.

use std::fs::File;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::thread;

// ---

use zrelay_domain::{
    // ---
    Accelerator,
    Capabilities,
    Completion,
    RelayConfig,
    RelayRequest,
    RelaySide,
};

// ---

use super::pump::{Codec, Pump, Side};
use super::socket;
use super::EngineError;

// ---------------------------------------------------------------------------
// CopyEngine
// ---------------------------------------------------------------------------

/// Blocking duplex copy loop with optional zstd compression.
///
/// Runs everywhere; it has no kernel fast path, so accelerator features in
/// the request are switched off before the relay starts.
#[derive(Debug, Default, Clone)]
pub struct CopyEngine {
    // ---
    caps: Capabilities,
}

// ---

impl CopyEngine {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    // ---

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }
}

// ---

impl Accelerator for CopyEngine {
    // ---
    fn relay(&self, request: RelayRequest<'_>, completion: Completion) {
        // ---
        let config = request.config.effective(&self.caps);

        let relay = match Relay::prepare(&request, config) {
            Ok(relay) => relay,
            Err(e) => {
                tracing::warn!("relay setup failed: {e}");
                completion.complete(Some(e.status()));
                return;
            }
        };

        // The completion is handed over only once the thread exists, so a
        // spawn failure can still report its errno.
        let (completion_tx, completion_rx) = mpsc::sync_channel::<Completion>(1);

        let spawned = thread::Builder::new()
            .name("zrelay-relay".into())
            .spawn(move || {
                let status = relay.run();
                if let Ok(completion) = completion_rx.recv() {
                    completion.complete(status);
                }
            });

        match spawned {
            Ok(_) => {
                // A send error means the thread died first; the returned
                // completion is dropped here and reports itself abandoned.
                let _ = completion_tx.send(completion);
            }
            Err(e) => {
                let e = EngineError::Spawn(e);
                tracing::error!("{e}");
                completion.complete(Some(e.status()));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

struct Relay {
    // ---
    compress: Side,
    to: Side,
    config: RelayConfig,
}

// ---

impl Relay {
    // ---
    fn prepare(request: &RelayRequest<'_>, config: RelayConfig) -> Result<Self, EngineError> {
        // ---
        tracing::debug!(
            compression = config.compression.enabled,
            level = config.compression.level,
            buffer_size = config.buffer_size,
            queue_depth = config.accelerator.queue_depth,
            "starting relay"
        );

        Ok(Self {
            compress: prepare_side(request.compress)?,
            to: prepare_side(request.to)?,
            config,
        })
    }

    // ---

    /// Run both directions; `None` on clean shutdown.
    fn run(self) -> Option<i32> {
        // ---
        let stop = AtomicBool::new(false);

        let compress_dir = Pump {
            name: "compress",
            source: &self.compress,
            sink: &self.to,
            codec: Codec::Compress,
            config: &self.config,
            stop: &stop,
        };
        let decompress_dir = Pump {
            name: "decompress",
            source: &self.to,
            sink: &self.compress,
            codec: Codec::Decompress,
            config: &self.config,
            stop: &stop,
        };

        let (compressed, decompressed) = thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name("zrelay-compress".into())
                .spawn_scoped(scope, move || compress_dir.run());

            let handle = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    socket::shutdown(&self.compress.file);
                    socket::shutdown(&self.to.file);
                    return (Err(EngineError::Spawn(e)), Ok(0));
                }
            };

            let decompressed = decompress_dir.run();
            let compressed = handle.join().unwrap_or(Err(EngineError::Panicked));
            (compressed, decompressed)
        });

        let mut status = None;
        for (direction, result) in [("compress", compressed), ("decompress", decompressed)] {
            match result {
                Ok(bytes) => tracing::debug!(direction, bytes, "relay direction done"),
                Err(e) => {
                    tracing::warn!(direction, "relay direction failed: {e}");
                    status = status.or(Some(e.status()));
                }
            }
        }
        status
    }
}

// ---

/// Duplicate the borrowed descriptor and put sockets in blocking mode.
fn prepare_side(side: RelaySide<'_>) -> Result<Side, EngineError> {
    // ---
    let file = File::from(side.fd.try_clone_to_owned()?);
    let is_socket = socket::is_socket(&file);

    if is_socket {
        socket::set_blocking(&file)?;
    }

    Ok(Side {
        file,
        head: side.head.cloned(),
        socket: is_socket,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
