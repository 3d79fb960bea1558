//! One relay between a `compress` endpoint and a `to` endpoint.
//!
//! A session resolves both endpoints (handing off any live connections),
//! starts the accelerator exactly once, waits for its single completion, and
//! then releases the descriptors it owns. Caller-supplied descriptors are
//! never closed.

use std::sync::Arc;

// ---

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

// ---

use zrelay_domain::{
    // ---
    Accelerator,
    Completion,
    Endpoint,
    RelayConfig,
    RelayError,
    RelayRequest,
    RelaySide,
    Result,
    STATUS_ABANDONED,
};

// ---------------------------------------------------------------------------
// RelaySession
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RelaySession {
    // ---
    id: Uuid,

    /// Carries plain bytes; its input is compressed toward `to`.
    compress: Endpoint,

    /// Carries the compressed stream.
    to: Endpoint,

    config: RelayConfig,
}

// ---

impl RelaySession {
    // ---
    pub fn new(compress: Endpoint, to: Endpoint, config: RelayConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            compress,
            to,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ---

    /// Run the relay to completion.
    ///
    /// The accelerator is invoked at most once; if either endpoint fails to
    /// resolve it is not invoked at all and whatever was already handed off
    /// is released. A completion without a code (or with code `0`) is
    /// success; any other code becomes [`RelayError::Accelerator`].
    pub async fn run<A>(self, accelerator: &A) -> Result<()>
    where
        A: Accelerator + ?Sized,
    {
        // ---
        let Self {
            id,
            compress,
            to,
            config,
        } = self;

        config.validate()?;

        let compress = compress.resolve()?;
        let to = match to.resolve() {
            Ok(to) => to,
            Err(e) => {
                compress.release();
                return Err(e);
            }
        };

        tracing::info!(
            session = %id,
            compress_fd = ?compress.as_fd(),
            to_fd = ?to.as_fd(),
            compression = config.compression.enabled,
            "connection opened"
        );

        let (tx, rx) = oneshot::channel();
        let completion = Completion::new(move |status| {
            // Receiver gone means the session future was dropped; nothing to tell.
            let _ = tx.send(status);
        });

        accelerator.relay(
            RelayRequest {
                compress: RelaySide {
                    fd: compress.as_fd(),
                    head: compress.head(),
                },
                to: RelaySide {
                    fd: to.as_fd(),
                    head: to.head(),
                },
                config: &config,
            },
            completion,
        );

        // Completion dropped without a send still counts as the one signal.
        let status = rx.await.unwrap_or(Some(STATUS_ABANDONED));

        compress.release();
        to.release();

        match status {
            None | Some(0) => {
                tracing::info!(session = %id, "connection closed");
                Ok(())
            }
            Some(code) => {
                tracing::warn!(session = %id, code, "connection closed with error");
                Err(RelayError::Accelerator { code })
            }
        }
    }

    // ---

    /// Run the session on the tokio runtime and report its outcome through
    /// `on_close`, which fires exactly once.
    pub fn spawn<A, F>(self, accelerator: Arc<A>, on_close: F) -> JoinHandle<()>
    where
        A: Accelerator + ?Sized + 'static,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        // ---
        tokio::spawn(async move {
            let result = self.run(accelerator.as_ref()).await;
            on_close(result);
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
