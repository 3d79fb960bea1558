use std::os::fd::BorrowedFd;

// ---

use bytes::Bytes;

// ---

use super::config::RelayConfig;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Completion status reported when a backend drops its [`Completion`]
/// without firing it.
pub const STATUS_ABANDONED: i32 = -1;

// ---------------------------------------------------------------------------
// RelaySide
// ---------------------------------------------------------------------------

/// One side of a relay request: a descriptor and the bytes that precede it.
#[derive(Debug, Clone, Copy)]
pub struct RelaySide<'a> {
    // ---
    pub fd: BorrowedFd<'a>,

    /// Relayed (through the codec for this side) before any descriptor read.
    pub head: Option<&'a Bytes>,
}

// ---------------------------------------------------------------------------
// RelayRequest
// ---------------------------------------------------------------------------

/// Everything an accelerator needs to run one duplex relay.
///
/// Plain bytes read from `compress` are compressed and written to `to`;
/// compressed bytes read from `to` are decompressed and written to
/// `compress`. The borrowed descriptors are only valid for the duration of
/// [`Accelerator::relay`]; a backend that outlives the call must duplicate
/// them.
#[derive(Debug, Clone, Copy)]
pub struct RelayRequest<'a> {
    // ---
    pub compress: RelaySide<'a>,
    pub to: RelaySide<'a>,
    pub config: &'a RelayConfig,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

type Callback = Box<dyn FnOnce(Option<i32>) + Send + 'static>;

/// The single completion signal of a relay.
///
/// `None` means clean shutdown; `Some(code)` is a backend failure. Firing
/// consumes the value, and dropping it unfired reports
/// [`STATUS_ABANDONED`], so the callback runs exactly once either way.
pub struct Completion {
    // ---
    callback: Option<Callback>,
}

// ---

impl Completion {
    // ---
    pub fn new(callback: impl FnOnce(Option<i32>) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    // ---

    pub fn complete(mut self, status: Option<i32>) {
        // ---
        if let Some(callback) = self.callback.take() {
            callback(status);
        }
    }
}

// ---

impl Drop for Completion {
    fn drop(&mut self) {
        // ---
        if let Some(callback) = self.callback.take() {
            tracing::warn!("relay completion dropped without a status");
            callback(Some(STATUS_ABANDONED));
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Accelerator
// ---------------------------------------------------------------------------

/// The byte-moving engine behind a relay session.
///
/// `relay` must not block: it starts the transfer and returns. The backend
/// fires `completion` exactly once when both directions have stopped.
///
/// Implementations: `zrelay_engine::CopyEngine`.
pub trait Accelerator: Send + Sync {
    // ---
    fn relay(&self, request: RelayRequest<'_>, completion: Completion);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    // ---

    #[test]
    fn complete_fires_once_with_status() {
        // ---
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        Completion::new(move |status| sink.lock().unwrap().push(status)).complete(Some(104));

        assert_eq!(*seen.lock().unwrap(), vec![Some(104)]);
    }

    // ---

    #[test]
    fn dropped_completion_reports_abandoned() {
        // ---
        let calls = Arc::new(AtomicUsize::new(0));
        let status = Arc::new(Mutex::new(None));
        let (c, s) = (Arc::clone(&calls), Arc::clone(&status));

        drop(Completion::new(move |code| {
            c.fetch_add(1, Ordering::SeqCst);
            *s.lock().unwrap() = code;
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*status.lock().unwrap(), Some(STATUS_ABANDONED));
    }
}
