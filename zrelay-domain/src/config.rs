use super::error::{RelayError, Result};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

/// Default number of in-flight operations per direction on the fast path.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Default per-direction transfer buffer size: 1 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Largest transfer buffer a session may ask for; each direction holds one.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// CompressionConfig
// ---------------------------------------------------------------------------

/// zstd settings for the compressed leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    // ---
    /// `false` relays both directions verbatim.
    pub enabled: bool,

    /// zstd compression level. The backend clamps it to the supported range.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

// ---------------------------------------------------------------------------
// AcceleratorConfig
// ---------------------------------------------------------------------------

/// Fast-path transfer settings.
///
/// Passed through to the backend untouched. A backend that lacks a feature
/// reports so through [`Capabilities`] and the feature is switched off by
/// [`RelayConfig::effective`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceleratorConfig {
    // ---
    /// `false` forces the portable copy path.
    pub enabled: bool,

    /// Pending operations queued per direction. Memory use is roughly
    /// `queue_depth * 2 * buffer_size` per connection.
    pub queue_depth: usize,

    /// Use zero-copy sends where supported.
    pub zero_copy: bool,

    /// Register transfer buffers with the kernel up front.
    pub fixed_buffers: bool,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            zero_copy: true,
            fixed_buffers: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// What a backend can actually do on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub accelerated: bool,
    pub zero_copy: bool,
    pub fixed_buffers: bool,
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Immutable per-session configuration handed to the accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    // ---
    pub compression: CompressionConfig,
    pub accelerator: AcceleratorConfig,

    /// Size in bytes of each transfer buffer.
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            accelerator: AcceleratorConfig::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

// ---

impl RelayConfig {
    // ---
    /// Same settings with compression switched off.
    pub fn uncompressed() -> Self {
        // ---
        Self {
            compression: CompressionConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ---

    /// Reject values no backend can run with.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.buffer_size == 0 {
            return Err(RelayError::InvalidArgument(
                "buffer size must be greater than zero".into(),
            ));
        }

        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(RelayError::InvalidArgument(format!(
                "buffer size {} exceeds the {MAX_BUFFER_SIZE} byte limit",
                self.buffer_size
            )));
        }

        // Only the accelerated path consumes the queue depth.
        if self.accelerator.enabled && self.accelerator.queue_depth == 0 {
            return Err(RelayError::InvalidArgument(
                "accelerator queue depth must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    // ---

    /// Downgrade fast-path features `caps` does not support.
    pub fn effective(&self, caps: &Capabilities) -> Self {
        // ---
        let mut config = self.clone();

        if !caps.accelerated {
            if config.accelerator.enabled {
                tracing::debug!("accelerated path unavailable, using portable copy loop");
            }
            config.accelerator.enabled = false;
            config.accelerator.zero_copy = false;
            config.accelerator.fixed_buffers = false;
            return config;
        }

        config.accelerator.zero_copy &= caps.zero_copy;
        config.accelerator.fixed_buffers &= caps.fixed_buffers;
        config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
