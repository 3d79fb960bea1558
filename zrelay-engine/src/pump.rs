//! One direction of a relay: head bytes, then a blocking read/transform/write
//! loop from a source descriptor into a sink descriptor.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

// ---

use bytes::Bytes;
use zstd::stream::write::{Decoder, Encoder};

// ---

use zrelay_domain::RelayConfig;

// ---

use super::socket;
use super::EngineError;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// A duplicated descriptor owned by the engine for the life of one relay.
pub(crate) struct Side {
    // ---
    pub(crate) file: File,
    pub(crate) head: Option<Bytes>,
    pub(crate) socket: bool,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Codec {
    Compress,
    Decompress,
}

// ---

/// Write half of a direction, optionally wrapped in a zstd stream.
enum Sink<'a> {
    Plain(&'a File),
    Compress(Encoder<'static, &'a File>),
    Decompress(Decoder<'static, &'a File>),
}

// ---

impl<'a> Sink<'a> {
    // ---
    fn new(file: &'a File, codec: Codec, config: &RelayConfig) -> Result<Self, EngineError> {
        // ---
        if !config.compression.enabled {
            return Ok(Sink::Plain(file));
        }

        let sink = match codec {
            Codec::Compress => Sink::Compress(
                Encoder::new(file, config.compression.level).map_err(EngineError::Codec)?,
            ),
            Codec::Decompress => {
                Sink::Decompress(Decoder::new(file).map_err(EngineError::Codec)?)
            }
        };
        Ok(sink)
    }
}

// ---

impl Write for Sink<'_> {
    // ---
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(file) => file.write(buf),
            Sink::Compress(encoder) => encoder.write(buf),
            Sink::Decompress(decoder) => decoder.write(buf),
        }
    }

    /// For the encoder this ends the current zstd block, so the peer can
    /// decode everything written so far without waiting for more input.
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(file) => file.flush(),
            Sink::Compress(encoder) => encoder.flush(),
            Sink::Decompress(decoder) => decoder.flush(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

pub(crate) struct Pump<'a> {
    // ---
    pub(crate) name: &'static str,
    pub(crate) source: &'a Side,
    pub(crate) sink: &'a Side,
    pub(crate) codec: Codec,
    pub(crate) config: &'a RelayConfig,

    /// Raised by whichever direction ends first.
    pub(crate) stop: &'a AtomicBool,
}

// ---

impl Pump<'_> {
    // ---
    /// Run to completion and return the number of bytes read from the source
    /// (head included).
    ///
    /// When a socket source ends, both sockets are shut down so the opposite
    /// direction unblocks and ends too. Read failures seen after the opposite
    /// direction already stopped are caused by that shutdown and are not
    /// reported; a failed write still is, since its bytes were lost.
    pub(crate) fn run(self) -> Result<u64, EngineError> {
        // ---
        let result = self.transfer();

        if !self.source.socket {
            return result;
        }

        let already_stopped = self.stop.swap(true, Ordering::AcqRel);
        socket::shutdown(&self.source.file);
        socket::shutdown(&self.sink.file);

        match result {
            Err(e) if already_stopped && e.is_shutdown_artefact() => {
                tracing::debug!(direction = self.name, "ignoring error after stop: {e}");
                Ok(0)
            }
            other => other,
        }
    }

    // ---

    fn transfer(&self) -> Result<u64, EngineError> {
        // ---
        // Nothing to poll on a device or file, so it needs no buffer.
        let mut buf = if self.source.socket {
            transfer_buffer(self.config.buffer_size)?
        } else {
            Vec::new()
        };

        let mut sink = Sink::new(&self.sink.file, self.codec, self.config)?;
        let mut total = 0u64;

        if let Some(head) = &self.source.head {
            sink.write_all(head).map_err(EngineError::from_sink)?;
            sink.flush().map_err(EngineError::from_sink)?;
            total += head.len() as u64;
        }

        // Nothing to poll on a device or file; only its head is relayed.
        if !self.source.socket {
            return Ok(total);
        }

        let mut reader = &self.source.file;

        while !self.stop.load(Ordering::Acquire) {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EngineError::Read(e)),
            };

            sink.write_all(&buf[..n]).map_err(EngineError::from_sink)?;
            sink.flush().map_err(EngineError::from_sink)?;
            total += n as u64;
        }

        tracing::debug!(direction = self.name, bytes = total, "direction finished");
        Ok(total)
    }
}

// ---

/// Allocate a zeroed buffer, failing instead of aborting when `size` cannot
/// be had.
fn transfer_buffer(size: usize) -> Result<Vec<u8>, EngineError> {
    // ---
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| EngineError::Alloc(size))?;
    buf.resize(size, 0);
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    fn socket_side(stream: UnixStream, head: Option<&'static [u8]>) -> Side {
        Side {
            file: File::from(OwnedFd::from(stream)),
            head: head.map(Bytes::from_static),
            socket: true,
        }
    }

    #[test]
    fn lost_write_reported_after_other_direction_stopped() {
        // ---
        let (source, _source_peer) = UnixStream::pair().unwrap();
        let (sink, sink_peer) = UnixStream::pair().unwrap();
        drop(sink_peer);

        let source = socket_side(source, Some(b"pending reply"));
        let sink = socket_side(sink, None);
        let config = RelayConfig::uncompressed();
        let stop = AtomicBool::new(true);

        let result = Pump {
            name: "compress",
            source: &source,
            sink: &sink,
            codec: Codec::Compress,
            config: &config,
            stop: &stop,
        }
        .run();

        match result {
            Err(e) => assert_eq!(e.status(), libc::EPIPE, "got {e}"),
            Ok(n) => panic!("write to a closed peer reported as clean ({n} bytes)"),
        }
    }

    #[test]
    fn unallocatable_buffer_is_an_error() {
        // ---
        let err = transfer_buffer(usize::MAX).unwrap_err();
        assert!(matches!(err, EngineError::Alloc(usize::MAX)));
        assert_eq!(transfer_buffer(16).unwrap(), vec![0u8; 16]);
    }
}
