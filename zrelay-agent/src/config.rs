//! CLI configuration for `zrelay-agent`.
//!
//! Typical hop pair:
//!   zrelay-agent --listen=8080 --connect=relay-b:9000 --compress=listen
//!   zrelay-agent --listen=9000 --connect=app:80 --compress=connect

use clap::Parser;

// ---

use zrelay_domain::{
    // ---
    AcceleratorConfig,
    CompressionConfig,
    RelayConfig,
    DEFAULT_BUFFER_SIZE,
    DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_QUEUE_DEPTH,
};
use zrelay_session::Direction;

// ---

use super::EndpointSpec;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "zrelay-agent", about = "Relay one side to another, compressing one leg")]
pub struct Config {
    // ---
    /// Where connections arrive: `null`, a unix socket path, or `[host:]port`.
    #[arg(long)]
    pub listen: EndpointSpec,

    /// Where each accepted connection is relayed to (same forms as --listen).
    #[arg(long)]
    pub connect: EndpointSpec,

    /// Side that carries plain bytes (`listen` or `connect`); the other side
    /// carries the zstd stream.
    #[arg(long)]
    pub compress: Direction,

    /// Relay bytes verbatim in both directions.
    #[arg(long)]
    pub no_zstd: bool,

    #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL, allow_negative_numbers = true)]
    pub zstd_level: i32,

    /// Disable the accelerated backend even where it is available.
    #[arg(long)]
    pub no_io_uring: bool,

    /// Submission queue depth for the accelerated backend; 0 means default.
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub io_uring_depth: usize,

    #[arg(long)]
    pub no_zero_copy: bool,

    #[arg(long)]
    pub no_fixed_buffers: bool,

    /// Per-direction read buffer, in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
}

// ---

impl Config {
    // ---
    pub fn relay_config(&self) -> RelayConfig {
        // ---
        RelayConfig {
            compression: CompressionConfig {
                enabled: !self.no_zstd,
                level: self.zstd_level,
            },
            accelerator: AcceleratorConfig {
                enabled: !self.no_io_uring,
                // 0 asks for the default depth.
                queue_depth: match self.io_uring_depth {
                    0 => DEFAULT_QUEUE_DEPTH,
                    depth => depth,
                },
                zero_copy: !self.no_zero_copy,
                fixed_buffers: !self.no_fixed_buffers,
            },
            buffer_size: self.buffer_size,
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

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(std::iter::once("zrelay-agent").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_relay_config() {
        // ---
        let cfg = parse(&["--listen=8080", "--connect=./app.sock", "--compress=listen"]).unwrap();

        assert_eq!(
            cfg.listen,
            EndpointSpec::Tcp {
                host: "localhost".into(),
                port: 8080
            }
        );
        assert_eq!(cfg.connect, EndpointSpec::Unix("./app.sock".into()));
        assert_eq!(cfg.compress, Direction::Listen);
        assert_eq!(cfg.relay_config(), RelayConfig::default());
    }

    #[test]
    fn switches_flow_into_relay_config() {
        // ---
        let cfg = parse(&[
            "--listen", "null",
            "--connect", "host:9000",
            "--compress", "connect",
            "--no-zstd",
            "--zstd-level", "-3",
            "--no-io-uring",
            "--io-uring-depth", "32",
            "--no-zero-copy",
            "--no-fixed-buffers",
            "--buffer-size", "4096",
        ])
        .unwrap();

        let relay = cfg.relay_config();
        assert!(!relay.compression.enabled);
        assert_eq!(relay.compression.level, -3);
        assert!(!relay.accelerator.enabled);
        assert_eq!(relay.accelerator.queue_depth, 32);
        assert!(!relay.accelerator.zero_copy);
        assert!(!relay.accelerator.fixed_buffers);
        assert_eq!(relay.buffer_size, 4096);
    }

    #[test]
    fn zero_queue_depth_means_default() {
        // ---
        let cfg = parse(&[
            "--listen=8080",
            "--connect=9000",
            "--compress=listen",
            "--io-uring-depth=0",
        ])
        .unwrap();

        let relay = cfg.relay_config();
        assert_eq!(relay.accelerator.queue_depth, DEFAULT_QUEUE_DEPTH);
        relay.validate().unwrap();
    }

    #[test]
    fn oversized_buffer_fails_validation() {
        // ---
        let cfg = parse(&[
            "--listen=8080",
            "--connect=9000",
            "--compress=listen",
            "--buffer-size=70368744177664",
        ])
        .unwrap();

        let err = cfg.relay_config().validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"), "got: {err}");
    }

    #[test]
    fn required_and_invalid_arguments_rejected() {
        // ---
        assert!(parse(&["--listen=8080", "--connect=9000"]).is_err());
        assert!(parse(&["--listen=8080", "--connect=9000", "--compress=both"]).is_err());
        assert!(parse(&["--listen=host:99999", "--connect=9000", "--compress=listen"]).is_err());
    }
}
