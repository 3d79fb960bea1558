//! Textual endpoint specs accepted by `--listen` and `--connect`.
//!
//!   null            discard device, opened read/write
//!   ./relay.sock    unix-domain socket (any value starting with `.` or `/`)
//!   host:port       TCP; `:port` and a bare `port` mean localhost, IPv6
//!                   hosts may be bare (`::1:8080`) or bracketed

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---

use zrelay_domain::RelayError;

// ---------------------------------------------------------------------------
// EndpointSpec
// ---------------------------------------------------------------------------

pub const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSpec {
    // ---
    Null,
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

// ---

impl FromStr for EndpointSpec {
    // ---
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        if s.is_empty() {
            return Err(RelayError::InvalidArgument("empty endpoint".into()));
        }

        if s == "null" {
            return Ok(EndpointSpec::Null);
        }

        if s.starts_with('.') || s.starts_with('/') {
            return Ok(EndpointSpec::Unix(PathBuf::from(s)));
        }

        // Port follows the last colon so IPv6 hosts keep theirs.
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("", s),
        };
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let port = port
            .parse::<u16>()
            .map_err(|_| RelayError::InvalidArgument(format!("invalid port number: {port:?}")))?;

        let host = if host.is_empty() { DEFAULT_HOST } else { host };

        Ok(EndpointSpec::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

// ---

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSpec::Null => f.write_str("null"),
            EndpointSpec::Unix(path) => write!(f, "{}", path.display()),
            EndpointSpec::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            EndpointSpec::Tcp { host, port } => write!(f, "{host}:{port}"),
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

    fn tcp(host: &str, port: u16) -> EndpointSpec {
        EndpointSpec::Tcp {
            host: host.into(),
            port,
        }
    }

    #[test]
    fn parses_every_form() {
        // ---
        assert_eq!("null".parse::<EndpointSpec>().unwrap(), EndpointSpec::Null);
        assert_eq!(
            "./relay.sock".parse::<EndpointSpec>().unwrap(),
            EndpointSpec::Unix("./relay.sock".into())
        );
        assert_eq!(
            "/run/relay.sock".parse::<EndpointSpec>().unwrap(),
            EndpointSpec::Unix("/run/relay.sock".into())
        );
        assert_eq!("10.0.0.2:8080".parse::<EndpointSpec>().unwrap(), tcp("10.0.0.2", 8080));
        assert_eq!(":8080".parse::<EndpointSpec>().unwrap(), tcp("localhost", 8080));
        assert_eq!("8080".parse::<EndpointSpec>().unwrap(), tcp("localhost", 8080));
    }

    #[test]
    fn ipv6_hosts_keep_their_colons() {
        // ---
        assert_eq!("::1:8080".parse::<EndpointSpec>().unwrap(), tcp("::1", 8080));
        assert_eq!("[::1]:8080".parse::<EndpointSpec>().unwrap(), tcp("::1", 8080));
        assert_eq!(
            "fe80::2:443".parse::<EndpointSpec>().unwrap(),
            tcp("fe80::2", 443)
        );
        assert_eq!(tcp("::1", 8080).to_string(), "[::1]:8080");
    }

    #[test]
    fn rejects_bad_ports() {
        // ---
        for bad in ["localhost", "host:", "host:70000", "host:-1", ""] {
            let err = bad.parse::<EndpointSpec>().unwrap_err();
            assert!(
                matches!(err, RelayError::InvalidArgument(_)),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn display_round_trips_tcp() {
        // ---
        let spec = tcp("example.net", 443);
        assert_eq!(spec.to_string(), "example.net:443");
        assert_eq!(spec.to_string().parse::<EndpointSpec>().unwrap(), spec);
    }
}
