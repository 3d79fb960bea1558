//! Establishing the two sides of a hop from their [`EndpointSpec`]s.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;

// ---

use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

// ---

use zrelay_domain::{Connection, Endpoint, RelayError, Result};

// ---

use super::EndpointSpec;

// ---------------------------------------------------------------------------
// Established
// ---------------------------------------------------------------------------

const DISCARD_DEVICE: &str = "/dev/null";

/// One side of a hop, ready to hand to a session.
#[derive(Debug)]
pub enum Established {
    // ---
    Connection(Connection),

    /// The discard device. The agent owns it and closes it after the session.
    Discard(File),
}

// ---

impl Established {
    // ---
    /// Split into the session endpoint and whatever the agent must keep open
    /// until the session completes.
    pub fn into_endpoint(self) -> (Endpoint, Option<File>) {
        match self {
            Established::Connection(conn) => (Endpoint::connection(conn), None),
            Established::Discard(file) => (Endpoint::descriptor(file.as_raw_fd()), Some(file)),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum Inbound {
    Tcp(TcpListener),
    Unix(UnixListener),
}

// ---

impl Inbound {
    // ---
    /// Bind the listen side. `null` has no listener; callers open the discard
    /// device for it instead.
    pub async fn bind(spec: &EndpointSpec) -> Result<Self> {
        // ---
        let establish = |source| RelayError::Establishment {
            side: "listen",
            source,
        };

        match spec {
            EndpointSpec::Null => Err(RelayError::InvalidArgument(
                "`null` cannot be bound as a listener".into(),
            )),
            EndpointSpec::Unix(path) => UnixListener::bind(path).map(Inbound::Unix).map_err(establish),
            EndpointSpec::Tcp { host, port } => TcpListener::bind((host.as_str(), *port))
                .await
                .map(Inbound::Tcp)
                .map_err(establish),
        }
    }

    pub async fn accept(&self) -> io::Result<Connection> {
        // ---
        match self {
            Inbound::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                tracing::debug!(%peer, "accepted tcp connection");
                Ok(stream.into())
            }
            Inbound::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                tracing::debug!("accepted unix connection");
                Ok(stream.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

pub fn open_discard(side: &'static str) -> Result<File> {
    // ---
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(DISCARD_DEVICE)
        .map_err(|source| RelayError::Establishment { side, source })
}

/// Establish the connect side.
pub async fn connect(spec: &EndpointSpec) -> Result<Established> {
    // ---
    let establish = |source| RelayError::Establishment {
        side: "connect",
        source,
    };

    match spec {
        EndpointSpec::Null => open_discard("connect").map(Established::Discard),
        EndpointSpec::Unix(path) => UnixStream::connect(path)
            .await
            .map(|s| Established::Connection(s.into()))
            .map_err(establish),
        EndpointSpec::Tcp { host, port } => TcpStream::connect((host.as_str(), *port))
            .await
            .map(|s| Established::Connection(s.into()))
            .map_err(establish),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
