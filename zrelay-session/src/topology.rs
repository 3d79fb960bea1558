//! Multi-hop relay topology.
//!
//! Each hop is a relay process or task with a listen side and a connect side;
//! [`Direction`] names which of the two carries plain bytes (the `compress`
//! endpoint). Chaining a hop whose connect side is compressed into a hop whose
//! listen side is compressed gives a compressed link between two plain legs:
//!
//! ```text
//! client ──plain──▶ hop A ══zstd══▶ hop B ──plain──▶ server
//!          (A: --compress listen)     (B: --compress connect)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ---

use tokio::task::JoinSet;
use uuid::Uuid;

// ---

use zrelay_domain::{Accelerator, Endpoint, RelayConfig, RelayError, Result};

// ---

use super::RelaySession;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which side of a hop carries plain bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    // ---
    /// The listen side is plain; the connect side is the compressed leg.
    Listen,

    /// The connect side is plain; the listen side is the compressed leg.
    Connect,
}

// ---

impl Direction {
    // ---
    /// Map a hop's `(listen, connect)` endpoints onto `(compress, to)`.
    pub fn assign(self, listen: Endpoint, connect: Endpoint) -> (Endpoint, Endpoint) {
        match self {
            Direction::Listen => (listen, connect),
            Direction::Connect => (connect, listen),
        }
    }
}

// ---

impl FromStr for Direction {
    // ---
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "listen" => Ok(Direction::Listen),
            "connect" => Ok(Direction::Connect),
            other => Err(RelayError::InvalidArgument(format!(
                "compress side must be `listen` or `connect`, got {other:?}"
            ))),
        }
    }
}

// ---

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Listen => f.write_str("listen"),
            Direction::Connect => f.write_str("connect"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hop
// ---------------------------------------------------------------------------

/// Static description of one hop.
#[derive(Debug, Clone)]
pub struct Hop {
    // ---
    name: String,
    direction: Direction,
    config: RelayConfig,
}

// ---

impl Hop {
    // ---
    pub fn new(name: impl Into<String>, direction: Direction, config: RelayConfig) -> Self {
        Self {
            name: name.into(),
            direction,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Build the session for one accepted connection on this hop.
    pub fn session(&self, listen: Endpoint, connect: Endpoint) -> RelaySession {
        // ---
        let (compress, to) = self.direction.assign(listen, connect);
        RelaySession::new(compress, to, self.config.clone())
    }
}

// ---------------------------------------------------------------------------
// HopOutcome / TopologyReport
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HopOutcome {
    // ---
    pub hop: String,
    pub session: Uuid,
    pub result: Result<()>,
}

// ---

/// Outcomes of every session launched on a [`Topology`], in completion order.
#[derive(Debug, Default)]
pub struct TopologyReport {
    // ---
    pub outcomes: Vec<HopOutcome>,
}

// ---

impl TopologyReport {
    // ---
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// First failure wrapped as [`RelayError::Hop`], or `Ok` if every hop
    /// closed cleanly.
    pub fn into_result(self) -> Result<()> {
        // ---
        for outcome in self.outcomes {
            if let Err(e) = outcome.result {
                return Err(RelayError::Hop {
                    hop: outcome.hop,
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// A set of running hop sessions sharing one accelerator.
pub struct Topology {
    // ---
    accelerator: Arc<dyn Accelerator>,
    sessions: JoinSet<HopOutcome>,
}

// ---

impl Topology {
    // ---
    pub fn new(accelerator: Arc<dyn Accelerator>) -> Self {
        Self {
            accelerator,
            sessions: JoinSet::new(),
        }
    }

    /// Start a session on `hop` between its accepted `listen` connection and
    /// its outbound `connect` connection.
    pub fn launch(&mut self, hop: &Hop, listen: Endpoint, connect: Endpoint) -> Uuid {
        // ---
        let session = hop.session(listen, connect);
        let id = session.id();
        let name = hop.name().to_string();
        let accelerator = Arc::clone(&self.accelerator);

        tracing::debug!(hop = %name, session = %id, direction = %hop.direction(), "launching hop");

        self.sessions.spawn(async move {
            let result = session.run(accelerator.as_ref()).await;
            HopOutcome {
                hop: name,
                session: id,
                result,
            }
        });
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ---

    /// Wait for every launched session to finish.
    pub async fn join(mut self) -> TopologyReport {
        // ---
        let mut report = TopologyReport::default();

        while let Some(joined) = self.sessions.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Err(e) = &outcome.result {
                        tracing::warn!(hop = %outcome.hop, session = %outcome.session, "hop failed: {e}");
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!("hop task did not finish: {e}");
                    report.outcomes.push(HopOutcome {
                        hop: "<unknown>".into(),
                        session: Uuid::nil(),
                        result: Err(RelayError::Io(std::io::Error::other(e))),
                    });
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
