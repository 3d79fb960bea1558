//! Relay sessions for zrelay.
//!
//! A [`RelaySession`] takes two endpoints, hands them to an
//! [`Accelerator`](zrelay_domain::Accelerator) exactly once, and releases the
//! descriptors it owns when the single completion arrives. A [`Topology`]
//! runs sessions for several hops that share one accelerator.
//!
//! # Structure
//!
//! - [`session`]  - [`RelaySession`]: resolve, relay, await completion, release
//! - [`topology`] - [`Direction`], [`Hop`], [`Topology`] and its report
//! - [`upgrade`]  - HTTP/1.1 Upgrade handshake that captures head bytes

mod session;
mod topology;
pub mod upgrade;

// --- session
pub use session::RelaySession;

// --- topology
pub use topology::{
    // ---
    Direction,
    Hop,
    HopOutcome,
    Topology,
    TopologyReport,
};
