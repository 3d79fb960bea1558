//! zrelay agent daemon.
//!
//! Accepts connections on the listen side, opens the connect side for each,
//! and relays between them with one leg zstd-compressed.
//!
//! Usage:
//!   zrelay-agent --listen=8080 --connect=relay-b:9000 --compress=listen
//!   zrelay-agent --listen=null --connect=./app.sock --compress=connect

use std::fs::File;
use std::sync::Arc;

// ---

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---

use zrelay_domain::Accelerator;
use zrelay_engine::CopyEngine;
use zrelay_session::Hop;

// ---

mod config;
mod endpoint_spec;
mod listener;

// ---

use config::Config;
use listener::{Established, Inbound};

// Gateway re-exports; siblings import via super::Symbol
pub use endpoint_spec::EndpointSpec;

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    let cfg = Config::parse();

    let no_color = std::env::var("EMACS").is_ok()
        || std::env::var("NO_COLOR").is_ok()
        || std::env::var("CARGO_TERM_COLOR").as_deref() == Ok("never")
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(!no_color)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %cfg.listen,
        connect = %cfg.connect,
        compress = %cfg.compress,
        "zrelay-agent starting",
    );

    let relay_config = cfg.relay_config();
    relay_config.validate()?;

    let engine = Arc::new(CopyEngine::new());
    info!(capabilities = ?engine.capabilities(), "relay engine ready");

    let engine: Arc<dyn Accelerator> = engine;
    let hop = Arc::new(Hop::new("agent", cfg.compress, relay_config));

    // `null` listen side: one session against the discard device, then exit.
    if cfg.listen == EndpointSpec::Null {
        let discard = listener::open_discard("listen")?;
        let handle = serve(
            Arc::clone(&hop),
            engine,
            Established::Discard(discard),
            cfg.connect.clone(),
        )
        .await;

        if let Some(handle) = handle {
            handle.await?;
        }
        return Ok(());
    }

    let inbound = Inbound::bind(&cfg.listen).await?;
    info!(listen = %cfg.listen, "listening");

    loop {
        tokio::select! {
            accepted = inbound.accept() => match accepted {
                Ok(conn) => {
                    let hop = Arc::clone(&hop);
                    let engine = Arc::clone(&engine);
                    let connect = cfg.connect.clone();
                    tokio::spawn(async move {
                        serve(hop, engine, Established::Connection(conn), connect).await;
                    });
                }
                Err(e) => tracing::warn!("accept failed: {e}"),
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

/// Open the connect side for one listen-side arrival and start its session.
///
/// Returns `None` when the connect side could not be established; the listen
/// side is dropped and no session starts.
async fn serve(
    hop: Arc<Hop>,
    engine: Arc<dyn Accelerator>,
    listen: Established,
    connect: EndpointSpec,
) -> Option<tokio::task::JoinHandle<()>> {
    // ---
    let connect = match listener::connect(&connect).await {
        Ok(connect) => connect,
        Err(e) => {
            tracing::error!("{e}");
            return None;
        }
    };

    let (listen, listen_keep) = listen.into_endpoint();
    let (connect, connect_keep) = connect.into_endpoint();

    let session = hop.session(listen, connect);
    let id = session.id();

    Some(session.spawn(engine, move |result| {
        close_discard(listen_keep, connect_keep);

        if let Err(e) = result {
            tracing::error!(session = %id, "relay failed: {e}");
        }
    }))
}

fn close_discard(listen: Option<File>, connect: Option<File>) {
    // ---
    for file in [listen, connect].into_iter().flatten() {
        drop(file);
        tracing::debug!("closed discard device");
    }
}
