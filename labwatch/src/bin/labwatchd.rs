//! labwatch daemon.
//!
//! Configuration comes from the environment; see `config.rs` for the
//! variables and their defaults.

use anyhow::{Context, Result};

use labwatch::config::ServiceConfig;
use labwatch::daemon::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    labwatch::tracing::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    Daemon::new(config).run().await?;

    Ok(())
}
