//! Logging setup and the prelude used by the rest of the crate.
//!
//! Modules pull the macros in with `use crate::tracing::prelude::*;` so
//! the subscriber choice lives in exactly one place.

use std::env;

use time::macros::format_description;
use tracing_subscriber::{
    EnvFilter, fmt::time::LocalTime, layer::SubscriberExt, util::SubscriberInitExt,
};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to the journal;
/// otherwise they are written to stderr with local timestamps. The
/// filter comes from `RUST_LOG`, falling back to `info`.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let journald = if env::var_os("JOURNAL_STREAM").is_some() {
        tracing_journald::layer().ok()
    } else {
        None
    };

    let fmt = if journald.is_none() {
        let timer = LocalTime::new(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        ));
        Some(
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .with(fmt)
        .init();
}
