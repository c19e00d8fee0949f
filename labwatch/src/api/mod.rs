//! HTTP status API.
//!
//! Read-only: exposes the recent audit trail and the last known device
//! state. Nothing here can influence alerting.

mod server;
mod v0;

pub use server::{SharedState, router, serve};
