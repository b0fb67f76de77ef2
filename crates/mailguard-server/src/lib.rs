//! Mailguard Server
//!
//! HTTP surface for the outbound email review loop: a server-sent event
//! stream of each run, a synchronous run endpoint, one-shot tool endpoints
//! and Prometheus metrics. Also hosts the client used by the `watch`
//! command.

pub mod client;
pub mod config;
pub mod routes;
pub mod state;

pub use client::RunClient;
pub use config::{ConfigOverrides, DecisionMode, ServerConfig};
pub use routes::create_router;
pub use state::AppState;
