//! HTTP surface: access gate, public endpoints, and the server loop.

pub mod gate;
pub mod handlers;
pub mod server;

pub use server::HttpServer;

use crate::quota::QuotaEngine;

/// Shared state handed to every handler and middleware layer.
#[derive(Clone)]
pub struct AppState {
    /// The quota engine guarding the protected endpoints
    pub engine: QuotaEngine,
}
