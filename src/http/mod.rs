//! HTTP server module for the deployment webhook
//!
//! The server exposes the following endpoints:
//! - POST /deploy - Run the deployment script (bearer token required)
//! - GET /health - Liveness check
//! - GET /metrics - Prometheus metrics (when enabled)

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod server;

pub use server::start_server;
