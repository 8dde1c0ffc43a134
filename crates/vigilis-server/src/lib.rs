//! Vigilis Server
//!
//! HTTP surface and CSV tooling around the classification cascade.

pub mod config;
pub mod csv_io;
pub mod routes;
pub mod state;

pub use config::{ServerConfig, ServerOverrides};
pub use routes::create_router;
pub use state::AppState;
