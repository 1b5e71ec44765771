//! AyurTrace Server - JSON API over the provenance ledger service.

pub mod config;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;
