//! Undertow Web - JSON API and streaming server
//!
//! Exposes the swarm manager over HTTP: submit a source, stream the chosen
//! file with range support, inspect or drop swarms, and proxy catalog and
//! indexer lookups for the player UI.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, build_router, run_server};
