//! Undertow Simulation - an in-memory swarm engine for development and tests.
//!
//! [`SimulatedSwarmEngine`] implements the core engine seam against seeded
//! content instead of real peers. Metadata arrival, drop failures and byte
//! counters can all be scripted, which is what the lifecycle and eviction
//! tests lean on.
//!
//! # Example
//!
//! ```rust,no_run
//! use undertow_sim::{MetainfoBuilder, SimulatedSwarmEngine};
//! use undertow_core::SwarmEngine;
//!
//! # async fn demo() -> Result<(), undertow_core::SwarmError> {
//! let engine = SimulatedSwarmEngine::new();
//! let seeded = engine
//!     .seed(MetainfoBuilder::new("Demo").pattern_file("Demo.2024.mkv", 10 * 1024 * 1024))
//!     .await?;
//!
//! let info_hash = engine.add_magnet(&seeded.magnet_uri()).await?;
//! engine.wait_for_metadata(info_hash).await?;
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod engine;
pub mod metainfo;

pub use content::{FileSource, PatternReader, pattern_byte};
pub use engine::SimulatedSwarmEngine;
pub use metainfo::{BuiltMetainfo, DEFAULT_PIECE_LENGTH, MetainfoBuilder};
