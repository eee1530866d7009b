//! Integration tests for Undertow
//!
//! These drive the swarm manager, source resolver and eviction engine
//! together against the simulated swarm engine.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/eviction.rs"]
mod eviction;
#[path = "integration/lifecycle.rs"]
mod lifecycle;
#[path = "integration/resolver.rs"]
mod resolver;
