//! Lead dispatch and referral resolution engine for a real-estate
//! brokerage network.
//!
//! Registration handlers create leads; this crate distributes them fairly
//! across call-center executives, resolves who referred any entity through
//! the network's forest of referral codes, and periodically recomputes
//! per-agent production statistics.

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod referral;
pub mod routes;
pub mod stats;
pub mod telemetry;

pub use engine::LeadEngine;
pub use routes::engine_router;
