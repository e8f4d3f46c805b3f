//! bb-core: shared types, time base, and data model for the Backbeat engine
//!
//! This crate provides the foundational types used across all Backbeat crates:
//! sample/rate primitives, the musical time base, the session configuration,
//! the error taxonomy, and the pattern/clip/track/bus data model the engine
//! and the sequencer operate on.

mod config;
mod error;
mod model;
mod sample;
mod snapshot;
mod time;

pub use config::*;
pub use error::*;
pub use model::*;
pub use sample::*;
pub use snapshot::*;
pub use time::*;
