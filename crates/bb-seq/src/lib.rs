//! bb-seq: sample-accurate pattern and arrangement sequencing
//!
//! The sequencer walks pattern clips on the arrangement timeline and emits
//! note and automation events with sample offsets inside each processing
//! block. Looping never wraps inside a block: the block is split at the
//! loop end so every event offset stays within `[0, block_len)`.

mod sequencer;

pub use sequencer::*;
