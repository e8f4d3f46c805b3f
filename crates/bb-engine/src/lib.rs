//! bb-engine: track strips, bus graph, real-time scheduler, and session
//!
//! The control plane (any number of threads) talks to the audio plane (one
//! thread) through a pair of lock-free rings: control messages in, meter
//! frames and reclaimed objects out. The audio thread never allocates,
//! locks, or raises; large objects are built on the control thread and
//! handed across by pointer, and come back the same way for dropping.

pub mod graph;
pub mod insert;
pub mod messages;
pub mod rings;
pub mod scheduler;
pub mod session;
pub mod strip;

pub use graph::{BusGraph, BusNode};
pub use insert::{EffectProcessor, EffectSlot, InsertChain, build_effect};
pub use messages::{ControlMsg, EqBandChange, Garbage, MeterFrame, ReverseMsg, StripAddr,
    TrackMeters, TransportCmd};
pub use rings::{ControlSender, MeterReadings};
pub use scheduler::{AudioEngine, TrackProcessor};
pub use session::{Session, SessionHandle};
