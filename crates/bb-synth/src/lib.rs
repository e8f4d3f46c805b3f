//! bb-synth: polyphonic subtractive synthesis and sample playback
//!
//! - `oscillator` - PolyBLEP band-limited oscillators
//! - `lfo` - free-running or tempo-synced low-frequency oscillators
//! - `voice` - one subtractive voice: oscillators, filter, two envelopes
//! - `pool` - fixed-capacity voice pool with stealing
//! - `sampler` - PCM buffer playback with rate, trim, and loop

pub mod lfo;
pub mod oscillator;
pub mod pool;
pub mod sampler;
pub mod voice;

pub use lfo::Lfo;
pub use oscillator::Oscillator;
pub use pool::{VoicePool, VoicePoolStats};
pub use sampler::{SampleBuffer, SamplePlayer};
pub use voice::{Voice, VoiceParams, VoiceState};
