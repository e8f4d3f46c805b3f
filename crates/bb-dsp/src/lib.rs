//! bb-dsp: DSP processors for the Backbeat engine
//!
//! ## Modules
//! - `biquad` - TDF-II biquad sections with RBJ cookbook coefficients
//! - `envelope` - ADSR, exponential, and piecewise envelope generators
//! - `eq` - band stack with zero-latency and linear-phase modes
//! - `linear_phase` - FIR design from a magnitude grid plus a partitioned
//!   overlap-save convolver
//! - `saturation` - waveshaper with 4x oversampling (EQ character stage,
//!   distortion insert)
//! - `dynamics` - feed-forward compressor with soft knee and sidechain
//! - `loudness` - ITU-R BS.1770-4 / EBU R128 loudness, peak, and true peak
//! - `effects` - delay and seeded algorithmic reverb for insert slots

pub mod biquad;
pub mod dynamics;
pub mod effects;
pub mod envelope;
pub mod eq;
pub mod linear_phase;
pub mod loudness;
pub mod saturation;

pub use biquad::{BiquadCoeffs, BiquadTdf2, frequency_response};
pub use dynamics::{Compressor, EnvelopeFollower};
pub use effects::{FeedbackDelay, Reverb};
pub use envelope::{AdsrEnvelope, CurveShape, EnvelopeStage, PiecewiseEnvelope};
pub use eq::{EqBand, EqStack};
pub use linear_phase::LinearPhaseFilter;
pub use loudness::{LufsMeter, PeakMeter, RmsMeter, TruePeakMeter};
pub use saturation::{OversampledShaper, ShaperCurve};

use bb_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples in place
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Stereo processor trait
pub trait StereoProcessor: Processor {
    /// Process a stereo sample pair
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample);

    /// Process stereo blocks in place
    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
