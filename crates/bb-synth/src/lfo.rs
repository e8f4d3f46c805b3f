//! Low-frequency oscillators
//!
//! Free-running LFOs advance in Hz; tempo-synced LFOs keep their phase in
//! beats so they stay locked when the tempo changes. Depth is additive
//! modulation in the target parameter's units.

use bb_core::{LfoParams, LfoTarget, Sample};

#[derive(Debug, Clone)]
pub struct Lfo {
    params: LfoParams,
    /// Phase in cycles [0, 1)
    phase: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(params: LfoParams, sample_rate: f64) -> Self {
        Self {
            params,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn set_params(&mut self, params: LfoParams) {
        self.params = params;
    }

    pub fn params(&self) -> &LfoParams {
        &self.params
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.params.enabled && self.params.depth != 0.0
    }

    #[inline]
    pub fn target(&self) -> LfoTarget {
        self.params.target
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Advance one sample and return the modulation value (already scaled
    /// by depth). `beats_per_sample` drives tempo-synced rates.
    #[inline]
    pub fn next(&mut self, beats_per_sample: f64) -> Sample {
        if !self.enabled() {
            return 0.0;
        }
        let inc = if self.params.synced {
            // rate is beats per cycle when synced
            let beats_per_cycle = self.params.rate.max(1e-3);
            beats_per_sample / beats_per_cycle
        } else {
            self.params.rate.max(0.0) / self.sample_rate
        };
        let out = (self.phase * std::f64::consts::TAU).sin() * self.params.depth;
        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(rate: f64, synced: bool, depth: f64) -> LfoParams {
        LfoParams {
            target: LfoTarget::PitchCents,
            rate,
            synced,
            depth,
            enabled: true,
        }
    }

    #[test]
    fn test_free_running_rate() {
        let mut lfo = Lfo::new(params(2.0, false, 1.0), 48000.0);
        // After exactly half a period the sine returns to ~0 heading down
        let half_period = 48000 / 4; // quarter period: peak
        let mut last = 0.0;
        for _ in 0..half_period {
            last = lfo.next(0.0);
        }
        assert!(last > 0.9, "{last}");
    }

    #[test]
    fn test_synced_rate_follows_tempo() {
        // One cycle per beat at 120 BPM, 48 kHz: period = 24000 samples
        let mut lfo = Lfo::new(params(1.0, true, 1.0), 48000.0);
        let beats_per_sample = 120.0 / (60.0 * 48000.0);
        for _ in 0..24000 {
            lfo.next(beats_per_sample);
        }
        assert!(lfo.phase < 0.01 || lfo.phase > 0.99, "phase {}", lfo.phase);
    }

    #[test]
    fn test_disabled_outputs_zero() {
        let mut p = params(5.0, false, 1.0);
        p.enabled = false;
        let mut lfo = Lfo::new(p, 48000.0);
        for _ in 0..100 {
            assert_eq!(lfo.next(0.0), 0.0);
        }
    }

    #[test]
    fn test_depth_scales_output() {
        let mut lfo = Lfo::new(params(1.0, false, 50.0), 48000.0);
        let mut peak = 0.0f64;
        for _ in 0..48000 {
            peak = peak.max(lfo.next(0.0).abs());
        }
        assert!((peak - 50.0).abs() < 0.5);
    }
}
