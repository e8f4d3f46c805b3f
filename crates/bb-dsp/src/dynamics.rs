//! Dynamics processing: feed-forward compressor
//!
//! Peak or RMS detection, quadratic soft knee, manual or auto makeup, and an
//! optional sidechain input. Gain reduction is stereo-linked and exposed per
//! block for metering.

use bb_core::{CompressorConfig, DetectorKind, MakeupGain, Sample, db_to_gain};

use crate::{Processor, ProcessorConfig};

/// Envelope follower with separate attack and release ballistics
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
    attack_ms: f64,
    release_ms: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f64) -> Self {
        let mut follower = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            sample_rate,
        };
        follower.set_times(10.0, 100.0);
        follower
    }

    /// Set attack and release times in milliseconds
    pub fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.attack_ms = attack_ms;
        self.release_ms = release_ms;
        self.attack_coeff = (-1.0 / (attack_ms * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_ms * 0.001 * self.sample_rate)).exp();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.set_times(self.attack_ms, self.release_ms);
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample) -> f64 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    pub fn current(&self) -> f64 {
        self.envelope
    }
}

/// Feed-forward compressor, stereo-linked
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f64,
    ratio: f64,
    knee_db: f64,
    attack_ms: f64,
    release_ms: f64,
    makeup: MakeupGain,
    detector: DetectorKind,
    follower: EnvelopeFollower,
    /// RMS detector state: one-pole smoothed mean square
    ms_state: f64,
    ms_coeff: f64,
    gain_reduction_db: f64,
    sample_rate: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        let mut comp = Self {
            threshold_db: -20.0,
            ratio: 4.0,
            knee_db: 6.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup: MakeupGain::Manual(0.0),
            detector: DetectorKind::Peak,
            follower: EnvelopeFollower::new(sample_rate),
            ms_state: 0.0,
            ms_coeff: 0.0,
            gain_reduction_db: 0.0,
            sample_rate,
        };
        comp.update_times();
        comp
    }

    pub fn from_config(config: &CompressorConfig, sample_rate: f64) -> Self {
        let mut comp = Self::new(sample_rate);
        comp.apply_config(config);
        comp
    }

    pub fn apply_config(&mut self, config: &CompressorConfig) {
        self.set_threshold(config.threshold_db);
        self.set_ratio(config.ratio);
        self.set_knee(config.knee_db);
        self.set_attack(config.attack_ms);
        self.set_release(config.release_ms);
        self.makeup = config.makeup;
        self.detector = config.detector;
    }

    pub fn config(&self) -> CompressorConfig {
        CompressorConfig {
            threshold_db: self.threshold_db,
            ratio: self.ratio,
            knee_db: self.knee_db,
            attack_ms: self.attack_ms,
            release_ms: self.release_ms,
            makeup: self.makeup,
            detector: self.detector,
        }
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db.clamp(-60.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn set_knee(&mut self, db: f64) {
        self.knee_db = db.clamp(0.0, 40.0);
    }

    pub fn set_attack(&mut self, ms: f64) {
        self.attack_ms = ms.clamp(0.1, 1000.0);
        self.update_times();
    }

    pub fn set_release(&mut self, ms: f64) {
        self.release_ms = ms.clamp(0.1, 1000.0);
        self.update_times();
    }

    pub fn set_makeup(&mut self, makeup: MakeupGain) {
        self.makeup = makeup;
    }

    pub fn set_detector(&mut self, detector: DetectorKind) {
        self.detector = detector;
    }

    fn update_times(&mut self) {
        self.follower.set_times(self.attack_ms, self.release_ms);
        // ~5 ms mean-square integration for the RMS detector
        self.ms_coeff = (-1.0 / (0.005 * self.sample_rate)).exp();
    }

    /// Instantaneous gain reduction in dB (positive = reducing)
    pub fn gain_reduction_db(&self) -> f64 {
        self.gain_reduction_db
    }

    /// Auto makeup estimate: -threshold * (1 - 1/ratio) / 2
    pub fn auto_makeup_db(&self) -> f64 {
        -self.threshold_db * (1.0 - 1.0 / self.ratio) / 2.0
    }

    fn makeup_gain(&self) -> f64 {
        let db = match self.makeup {
            MakeupGain::Manual(db) => db,
            MakeupGain::Auto => self.auto_makeup_db(),
        };
        db_to_gain(db)
    }

    /// Gain reduction for an input level, with the quadratic soft knee
    #[inline]
    fn gain_curve(&self, input_db: f64) -> f64 {
        let over = input_db - self.threshold_db;
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee_db <= 0.0 {
            // Hard knee
            return if over > 0.0 { over * slope } else { 0.0 };
        }
        let half_knee = self.knee_db / 2.0;
        if over < -half_knee {
            0.0
        } else if over > half_knee {
            over * slope
        } else {
            let x = over + half_knee;
            slope * x * x / (2.0 * self.knee_db)
        }
    }

    #[inline]
    fn detect(&mut self, key_l: Sample, key_r: Sample) -> f64 {
        let key = key_l.abs().max(key_r.abs());
        match self.detector {
            DetectorKind::Peak => self.follower.process(key),
            DetectorKind::Rms => {
                let sq = (key_l * key_l + key_r * key_r) * 0.5;
                self.ms_state = sq + self.ms_coeff * (self.ms_state - sq);
                self.follower.process(self.ms_state.max(0.0).sqrt())
            }
        }
    }

    /// Process a stereo block in place. When `sidechain` is provided its
    /// signal drives the detector instead of the main input.
    pub fn process_block(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
        sidechain: Option<(&[Sample], &[Sample])>,
    ) {
        debug_assert_eq!(left.len(), right.len());
        let makeup = self.makeup_gain();

        for i in 0..left.len() {
            let (key_l, key_r) = match sidechain {
                Some((sl, sr)) => (sl[i], sr[i]),
                None => (left[i], right[i]),
            };
            let envelope = self.detect(key_l, key_r);
            let gr_db = if envelope > 1e-10 {
                self.gain_curve(20.0 * envelope.log10())
            } else {
                0.0
            };
            self.gain_reduction_db = gr_db;
            let gain = db_to_gain(-gr_db) * makeup;
            left[i] *= gain;
            right[i] *= gain;
        }
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.follower.reset();
        self.ms_state = 0.0;
        self.gain_reduction_db = 0.0;
    }
}

impl ProcessorConfig for Compressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.follower.set_sample_rate(sample_rate);
        self.update_times();
    }
}
