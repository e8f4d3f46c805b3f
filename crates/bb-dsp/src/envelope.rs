//! Envelope generators
//!
//! Three shapes: linear ADSR, exponential attack/release, and piecewise
//! custom. Exponential ramps never touch zero: they target -90 dB and snap
//! to idle there. `trigger_release` always ramps from the current value, so
//! a release fired mid-attack is click-free.

use bb_core::{AdsrParams, Sample};

/// Level below which a releasing envelope snaps to idle (-90 dB)
pub const IDLE_FLOOR: f64 = 3.1622776601683794e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurveShape {
    #[default]
    Linear,
    Exponential,
}

/// ADSR envelope generator
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,
    shape: CurveShape,
    sample_rate: f64,
    stage: EnvelopeStage,
    value: f64,
    /// Level the release started from
    release_from: f64,
    /// Per-stage one-pole coefficient for the exponential shape
    exp_coeff: f64,
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            attack: 0.005,
            decay: 0.08,
            sustain: 0.7,
            release: 0.15,
            shape: CurveShape::Linear,
            sample_rate,
            stage: EnvelopeStage::Idle,
            value: 0.0,
            release_from: 0.0,
            exp_coeff: 0.0,
        }
    }

    pub fn from_params(params: &AdsrParams, sample_rate: f64) -> Self {
        let mut env = Self::new(sample_rate);
        env.set_params(params);
        env
    }

    pub fn set_params(&mut self, params: &AdsrParams) {
        self.attack = params.attack.max(0.0);
        self.decay = params.decay.max(0.0);
        self.sustain = params.sustain.clamp(0.0, 1.0);
        self.release = params.release.max(0.0);
    }

    pub fn set_shape(&mut self, shape: CurveShape) {
        self.shape = shape;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    #[inline]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// Start the attack. The envelope continues from its current level, so
    /// retriggering an active voice does not click.
    pub fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.exp_coeff = Self::coeff(self.attack, self.sample_rate);
    }

    /// Move to the release stage from the current value.
    pub fn trigger_release(&mut self) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }
        self.release_from = self.value;
        self.stage = EnvelopeStage::Release;
        self.exp_coeff = Self::coeff(self.release, self.sample_rate);
    }

    /// Cut to idle immediately.
    pub fn kill(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.value = 0.0;
    }

    fn coeff(time_secs: f64, sample_rate: f64) -> f64 {
        if time_secs <= 0.0 {
            0.0
        } else {
            (-1.0 / (time_secs * sample_rate)).exp()
        }
    }

    /// Advance one sample and return the new level.
    #[inline]
    pub fn next(&mut self) -> f64 {
        match self.stage {
            EnvelopeStage::Idle => 0.0,
            EnvelopeStage::Attack => {
                match self.shape {
                    CurveShape::Linear => {
                        let step = if self.attack <= 0.0 {
                            1.0
                        } else {
                            1.0 / (self.attack * self.sample_rate)
                        };
                        self.value += step;
                    }
                    CurveShape::Exponential => {
                        // Target slightly above peak so the ramp reaches 1.0
                        // in roughly the configured time
                        let target = 1.2;
                        self.value = target + self.exp_coeff * (self.value - target);
                    }
                }
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.stage = EnvelopeStage::Decay;
                    self.exp_coeff = Self::coeff(self.decay, self.sample_rate);
                }
                self.value
            }
            EnvelopeStage::Decay => {
                match self.shape {
                    CurveShape::Linear => {
                        let step = if self.decay <= 0.0 {
                            1.0
                        } else {
                            (1.0 - self.sustain) / (self.decay * self.sample_rate)
                        };
                        self.value -= step;
                    }
                    CurveShape::Exponential => {
                        self.value = self.sustain + self.exp_coeff * (self.value - self.sustain);
                    }
                }
                if self.value <= self.sustain + 1e-6 {
                    self.value = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
                self.value
            }
            EnvelopeStage::Sustain => {
                self.value = self.sustain;
                if self.value <= IDLE_FLOOR {
                    self.stage = EnvelopeStage::Idle;
                    self.value = 0.0;
                }
                self.value
            }
            EnvelopeStage::Release => {
                match self.shape {
                    CurveShape::Linear => {
                        let step = if self.release <= 0.0 {
                            self.release_from.max(1.0)
                        } else {
                            self.release_from / (self.release * self.sample_rate)
                        };
                        self.value -= step;
                    }
                    CurveShape::Exponential => {
                        self.value *= self.exp_coeff;
                    }
                }
                if self.value <= IDLE_FLOOR {
                    self.stage = EnvelopeStage::Idle;
                    self.value = 0.0;
                }
                self.value
            }
        }
    }
}

/// Custom piecewise-linear envelope over sorted (time, value) pairs.
/// `trigger_release` cancels anything scheduled past the current time and
/// ramps to zero over the configured release.
#[derive(Debug, Clone)]
pub struct PiecewiseEnvelope {
    points: Vec<(f64, f64)>,
    release: f64,
    sample_rate: f64,
    time: f64,
    releasing: bool,
    release_from: f64,
    release_at: f64,
}

impl PiecewiseEnvelope {
    /// Points must be sorted by time; values are clamped to [0, 1].
    pub fn new(points: Vec<(f64, f64)>, release: f64, sample_rate: f64) -> Self {
        let mut points: Vec<(f64, f64)> = points
            .into_iter()
            .map(|(t, v)| (t.max(0.0), v.clamp(0.0, 1.0)))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            points,
            release: release.max(0.0),
            sample_rate,
            time: 0.0,
            releasing: false,
            release_from: 0.0,
            release_at: 0.0,
        }
    }

    pub fn trigger(&mut self) {
        self.time = 0.0;
        self.releasing = false;
    }

    pub fn trigger_release(&mut self) {
        if self.releasing {
            return;
        }
        self.release_from = self.value_at(self.time);
        self.release_at = self.time;
        self.releasing = true;
    }

    fn value_at(&self, t: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let idx = self.points.partition_point(|p| p.0 <= t);
        if idx == 0 {
            return self.points[0].1;
        }
        if idx == self.points.len() {
            return self.points[idx - 1].1;
        }
        let a = self.points[idx - 1];
        let b = self.points[idx];
        let span = b.0 - a.0;
        if span <= 0.0 {
            return b.1;
        }
        a.1 + (b.1 - a.1) * (t - a.0) / span
    }

    #[inline]
    pub fn next(&mut self) -> Sample {
        let value = if self.releasing {
            if self.release <= 0.0 {
                0.0
            } else {
                let progress = (self.time - self.release_at) / self.release;
                (self.release_from * (1.0 - progress)).max(0.0)
            }
        } else {
            self.value_at(self.time)
        };
        self.time += 1.0 / self.sample_rate;
        value
    }

    pub fn is_finished(&self) -> bool {
        self.releasing && self.time - self.release_at >= self.release
    }
}
