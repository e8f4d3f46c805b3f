//! Subtractive synthesizer voice
//!
//! Two oscillators (the second carries the detune), a state-variable-style
//! biquad filter modulated by its own envelope and the LFOs, and an amp
//! envelope that gates the voice lifetime: when the release falls below
//! -90 dB the voice returns to idle and the pool reclaims it.

use bb_core::{AdsrParams, FilterKind, FilterParams, LfoParams, LfoTarget, Sample, TrackId,
    TrackParams, Waveform};
use bb_dsp::biquad::{BiquadCoeffs, BiquadTdf2};
use bb_dsp::envelope::AdsrEnvelope;
use bb_dsp::{MonoProcessor, Processor};

use crate::lfo::Lfo;
use crate::oscillator::{Oscillator, detune, note_to_freq};

/// Samples between filter-coefficient updates (control rate)
const CONTROL_INTERVAL: usize = 32;

/// Declick ramp length after a steal, in samples
const STEAL_RAMP_SAMPLES: f64 = 64.0;

/// Everything a voice needs to know from its owning track at trigger time
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    pub waveform: Waveform,
    pub detune_cents: f64,
    pub reset_phase: bool,
    pub amp_env: AdsrParams,
    pub filter: FilterParams,
    pub filter_env: AdsrParams,
    pub filter_env_amount: f64,
    pub lfos: [LfoParams; 2],
}

impl From<&TrackParams> for VoiceParams {
    fn from(params: &TrackParams) -> Self {
        Self {
            waveform: params.waveform,
            detune_cents: params.detune_cents,
            reset_phase: params.reset_phase,
            amp_env: params.amp_env,
            filter: params.filter,
            filter_env: params.filter_env,
            filter_env_amount: params.filter_env_amount,
            lfos: params.lfos,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    Active,
    Releasing,
}

/// Map resonance 0..=1 to a filter Q, clamped to [0.5, 20] so resonance
/// cannot push the filter into self-oscillation without explicit drive.
#[inline]
pub fn resonance_to_q(resonance: f64) -> f64 {
    (0.5 * 40.0_f64.powf(resonance.clamp(0.0, 1.0))).clamp(0.5, 20.0)
}

#[derive(Debug, Clone)]
pub struct Voice {
    id: u64,
    state: VoiceState,
    track: TrackId,
    note: u8,
    velocity: f64,
    base_freq: f64,
    started_at: u64,

    osc1: Oscillator,
    osc2: Oscillator,
    detune_cents: f64,

    filter: BiquadTdf2,
    filter_params: FilterParams,
    filter_env_amount: f64,

    amp_env: AdsrEnvelope,
    filter_env: AdsrEnvelope,
    lfos: [Lfo; 2],

    /// Post-steal declick gain ramp
    declick: f64,
    control_countdown: usize,
    sample_rate: f64,
}

impl Voice {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            id: 0,
            state: VoiceState::Idle,
            track: 0,
            note: 0,
            velocity: 0.0,
            base_freq: 440.0,
            started_at: 0,
            osc1: Oscillator::new(sample_rate),
            osc2: Oscillator::new(sample_rate),
            detune_cents: 0.0,
            filter: BiquadTdf2::new(sample_rate),
            filter_params: FilterParams::default(),
            filter_env_amount: 0.0,
            amp_env: AdsrEnvelope::new(sample_rate),
            filter_env: AdsrEnvelope::new(sample_rate),
            lfos: [
                Lfo::new(LfoParams::default(), sample_rate),
                Lfo::new(LfoParams::default(), sample_rate),
            ],
            declick: 1.0,
            control_countdown: 0,
            sample_rate,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == VoiceState::Idle
    }

    #[inline]
    pub fn track(&self) -> TrackId {
        self.track
    }

    #[inline]
    pub fn note(&self) -> u8 {
        self.note
    }

    #[inline]
    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    /// Current amp-envelope output; the pool's steal metric
    #[inline]
    pub fn amp_level(&self) -> f64 {
        self.amp_env.value()
    }

    /// Start the voice. `stolen` engages a short declick ramp because the
    /// previous program material is cut mid-sample.
    pub fn trigger(
        &mut self,
        id: u64,
        track: TrackId,
        note: u8,
        velocity: f64,
        params: &VoiceParams,
        now: u64,
        stolen: bool,
    ) {
        self.id = id;
        self.track = track;
        self.note = note.min(127);
        self.velocity = velocity.clamp(0.0, 1.0);
        self.base_freq = note_to_freq(self.note);
        self.started_at = now;
        self.state = VoiceState::Active;

        self.osc1.set_waveform(params.waveform);
        self.osc2.set_waveform(params.waveform);
        self.detune_cents = params.detune_cents;
        self.osc1.set_frequency(self.base_freq);
        self.osc2.set_frequency(detune(self.base_freq, self.detune_cents));
        if params.reset_phase {
            self.osc1.reset_phase();
            self.osc2.reset_phase();
        }

        self.filter_params = params.filter;
        self.filter_env_amount = params.filter_env_amount;
        self.amp_env.set_params(&params.amp_env);
        self.filter_env.set_params(&params.filter_env);
        for (lfo, lfo_params) in self.lfos.iter_mut().zip(params.lfos.iter()) {
            lfo.set_params(*lfo_params);
        }

        if stolen {
            self.amp_env.kill();
            self.filter.reset();
            self.declick = 0.0;
        } else {
            self.declick = 1.0;
        }
        self.amp_env.trigger();
        self.filter_env.trigger();
        self.control_countdown = 0;
    }

    /// Move the amp envelope into release
    pub fn release(&mut self) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
            self.amp_env.trigger_release();
            self.filter_env.trigger_release();
        }
    }

    /// Silence immediately and return to idle
    pub fn kill(&mut self) {
        self.state = VoiceState::Idle;
        self.amp_env.kill();
        self.filter_env.kill();
    }

    fn update_filter(&mut self, cutoff_mod: f64, pitch_cents_mod: f64) {
        let cutoff = (self.filter_params.cutoff_hz
            + self.filter_env.value() * self.filter_env_amount
            + cutoff_mod)
            .clamp(20.0, self.sample_rate * 0.45);
        let q = resonance_to_q(self.filter_params.resonance);
        let coeffs = match self.filter_params.kind {
            FilterKind::Lowpass => BiquadCoeffs::lowpass(cutoff, q, self.sample_rate),
            FilterKind::Highpass => BiquadCoeffs::highpass(cutoff, q, self.sample_rate),
            FilterKind::Bandpass => BiquadCoeffs::bandpass(cutoff, q, self.sample_rate),
        };
        self.filter.set_coeffs(coeffs);

        if pitch_cents_mod != 0.0 || self.detune_cents != 0.0 {
            self.osc1
                .set_frequency(detune(self.base_freq, pitch_cents_mod));
            self.osc2
                .set_frequency(detune(self.base_freq, self.detune_cents + pitch_cents_mod));
        }
    }

    /// Additively render `range` of the track's stereo block. Returns false
    /// once the voice has gone idle.
    pub fn render(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
        from: usize,
        to: usize,
        beats_per_sample: f64,
    ) -> bool {
        if self.state == VoiceState::Idle {
            return false;
        }
        for i in from..to {
            // LFOs run at audio rate; the filter and pitch take effect at
            // the control interval
            let mut cutoff_mod = 0.0;
            let mut pitch_mod = 0.0;
            let mut amp_mod = 0.0;
            for lfo in self.lfos.iter_mut() {
                let value = lfo.next(beats_per_sample);
                match lfo.target() {
                    LfoTarget::FilterCutoff => cutoff_mod += value,
                    LfoTarget::PitchCents => pitch_mod += value,
                    LfoTarget::Amp => amp_mod += value,
                }
            }

            if self.control_countdown == 0 {
                self.update_filter(cutoff_mod, pitch_mod);
                self.control_countdown = CONTROL_INTERVAL;
            }
            self.control_countdown -= 1;

            let raw = (self.osc1.next() + self.osc2.next()) * 0.5;
            let filtered = self.filter.process_sample(raw);

            let amp = self.amp_env.next();
            let _ = self.filter_env.next();
            if self.declick < 1.0 {
                self.declick = (self.declick + 1.0 / STEAL_RAMP_SAMPLES).min(1.0);
            }
            let gain = (amp * self.velocity * (1.0 + amp_mod)).max(0.0) * self.declick;
            let out = filtered * gain;
            left[i] += out;
            right[i] += out;

            if self.amp_env.is_idle() {
                self.state = VoiceState::Idle;
                return false;
            }
        }
        true
    }
}
