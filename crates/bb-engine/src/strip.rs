//! Track strip
//!
//! Fixed topology: input -> pre-gain -> EQ -> compressor -> insert chain ->
//! post-gain -> equal-power pan -> mute gate -> output. Sends tap the
//! signal after post-gain, before the panner, and land in bus inputs
//! through a per-send gain.

use bb_core::{BusId, CompressorConfig, SendLevel, Sample, TrackMixerState, db_to_gain};
use bb_dsp::loudness::{PeakMeter, RmsMeter};
use bb_dsp::{Compressor, EqStack, Processor};

use crate::insert::InsertChain;

/// Equal-power pan gains for pan in [-1, 1]
#[inline]
pub fn pan_gains(pan: f64) -> (f64, f64) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f64::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

#[derive(Debug, Clone, Copy)]
pub struct SendTap {
    pub bus: BusId,
    pub level: f64,
}

pub struct TrackStrip {
    pre_gain_db: f64,
    post_gain_db: f64,
    pre_gain: f64,
    post_gain: f64,
    /// Channel fader applied with post-gain
    fader: f64,
    pan: f64,
    muted: bool,
    pub eq: EqStack,
    pub eq_enabled: bool,
    pub compressor: Compressor,
    pub compressor_enabled: bool,
    pub inserts: InsertChain,
    sends: Vec<SendTap>,
    peak_l: PeakMeter,
    peak_r: PeakMeter,
    rms_l: RmsMeter,
    rms_r: RmsMeter,
    /// Post-gain pre-pan copy for send taps, preallocated
    send_l: Vec<Sample>,
    send_r: Vec<Sample>,
}

impl TrackStrip {
    pub fn new(sample_rate: f64, block_len: usize, eq_fft_size: usize) -> Self {
        Self {
            pre_gain_db: 0.0,
            post_gain_db: 0.0,
            pre_gain: 1.0,
            post_gain: 1.0,
            fader: 1.0,
            pan: 0.0,
            muted: false,
            eq: EqStack::new(sample_rate, block_len, eq_fft_size),
            eq_enabled: false,
            compressor: Compressor::new(sample_rate),
            compressor_enabled: false,
            inserts: InsertChain::new(),
            sends: Vec::new(),
            peak_l: PeakMeter::new(sample_rate),
            peak_r: PeakMeter::new(sample_rate),
            rms_l: RmsMeter::new(sample_rate, 300.0),
            rms_r: RmsMeter::new(sample_rate, 300.0),
            send_l: vec![0.0; block_len],
            send_r: vec![0.0; block_len],
        }
    }

    pub fn set_pre_gain_db(&mut self, db: f64) {
        self.pre_gain_db = db.clamp(-96.0, 24.0);
        self.pre_gain = db_to_gain(self.pre_gain_db);
    }

    pub fn set_post_gain_db(&mut self, db: f64) {
        self.post_gain_db = db.clamp(-96.0, 24.0);
        self.post_gain = db_to_gain(self.post_gain_db);
    }

    /// Channel fader as linear gain 0..=1 (the track's `volume` param)
    pub fn set_fader(&mut self, gain: f64) {
        self.fader = gain.clamp(0.0, 1.0);
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn set_compressor_config(&mut self, config: &CompressorConfig) {
        self.compressor.apply_config(config);
    }

    /// Set or update one send level; level 0 removes nothing, the tap just
    /// contributes silence.
    pub fn set_send(&mut self, bus: BusId, level: f64) {
        let level = level.clamp(0.0, 1.0);
        match self.sends.iter_mut().find(|s| s.bus == bus) {
            Some(send) => send.level = level,
            None => self.sends.push(SendTap { bus, level }),
        }
    }

    pub fn remove_send(&mut self, bus: BusId) {
        self.sends.retain(|s| s.bus != bus);
    }

    pub fn sends(&self) -> &[SendTap] {
        &self.sends
    }

    /// Reported strip latency (EQ mode plus active inserts)
    pub fn latency(&self) -> usize {
        let eq = if self.eq_enabled { self.eq.latency() } else { 0 };
        eq + self.inserts.latency()
    }

    /// Process one block in place. `audible` folds in the session solo
    /// state: muted strips and non-soloed strips during solo are gated.
    /// `sink` receives the post-gain pre-pan send signal per tap.
    pub fn process(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
        audible: bool,
        sink: &mut dyn FnMut(BusId, f64, &[Sample], &[Sample]),
    ) {
        let len = left.len();

        // pre-gain
        if self.pre_gain != 1.0 {
            for i in 0..len {
                left[i] *= self.pre_gain;
                right[i] *= self.pre_gain;
            }
        }

        if self.eq_enabled {
            self.eq.process_block(left, right);
        }

        if self.compressor_enabled {
            self.compressor.process_block(left, right, None);
        }

        self.inserts.process(left, right);

        // post-gain and fader
        let post = self.post_gain * self.fader;
        for i in 0..len {
            left[i] *= post;
            right[i] *= post;
        }

        // Sends tap here: post-gain, pre-pan
        if !self.sends.is_empty() {
            self.send_l[..len].copy_from_slice(left);
            self.send_r[..len].copy_from_slice(right);
            for tap in &self.sends {
                if tap.level > 0.0 {
                    sink(tap.bus, tap.level, &self.send_l[..len], &self.send_r[..len]);
                }
            }
        }

        // Equal-power pan
        let (gain_l, gain_r) = pan_gains(self.pan);
        for i in 0..len {
            left[i] *= gain_l;
            right[i] *= gain_r;
        }

        // Mute gate
        if self.muted || !audible {
            left[..len].fill(0.0);
            right[..len].fill(0.0);
        }

        self.peak_l.process_block(left);
        self.peak_r.process_block(right);
        self.rms_l.process_block(left);
        self.rms_r.process_block(right);
    }

    pub fn peak_db(&self) -> (f64, f64) {
        (self.peak_l.current_db(), self.peak_r.current_db())
    }

    pub fn rms_db(&self) -> (f64, f64) {
        (self.rms_l.current_db(), self.rms_r.current_db())
    }

    pub fn gain_reduction_db(&self) -> f64 {
        if self.compressor_enabled {
            self.compressor.gain_reduction_db()
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.eq.reset();
        self.compressor.reset();
        self.inserts.reset();
        self.peak_l.reset();
        self.peak_r.reset();
        self.rms_l.reset();
        self.rms_r.reset();
    }

    /// Mixer-state snapshot for persistence
    pub fn mixer_state(&self, soloed: bool) -> TrackMixerState {
        TrackMixerState {
            pre_gain_db: self.pre_gain_db,
            post_gain_db: self.post_gain_db,
            pan: self.pan,
            muted: self.muted,
            soloed,
            sends: self
                .sends
                .iter()
                .map(|s| SendLevel {
                    bus: s.bus,
                    level: s.level as f32,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip() -> TrackStrip {
        TrackStrip::new(48000.0, 256, 1024)
    }

    fn no_sink() -> impl FnMut(BusId, f64, &[Sample], &[Sample]) {
        |_, _, _, _| {}
    }

    #[test]
    fn test_equal_power_pan_center() {
        // Property: at pan = 0, gL^2 + gR^2 = 1 within 1e-6
        let (l, r) = pan_gains(0.0);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);
        assert!((l - r).abs() < 1e-12);
    }

    #[test]
    fn test_equal_power_across_range() {
        for i in 0..=20 {
            let pan = -1.0 + i as f64 * 0.1;
            let (l, r) = pan_gains(pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-6, "pan {pan}");
        }
        let (l, r) = pan_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-12);
        assert!(r.abs() < 1e-12);
    }

    #[test]
    fn test_hard_pan_left_silences_right() {
        let mut s = strip();
        s.set_pan(-1.0);
        let mut l = vec![0.5; 256];
        let mut r = vec![0.5; 256];
        s.process(&mut l, &mut r, true, &mut no_sink());
        assert!(l.iter().all(|&x| (x - 0.5).abs() < 1e-9));
        assert!(r.iter().all(|&x| x.abs() < 1e-12));
    }

    #[test]
    fn test_mute_silences_output() {
        let mut s = strip();
        s.set_muted(true);
        let mut l = vec![0.5; 256];
        let mut r = vec![0.5; 256];
        s.process(&mut l, &mut r, true, &mut no_sink());
        assert!(l.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_solo_gate_silences_non_soloed() {
        let mut s = strip();
        let mut l = vec![0.5; 256];
        let mut r = vec![0.5; 256];
        s.process(&mut l, &mut r, false, &mut no_sink());
        assert!(l.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_sends_tap_pre_pan_post_gain() {
        let mut s = strip();
        s.set_post_gain_db(-6.0);
        s.set_pan(-1.0); // pan must not affect the tap
        s.set_send(9, 0.5);
        let mut l = vec![1.0; 256];
        let mut r = vec![1.0; 256];
        let mut captured: Vec<(BusId, f64, f64, f64)> = Vec::new();
        s.process(&mut l, &mut r, true, &mut |bus, level, sl, sr| {
            captured.push((bus, level, sl[0], sr[0]));
        });
        assert_eq!(captured.len(), 1);
        let (bus, level, sl, sr) = captured[0];
        assert_eq!(bus, 9);
        assert_eq!(level, 0.5);
        // Tap sees post-gain signal with both channels equal (pre-pan)
        let expected = db_to_gain(-6.0);
        assert!((sl - expected).abs() < 1e-9);
        assert!((sr - expected).abs() < 1e-9);
    }

    #[test]
    fn test_gain_staging() {
        let mut s = strip();
        s.set_pre_gain_db(6.0);
        s.set_post_gain_db(-6.0);
        let mut l = vec![0.5; 256];
        let mut r = vec![0.5; 256];
        s.process(&mut l, &mut r, true, &mut no_sink());
        // +6 then -6 cancels; center pan applies cos(45 deg)
        let expected = 0.5 * std::f64::consts::FRAC_1_SQRT_2;
        assert!((l[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_fader_scales_output() {
        let mut s = strip();
        s.set_fader(0.5);
        let mut l = vec![1.0; 256];
        let mut r = vec![1.0; 256];
        s.process(&mut l, &mut r, true, &mut no_sink());
        let expected = 0.5 * std::f64::consts::FRAC_1_SQRT_2;
        assert!((l[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_mixer_state_snapshot() {
        let mut s = strip();
        s.set_pre_gain_db(3.0);
        s.set_pan(0.25);
        s.set_send(4, 0.7);
        let state = s.mixer_state(true);
        assert_eq!(state.pre_gain_db, 3.0);
        assert_eq!(state.pan, 0.25);
        assert!(state.soloed);
        assert_eq!(state.sends.len(), 1);
        assert_eq!(state.sends[0].bus, 4);
    }
}
