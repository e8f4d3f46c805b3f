//! Loudness and level metering per ITU-R BS.1770-4 / EBU R128
//!
//! K-weighting runs as two cascaded time-domain biquads whose coefficients
//! are designed for the session sample rate from the standard's analog
//! prototypes (a shelf near 1682 Hz and a high-pass near 38 Hz), not scaled
//! from the 48 kHz table. Gating blocks are 400 ms with 75% overlap.
//! Integrated loudness applies the -70 LUFS absolute gate and then the
//! -10 LU relative gate in the linear mean-square domain over the whole
//! measurement.

use bb_core::Sample;

use crate::biquad::{BiquadCoeffs, BiquadTdf2};
use crate::MonoProcessor;

/// The +0.691 dB offset from BS.1770's loudness formula
const LOUDNESS_OFFSET: f64 = -0.691;

/// Absolute gate threshold
const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Hop between gating blocks: 100 ms (75% overlap of 400 ms blocks)
const HOPS_PER_SECOND: usize = 10;

/// Hops per momentary window (400 ms)
const MOMENTARY_HOPS: usize = 4;

/// Hops per short-term window (3 s)
const SHORT_TERM_HOPS: usize = 30;

/// Default capacity: 2 hours of gating blocks
const DEFAULT_MAX_BLOCKS: usize = 2 * 3600 * HOPS_PER_SECOND;

/// K-weighting pre-filter coefficient pair for an arbitrary sample rate.
///
/// Stage 1 is the high-frequency shelf, stage 2 the low-frequency high-pass.
/// The analog prototype parameters reproduce the coefficient table in
/// BS.1770-4 when evaluated at 48 kHz.
pub fn k_weighting_coeffs(sample_rate: f64) -> (BiquadCoeffs, BiquadCoeffs) {
    let shelf = BiquadCoeffs::high_shelf(
        1681.974450955533,
        0.7071752369554196,
        3.999843853973347,
        sample_rate,
    );
    let highpass = BiquadCoeffs::highpass(38.13547087602444, 0.5003270373238773, sample_rate);
    (shelf, highpass)
}

/// One channel of the K-weighting pre-filter
#[derive(Debug, Clone)]
struct KWeighting {
    shelf: BiquadTdf2,
    highpass: BiquadTdf2,
}

impl KWeighting {
    fn new(sample_rate: f64) -> Self {
        let (shelf, highpass) = k_weighting_coeffs(sample_rate);
        Self {
            shelf: BiquadTdf2::with_coeffs(shelf, sample_rate),
            highpass: BiquadTdf2::with_coeffs(highpass, sample_rate),
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        self.highpass.process_sample(self.shelf.process_sample(input))
    }

    fn reset(&mut self) {
        use crate::Processor;
        self.shelf.reset();
        self.highpass.reset();
    }
}

#[inline]
fn loudness_of(power: f64) -> f64 {
    LOUDNESS_OFFSET + 10.0 * power.max(1e-12).log10()
}

/// Peak meter with exponential decay and dBFS readout
#[derive(Debug, Clone)]
pub struct PeakMeter {
    current: f64,
    release_coeff: f64,
}

impl PeakMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            current: 0.0,
            // ~600 ms fallback
            release_coeff: (-1.0 / (0.6 * sample_rate)).exp(),
        }
    }

    #[inline]
    pub fn process(&mut self, sample: Sample) {
        let abs = sample.abs();
        if abs > self.current {
            self.current = abs;
        } else {
            self.current *= self.release_coeff;
        }
    }

    pub fn process_block(&mut self, samples: &[Sample]) {
        for &s in samples {
            self.process(s);
        }
    }

    pub fn current_db(&self) -> f64 {
        20.0 * self.current.max(1e-10).log10()
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
    }
}

/// Sliding-window RMS meter with dBFS readout
#[derive(Debug, Clone)]
pub struct RmsMeter {
    buffer: Vec<f64>,
    sum: f64,
    pos: usize,
}

impl RmsMeter {
    /// `window_ms` sliding analysis window
    pub fn new(sample_rate: f64, window_ms: f64) -> Self {
        let len = ((window_ms * 0.001 * sample_rate) as usize).max(1);
        Self {
            buffer: vec![0.0; len],
            sum: 0.0,
            pos: 0,
        }
    }

    #[inline]
    pub fn process(&mut self, sample: Sample) {
        let sq = sample * sample;
        self.sum -= self.buffer[self.pos];
        self.sum += sq;
        self.buffer[self.pos] = sq;
        self.pos = (self.pos + 1) % self.buffer.len();
    }

    pub fn process_block(&mut self, samples: &[Sample]) {
        for &s in samples {
            self.process(s);
        }
    }

    pub fn current_db(&self) -> f64 {
        let mean = (self.sum / self.buffer.len() as f64).max(0.0);
        10.0 * mean.max(1e-20).log10()
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.sum = 0.0;
        self.pos = 0;
    }
}

/// Single-channel true-peak estimator: 4x oversampling by polyphase sinc
/// interpolation (BS.1770-4 Annex 2 style).
#[derive(Debug, Clone)]
pub struct TruePeakMeter {
    history: [f64; TP_TAPS],
    pos: usize,
    max_peak: f64,
}

const TP_TAPS: usize = 12;
const TP_PHASES: usize = 4;

/// 4-phase interpolation bank, Hann-windowed sinc, 12 taps per phase
fn tp_phase_coeff(phase: usize, tap: usize) -> f64 {
    let center = (TP_TAPS / 2) as f64;
    let t = tap as f64 + phase as f64 / TP_PHASES as f64 - center;
    let sinc = if t.abs() < 1e-9 {
        1.0
    } else {
        (std::f64::consts::PI * t).sin() / (std::f64::consts::PI * t)
    };
    let window = 0.5
        + 0.5
            * (std::f64::consts::PI * (tap as f64 + phase as f64 / TP_PHASES as f64)
                / TP_TAPS as f64
                * 2.0
                - std::f64::consts::PI)
            .cos();
    sinc * window
}

impl TruePeakMeter {
    pub fn new() -> Self {
        Self {
            history: [0.0; TP_TAPS],
            pos: 0,
            max_peak: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, sample: Sample) {
        self.history[self.pos] = sample;
        self.pos = (self.pos + 1) % TP_TAPS;
        for phase in 0..TP_PHASES {
            let mut acc = 0.0;
            for tap in 0..TP_TAPS {
                let idx = (self.pos + tap) % TP_TAPS;
                acc += self.history[idx] * tp_phase_coeff(phase, tap);
            }
            let abs = acc.abs();
            if abs > self.max_peak {
                self.max_peak = abs;
            }
        }
    }

    pub fn process_block(&mut self, samples: &[Sample]) {
        for &s in samples {
            self.process(s);
        }
    }

    /// Maximum true peak in dBTP since the last reset
    pub fn max_db(&self) -> f64 {
        20.0 * self.max_peak.max(1e-10).log10()
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.pos = 0;
        self.max_peak = 0.0;
    }
}

impl Default for TruePeakMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Stereo LUFS meter: momentary, short-term, integrated, peak, true peak
pub struct LufsMeter {
    filter_l: KWeighting,
    filter_r: KWeighting,
    hop_size: usize,
    /// Running sum of K-weighted squares within the current hop
    hop_accum: f64,
    hop_fill: usize,
    /// Per-hop mean-square history, newest last (ring)
    hop_powers: [f64; SHORT_TERM_HOPS],
    hop_pos: usize,
    hops_seen: usize,
    /// 400 ms gating-block powers for the integrated measurement.
    /// Preallocated; the audio thread never grows it past capacity.
    gating_powers: Vec<f64>,
    overflowed: bool,
    momentary_lufs: f64,
    short_term_lufs: f64,
    sample_peak: f64,
    true_peak_l: TruePeakMeter,
    true_peak_r: TruePeakMeter,
}

impl LufsMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_capacity(sample_rate, DEFAULT_MAX_BLOCKS)
    }

    /// `max_blocks` bounds the integrated-measurement memory
    pub fn with_capacity(sample_rate: f64, max_blocks: usize) -> Self {
        Self {
            filter_l: KWeighting::new(sample_rate),
            filter_r: KWeighting::new(sample_rate),
            hop_size: (sample_rate as usize / HOPS_PER_SECOND).max(1),
            hop_accum: 0.0,
            hop_fill: 0,
            hop_powers: [0.0; SHORT_TERM_HOPS],
            hop_pos: 0,
            hops_seen: 0,
            gating_powers: Vec::with_capacity(max_blocks),
            overflowed: false,
            momentary_lufs: ABSOLUTE_GATE_LUFS,
            short_term_lufs: ABSOLUTE_GATE_LUFS,
            sample_peak: 0.0,
            true_peak_l: TruePeakMeter::new(),
            true_peak_r: TruePeakMeter::new(),
        }
    }

    /// Feed a stereo block
    pub fn process_block(&mut self, left: &[Sample], right: &[Sample]) {
        debug_assert_eq!(left.len(), right.len());
        for i in 0..left.len() {
            let peak = left[i].abs().max(right[i].abs());
            if peak > self.sample_peak {
                self.sample_peak = peak;
            }
            self.true_peak_l.process(left[i]);
            self.true_peak_r.process(right[i]);

            let kl = self.filter_l.process(left[i]);
            let kr = self.filter_r.process(right[i]);
            // Channel weights are 1.0 for L and R
            self.hop_accum += kl * kl + kr * kr;
            self.hop_fill += 1;

            if self.hop_fill >= self.hop_size {
                let hop_power = self.hop_accum / self.hop_size as f64;
                self.finish_hop(hop_power);
                self.hop_accum = 0.0;
                self.hop_fill = 0;
            }
        }
    }

    fn finish_hop(&mut self, hop_power: f64) {
        self.hop_powers[self.hop_pos] = hop_power;
        self.hop_pos = (self.hop_pos + 1) % SHORT_TERM_HOPS;
        self.hops_seen += 1;

        let momentary_power = self.window_power(MOMENTARY_HOPS);
        self.momentary_lufs = loudness_of(momentary_power);
        self.short_term_lufs = loudness_of(self.window_power(SHORT_TERM_HOPS));

        // Each finished 400 ms window becomes one gating block (75% overlap)
        if self.hops_seen >= MOMENTARY_HOPS {
            if self.gating_powers.len() < self.gating_powers.capacity() {
                self.gating_powers.push(momentary_power);
            } else {
                self.overflowed = true;
            }
        }
    }

    /// Mean power of the newest `hops` hops
    fn window_power(&self, hops: usize) -> f64 {
        let n = hops.min(self.hops_seen.max(1)).min(SHORT_TERM_HOPS);
        let mut sum = 0.0;
        for k in 0..n {
            let idx = (self.hop_pos + SHORT_TERM_HOPS - 1 - k) % SHORT_TERM_HOPS;
            sum += self.hop_powers[idx];
        }
        sum / n as f64
    }

    /// Momentary loudness (400 ms window)
    pub fn momentary(&self) -> f64 {
        self.momentary_lufs
    }

    /// Short-term loudness (3 s window)
    pub fn short_term(&self) -> f64 {
        self.short_term_lufs
    }

    /// Integrated loudness over the whole measurement with absolute and
    /// relative gating, computed in the linear mean-square domain.
    pub fn integrated(&self) -> f64 {
        let abs_gate_power = 10.0_f64.powf((ABSOLUTE_GATE_LUFS - LOUDNESS_OFFSET) / 10.0);

        let mut sum = 0.0;
        let mut count = 0usize;
        for &p in &self.gating_powers {
            if p >= abs_gate_power {
                sum += p;
                count += 1;
            }
        }
        if count == 0 {
            return ABSOLUTE_GATE_LUFS;
        }
        let ungated_mean = sum / count as f64;
        let relative_gate_lufs = loudness_of(ungated_mean) - 10.0;
        let rel_gate_power = 10.0_f64.powf((relative_gate_lufs - LOUDNESS_OFFSET) / 10.0);

        let mut sum2 = 0.0;
        let mut count2 = 0usize;
        for &p in &self.gating_powers {
            if p >= abs_gate_power && p >= rel_gate_power {
                sum2 += p;
                count2 += 1;
            }
        }
        if count2 == 0 {
            return ABSOLUTE_GATE_LUFS;
        }
        loudness_of(sum2 / count2 as f64)
    }

    /// Sample peak in dBFS
    pub fn peak_db(&self) -> f64 {
        20.0 * self.sample_peak.max(1e-10).log10()
    }

    /// True peak (4x oversampled estimate) in dBTP
    pub fn true_peak_db(&self) -> f64 {
        self.true_peak_l.max_db().max(self.true_peak_r.max_db())
    }

    /// The integrated measurement hit its memory bound and stopped growing
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn reset(&mut self) {
        self.filter_l.reset();
        self.filter_r.reset();
        self.hop_accum = 0.0;
        self.hop_fill = 0;
        self.hop_powers = [0.0; SHORT_TERM_HOPS];
        self.hop_pos = 0;
        self.hops_seen = 0;
        self.gating_powers.clear();
        self.overflowed = false;
        self.momentary_lufs = ABSOLUTE_GATE_LUFS;
        self.short_term_lufs = ABSOLUTE_GATE_LUFS;
        self.sample_peak = 0.0;
        self.true_peak_l.reset();
        self.true_peak_r.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biquad::frequency_response;

    fn sine(freq: f64, amp: f64, secs: f64, sr: f64) -> Vec<f64> {
        (0..(secs * sr) as usize)
            .map(|i| amp * (2.0 * std::f64::consts::PI * freq * i as f64 / sr).sin())
            .collect()
    }

    #[test]
    fn test_k_weighting_matches_bs1770_table_at_48k() {
        // BS.1770-4 publishes the stage-1 shelf coefficients at 48 kHz;
        // the analog-prototype design must reproduce them closely.
        let (shelf, _) = k_weighting_coeffs(48000.0);
        assert!((shelf.b0 - 1.53512485958697).abs() < 2e-4, "b0 {}", shelf.b0);
        assert!((shelf.b1 - -2.69169618940638).abs() < 2e-4);
        assert!((shelf.a1 - -1.69065929318241).abs() < 2e-4);
        assert!((shelf.a2 - 0.73248077421585).abs() < 2e-4);
    }

    #[test]
    fn test_k_weighting_shelf_gain_at_high_freq() {
        // ~+4 dB at high frequencies at any supported rate
        for sr in [44100.0, 48000.0, 96000.0] {
            let (shelf, _) = k_weighting_coeffs(sr);
            let (mag, _) = frequency_response(&shelf, 10000.0, sr);
            let db = 20.0 * mag.log10();
            assert!((db - 4.0).abs() < 0.35, "sr {sr}: {db} dB");
        }
    }

    #[test]
    fn test_sine_minus_23_dbfs_reads_minus_23_lufs() {
        // A 997 Hz sine at -23 dBFS peak in both channels must integrate to
        // -23 +/- 0.1 LUFS after 10 s (EBU Tech 3341 case 1): the -0.691
        // offset cancels the K-filter gain at 997 Hz and the two-channel sum
        // cancels the sine's -3.01 dB mean square.
        let sr = 48000.0;
        let amp = 10.0_f64.powf(-23.0 / 20.0);
        let signal = sine(997.0, amp, 10.0, sr);
        let mut meter = LufsMeter::new(sr);
        for chunk in signal.chunks(512) {
            meter.process_block(chunk, chunk);
        }
        let integrated = meter.integrated();
        assert!(
            (integrated + 23.0).abs() < 0.1,
            "integrated {integrated} LUFS"
        );
    }

    #[test]
    fn test_silence_gates_out() {
        let sr = 48000.0;
        let mut meter = LufsMeter::new(sr);
        let silence = vec![0.0; 48000];
        meter.process_block(&silence, &silence);
        assert_eq!(meter.integrated(), ABSOLUTE_GATE_LUFS);
    }

    #[test]
    fn test_integrated_ignores_silence_between_bursts() {
        // Relative gating: loud burst + long silence must read close to the
        // burst alone, not the average with silence.
        let sr = 48000.0;
        let burst = sine(997.0, 0.25, 2.0, sr);
        let silence = vec![0.0; (8.0 * sr) as usize];
        let mut meter = LufsMeter::new(sr);
        for chunk in burst.chunks(512) {
            meter.process_block(chunk, chunk);
        }
        let with_burst_only = {
            let mut m = LufsMeter::new(sr);
            for chunk in burst.chunks(512) {
                m.process_block(chunk, chunk);
            }
            m.integrated()
        };
        for chunk in silence.chunks(512) {
            meter.process_block(chunk, chunk);
        }
        assert!((meter.integrated() - with_burst_only).abs() < 0.5);
    }

    #[test]
    fn test_momentary_tracks_level_changes() {
        let sr = 48000.0;
        let mut meter = LufsMeter::new(sr);
        let loud = sine(997.0, 0.5, 1.0, sr);
        for chunk in loud.chunks(512) {
            meter.process_block(chunk, chunk);
        }
        let loud_reading = meter.momentary();
        let quiet = sine(997.0, 0.05, 1.0, sr);
        for chunk in quiet.chunks(512) {
            meter.process_block(chunk, chunk);
        }
        let quiet_reading = meter.momentary();
        assert!(loud_reading - quiet_reading > 15.0);
    }

    #[test]
    fn test_true_peak_catches_intersample_peak() {
        // A sine near Nyquist/2 with phase such that samples straddle the
        // crest: true peak must read at least the sample peak.
        let sr = 48000.0;
        let signal = sine(11025.0, 0.9, 0.1, sr);
        let mut meter = TruePeakMeter::new();
        meter.process_block(&signal);
        let sample_peak = signal.iter().fold(0.0f64, |m, &s| m.max(s.abs()));
        assert!(meter.max_db() >= 20.0 * sample_peak.log10() - 0.5);
    }

    #[test]
    fn test_peak_meter_decay() {
        let mut meter = PeakMeter::new(48000.0);
        meter.process(1.0);
        let at_peak = meter.current_db();
        for _ in 0..48000 {
            meter.process(0.0);
        }
        assert!(meter.current_db() < at_peak - 6.0);
    }

    #[test]
    fn test_rms_meter_of_dc() {
        let mut meter = RmsMeter::new(48000.0, 100.0);
        for _ in 0..9600 {
            meter.process(0.5);
        }
        // mean square of 0.5 DC = 0.25 -> -6.02 dB
        assert!((meter.current_db() + 6.02).abs() < 0.1);
    }
}
