//! EQ band stack
//!
//! Up to 24 serial bands with two processing modes: a zero-latency biquad
//! cascade, or a linear-phase FIR synthesized from the bands' magnitude
//! responses. A character saturator (4x oversampled waveshaper) and a global
//! equal-energy dry/wet sit behind the filter stage. Bypass short-circuits
//! input to output bit-exactly.
//!
//! Parameter writes never replace filter state: coefficient updates happen
//! at the next block boundary and the z^-1/z^-2 state is preserved.
//! Enable/disable crossfades a downstream unity-or-zero gain while the
//! filter keeps running, so there is no zipper noise.

use bb_core::{EngineError, EngineResult, EqBandConfig, EqBandKind, EqMode, EqSnapshot,
    MAX_EQ_BANDS, Sample};

use crate::biquad::{BiquadCoeffs, BiquadTdf2, frequency_response, q_from_bandwidth,
    q_from_shelf_slope};
use crate::linear_phase::LinearPhaseFilter;
use crate::saturation::OversampledShaper;
use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Samples over which the enable/disable gain crossfades
const ENABLE_RAMP_SAMPLES: f64 = 64.0;

/// One filter section of the stack
#[derive(Debug, Clone)]
pub struct EqBand {
    config: EqBandConfig,
    filter_l: BiquadTdf2,
    filter_r: BiquadTdf2,
    /// Downstream unity-or-zero gain, ramped
    enable_gain: f64,
    needs_update: bool,
    sample_rate: f64,
}

impl EqBand {
    pub fn new(mut config: EqBandConfig, sample_rate: f64) -> Self {
        config.frequency = config.frequency.clamp(10.0, 48_000.0);
        config.gain_db = config.gain_db.clamp(-60.0, 60.0);
        config.q = config.q.clamp(0.01, 100.0);
        config.slope_db_per_oct = config.slope_db_per_oct.clamp(0.1, 48.0);
        let enable_gain = if config.enabled { 1.0 } else { 0.0 };
        let mut band = Self {
            config,
            filter_l: BiquadTdf2::new(sample_rate),
            filter_r: BiquadTdf2::new(sample_rate),
            enable_gain,
            needs_update: true,
            sample_rate,
        };
        band.update_coeffs();
        band
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.config.id
    }

    #[inline]
    pub fn config(&self) -> &EqBandConfig {
        &self.config
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_kind(&mut self, kind: EqBandKind) {
        self.config.kind = kind;
        self.needs_update = true;
    }

    pub fn set_frequency(&mut self, freq: f64) -> EngineResult<()> {
        if !freq.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "eq.frequency",
                value: freq,
            });
        }
        self.config.frequency = freq.clamp(10.0, 48_000.0);
        self.needs_update = true;
        Ok(())
    }

    pub fn set_gain_db(&mut self, gain_db: f64) -> EngineResult<()> {
        if !gain_db.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "eq.gain_db",
                value: gain_db,
            });
        }
        self.config.gain_db = gain_db.clamp(-60.0, 60.0);
        self.needs_update = true;
        Ok(())
    }

    /// Set Q directly. Clears a previously set bandwidth: the pair is
    /// exclusive.
    pub fn set_q(&mut self, q: f64) -> EngineResult<()> {
        if !q.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "eq.q",
                value: q,
            });
        }
        self.config.q = q.clamp(0.01, 100.0);
        self.config.bandwidth_hz = None;
        self.needs_update = true;
        Ok(())
    }

    /// Set bandwidth in Hz; implies Q = frequency / bandwidth and clears
    /// the explicit Q.
    pub fn set_bandwidth(&mut self, bandwidth_hz: f64) -> EngineResult<()> {
        if !bandwidth_hz.is_finite() || bandwidth_hz <= 0.0 {
            return Err(EngineError::InvalidParameter {
                name: "eq.bandwidth_hz",
                value: bandwidth_hz,
            });
        }
        self.config.bandwidth_hz = Some(bandwidth_hz);
        self.config.q = q_from_bandwidth(self.config.frequency, bandwidth_hz);
        self.needs_update = true;
        Ok(())
    }

    /// Shelf slope in dB/octave; shelves only
    pub fn set_slope(&mut self, slope_db_per_oct: f64) -> EngineResult<()> {
        if !slope_db_per_oct.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "eq.slope",
                value: slope_db_per_oct,
            });
        }
        self.config.slope_db_per_oct = slope_db_per_oct.clamp(0.1, 48.0);
        self.needs_update = true;
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Frequency clamped below Nyquist for coefficient math
    fn internal_frequency(&self) -> f64 {
        self.config.frequency.min(self.sample_rate * 0.5 * 0.99)
    }

    fn effective_q(&self) -> f64 {
        match self.config.kind {
            EqBandKind::LowShelf | EqBandKind::HighShelf => {
                q_from_shelf_slope(self.config.gain_db, self.config.slope_db_per_oct)
            }
            _ => match self.config.bandwidth_hz {
                Some(bw) => q_from_bandwidth(self.config.frequency, bw),
                None => self.config.q,
            },
        }
    }

    /// Recompute coefficients. Filter state is preserved.
    pub fn update_coeffs(&mut self) {
        if !self.needs_update {
            return;
        }
        let freq = self.internal_frequency();
        let q = self.effective_q();
        let gain = self.config.gain_db;
        let sr = self.sample_rate;
        let coeffs = match self.config.kind {
            EqBandKind::Peaking => BiquadCoeffs::peaking(freq, q, gain, sr),
            EqBandKind::LowShelf => BiquadCoeffs::low_shelf(freq, q, gain, sr),
            EqBandKind::HighShelf => BiquadCoeffs::high_shelf(freq, q, gain, sr),
            EqBandKind::Lowpass => BiquadCoeffs::lowpass(freq, q, sr),
            EqBandKind::Highpass => BiquadCoeffs::highpass(freq, q, sr),
            EqBandKind::Bandpass => BiquadCoeffs::bandpass(freq, q, sr),
            EqBandKind::Notch => BiquadCoeffs::notch(freq, q, sr),
            EqBandKind::Allpass => BiquadCoeffs::allpass(freq, q, sr),
        };
        self.filter_l.set_coeffs(coeffs);
        self.filter_r.set_coeffs(coeffs);
        self.needs_update = false;
    }

    /// Magnitude of this band's section at a frequency (uses current coeffs)
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        let (mag, _) = frequency_response(self.filter_l.coeffs(), freq, self.sample_rate);
        mag
    }

    /// Process one stereo sample. The filter always runs; the band's
    /// contribution is crossfaded by the enable gain.
    #[inline]
    pub fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let target = if self.config.enabled { 1.0 } else { 0.0 };
        if self.enable_gain != target {
            let step = 1.0 / ENABLE_RAMP_SAMPLES;
            if self.enable_gain < target {
                self.enable_gain = (self.enable_gain + step).min(target);
            } else {
                self.enable_gain = (self.enable_gain - step).max(target);
            }
        }
        if self.enable_gain <= 0.0 && target <= 0.0 {
            return (left, right);
        }
        let wet_l = self.filter_l.process_sample(left);
        let wet_r = self.filter_r.process_sample(right);
        (
            left + (wet_l - left) * self.enable_gain,
            right + (wet_r - right) * self.enable_gain,
        )
    }

    pub fn reset(&mut self) {
        self.filter_l.reset();
        self.filter_r.reset();
        self.enable_gain = if self.config.enabled { 1.0 } else { 0.0 };
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.filter_l.set_sample_rate(sample_rate);
        self.filter_r.set_sample_rate(sample_rate);
        self.needs_update = true;
    }
}

/// Sample ring used to latency-align the global dry path in linear mode
#[derive(Debug, Clone)]
struct DryRing {
    buffer: Vec<f64>,
    pos: usize,
}

impl DryRing {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let out = self.buffer[self.pos];
        self.buffer[self.pos] = input;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// Serial EQ band stack with character stage and dry/wet
pub struct EqStack {
    bands: Vec<EqBand>,
    mode: EqMode,
    linear: LinearPhaseFilter,
    linear_dirty: bool,
    character: OversampledShaper,
    dry_wet: f64,
    bypass: bool,
    sample_rate: f64,
    fft_size: usize,
    block_len: usize,
    grid: Vec<f64>,
    dry_l: Vec<f64>,
    dry_r: Vec<f64>,
    dry_ring_l: DryRing,
    dry_ring_r: DryRing,
}

impl EqStack {
    pub fn new(sample_rate: f64, block_len: usize, fft_size: usize) -> Self {
        let linear = LinearPhaseFilter::new(fft_size, block_len);
        let grid_len = linear.grid_len();
        let mut character = OversampledShaper::new();
        character.set_mix(0.0);
        Self {
            bands: Vec::with_capacity(MAX_EQ_BANDS),
            mode: EqMode::ZeroLatency,
            linear,
            linear_dirty: false,
            character,
            dry_wet: 1.0,
            bypass: false,
            sample_rate,
            fft_size,
            block_len,
            grid: vec![1.0; grid_len],
            dry_l: vec![0.0; block_len],
            dry_r: vec![0.0; block_len],
            dry_ring_l: DryRing::new(fft_size / 2),
            dry_ring_r: DryRing::new(fft_size / 2),
        }
    }

    #[inline]
    pub fn mode(&self) -> EqMode {
        self.mode
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn set_mode(&mut self, mode: EqMode) {
        if self.mode != mode {
            self.mode = mode;
            self.linear_dirty = true;
        }
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    #[inline]
    pub fn bypassed(&self) -> bool {
        self.bypass
    }

    pub fn set_dry_wet(&mut self, mix: f64) {
        self.dry_wet = mix.clamp(0.0, 1.0);
    }

    /// Character amount doubles as the saturator's wet mix
    pub fn set_character(&mut self, amount: f64, drive_db: f64) {
        self.character.set_mix(amount);
        self.character.set_drive_db(drive_db);
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Option<&EqBand> {
        self.bands.get(index)
    }

    pub fn band_mut(&mut self, index: usize) -> Option<&mut EqBand> {
        self.linear_dirty = true;
        self.bands.get_mut(index)
    }

    /// Append or insert a band. Fails once 24 bands exist.
    pub fn add_band(&mut self, config: EqBandConfig) -> EngineResult<usize> {
        if self.bands.len() >= MAX_EQ_BANDS {
            return Err(EngineError::CapacityExceeded("eq bands"));
        }
        self.bands.push(EqBand::new(config, self.sample_rate));
        self.linear_dirty = true;
        Ok(self.bands.len() - 1)
    }

    pub fn remove_band(&mut self, index: usize) -> Option<EqBandConfig> {
        if index >= self.bands.len() {
            return None;
        }
        self.linear_dirty = true;
        Some(self.bands.remove(index).config)
    }

    pub fn reorder_band(&mut self, from: usize, to: usize) -> EngineResult<()> {
        if from >= self.bands.len() || to >= self.bands.len() {
            return Err(EngineError::InvalidParameter {
                name: "eq.reorder",
                value: from as f64,
            });
        }
        let band = self.bands.remove(from);
        self.bands.insert(to, band);
        self.linear_dirty = true;
        Ok(())
    }

    pub fn set_band_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(band) = self.bands.get_mut(index) {
            band.set_enabled(enabled);
            self.linear_dirty = true;
        }
    }

    /// Reported processing latency
    pub fn latency(&self) -> usize {
        match self.mode {
            EqMode::ZeroLatency => 0,
            EqMode::LinearPhase => self.fft_size / 2,
        }
    }

    /// Combined magnitude of all enabled bands at a frequency
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        self.bands
            .iter()
            .filter(|b| b.enabled())
            .map(|b| b.magnitude_at(freq))
            .product()
    }

    fn rebuild_linear(&mut self) {
        for band in self.bands.iter_mut() {
            band.update_coeffs();
        }
        let n = self.fft_size as f64;
        for (bin, value) in self.grid.iter_mut().enumerate() {
            let freq = bin as f64 * self.sample_rate / n;
            let mut mag = 1.0;
            for band in self.bands.iter().filter(|b| b.enabled()) {
                mag *= band.magnitude_at(freq);
            }
            *value = mag;
        }
        self.linear.design(&self.grid);
        self.linear_dirty = false;
    }

    /// Process a stereo block in place. `left.len()` must equal the block
    /// length the stack was built with.
    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        if self.bypass {
            return;
        }
        let len = left.len().min(self.block_len);

        // Capture the dry path, delayed in linear mode to stay aligned
        match self.mode {
            EqMode::ZeroLatency => {
                self.dry_l[..len].copy_from_slice(&left[..len]);
                self.dry_r[..len].copy_from_slice(&right[..len]);
            }
            EqMode::LinearPhase => {
                for i in 0..len {
                    self.dry_l[i] = self.dry_ring_l.process(left[i]);
                    self.dry_r[i] = self.dry_ring_r.process(right[i]);
                }
            }
        }

        // Filter stage
        match self.mode {
            EqMode::ZeroLatency => {
                for band in self.bands.iter_mut() {
                    band.update_coeffs();
                }
                for i in 0..len {
                    let mut l = left[i];
                    let mut r = right[i];
                    for band in self.bands.iter_mut() {
                        (l, r) = band.process_sample(l, r);
                    }
                    left[i] = l;
                    right[i] = r;
                }
            }
            EqMode::LinearPhase => {
                if self.linear_dirty {
                    self.rebuild_linear();
                }
                self.linear.process_block(left, right);
            }
        }

        // Character stage
        self.character.process_block(left, right);

        // Global dry/wet at equal energy
        if self.dry_wet < 1.0 {
            let wet_gain = self.dry_wet.sqrt();
            let dry_gain = (1.0 - self.dry_wet).sqrt();
            for i in 0..len {
                left[i] = self.dry_l[i] * dry_gain + left[i] * wet_gain;
                right[i] = self.dry_r[i] * dry_gain + right[i] * wet_gain;
            }
        }
    }

    pub fn snapshot(&self, enabled: bool) -> EqSnapshot {
        let mut bands: Vec<EqBandConfig> = self.bands.iter().map(|b| b.config).collect();
        bands.sort_by_key(|b| b.id);
        EqSnapshot {
            enabled,
            mode: self.mode,
            fft_size: self.fft_size,
            character_amount: self.character.mix(),
            dry_wet: self.dry_wet,
            bands,
        }
    }

    pub fn from_snapshot(snapshot: &EqSnapshot, sample_rate: f64, block_len: usize) -> Self {
        let fft_size = if crate::linear_phase::valid_fft_size(snapshot.fft_size) {
            snapshot.fft_size
        } else {
            4096
        };
        let mut stack = Self::new(sample_rate, block_len, fft_size);
        stack.set_mode(snapshot.mode);
        stack.set_dry_wet(snapshot.dry_wet);
        stack.character.set_mix(snapshot.character_amount);
        for band in &snapshot.bands {
            let _ = stack.add_band(*band);
        }
        stack
    }
}

impl Processor for EqStack {
    fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
        self.linear.reset();
        self.character.reset();
        self.dry_ring_l.reset();
        self.dry_ring_r.reset();
    }

    fn latency(&self) -> usize {
        EqStack::latency(self)
    }
}

impl ProcessorConfig for EqStack {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for band in &mut self.bands {
            band.set_sample_rate(sample_rate);
        }
        self.linear_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> EqStack {
        EqStack::new(48000.0, 256, 1024)
    }

    fn band_config(kind: EqBandKind, freq: f64, gain: f64, q: f64) -> EqBandConfig {
        EqBandConfig {
            kind,
            frequency: freq,
            gain_db: gain,
            q,
            ..EqBandConfig::default()
        }
    }

    fn noise(len: usize) -> Vec<f64> {
        let mut state = 0x2545f491u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state as f64 / u64::MAX as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_bypass_is_bit_exact() {
        let mut eq = stack();
        eq.add_band(band_config(EqBandKind::Peaking, 1000.0, 12.0, 1.0))
            .unwrap();
        eq.set_bypass(true);
        let mut l = noise(256);
        let mut r = noise(256);
        let dry_l = l.clone();
        let dry_r = r.clone();
        eq.process_block(&mut l, &mut r);
        // ULP = 0: exact equality
        assert_eq!(l, dry_l);
        assert_eq!(r, dry_r);
    }

    #[test]
    fn test_capacity_limit() {
        let mut eq = stack();
        for _ in 0..MAX_EQ_BANDS {
            eq.add_band(EqBandConfig::default()).unwrap();
        }
        assert!(matches!(
            eq.add_band(EqBandConfig::default()),
            Err(EngineError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_enable_disable_idempotent() {
        // Property: enable then disable equals never enabling, below -120 dBFS
        let mut eq = stack();
        let idx = eq
            .add_band(band_config(EqBandKind::Peaking, 2000.0, 9.0, 2.0))
            .unwrap();
        eq.set_band_enabled(idx, false);

        let input = noise(256);
        // Burn through the disable ramp
        for _ in 0..8 {
            let mut l = input.clone();
            let mut r = input.clone();
            eq.process_block(&mut l, &mut r);
        }
        let mut l = input.clone();
        let mut r = input.clone();
        eq.process_block(&mut l, &mut r);
        for (a, b) in l.iter().zip(input.iter()) {
            let err = (a - b).abs();
            assert!(err < 1e-6, "residual {err}"); // -120 dBFS = 1e-6
        }
        let _ = r;
    }

    #[test]
    fn test_band_boost_raises_level() {
        let mut eq = stack();
        eq.add_band(band_config(EqBandKind::Peaking, 1000.0, 12.0, 1.0))
            .unwrap();
        let sine: Vec<f64> = (0..256 * 40)
            .map(|i| (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / 48000.0).sin() * 0.25)
            .collect();
        let mut peak = 0.0f64;
        for chunk in sine.chunks(256) {
            let mut l = chunk.to_vec();
            let mut r = chunk.to_vec();
            eq.process_block(&mut l, &mut r);
            peak = l.iter().fold(peak, |m, &s| m.max(s.abs()));
        }
        // +12 dB at center: 0.25 -> ~1.0
        assert!(peak > 0.8, "peak {peak}");
    }

    #[test]
    fn test_q_bandwidth_exclusive() {
        let mut eq = stack();
        let idx = eq.add_band(EqBandConfig::default()).unwrap();
        let band = eq.band_mut(idx).unwrap();
        band.set_bandwidth(500.0).unwrap();
        assert!(band.config().bandwidth_hz.is_some());
        assert!((band.config().q - 2.0).abs() < 1e-9);
        band.set_q(3.0).unwrap();
        assert!(band.config().bandwidth_hz.is_none());
        assert_eq!(band.config().q, 3.0);
    }

    #[test]
    fn test_linear_phase_latency_reported() {
        let mut eq = stack();
        assert_eq!(eq.latency(), 0);
        eq.set_mode(EqMode::LinearPhase);
        assert_eq!(eq.latency(), 512);
    }

    #[test]
    fn test_linear_phase_dirac_peaks_at_half_fft() {
        // Scenario: one peaking band, linear-phase mode, Dirac input.
        let mut eq = stack();
        eq.add_band(band_config(EqBandKind::Peaking, 1000.0, 6.0, 1.0))
            .unwrap();
        eq.set_mode(EqMode::LinearPhase);

        let block = 256;
        let total = 1024 + 2 * block;
        let mut peak_idx = 0;
        let mut peak_val = 0.0f64;
        let mut n = 0;
        while n < total {
            let mut l = vec![0.0; block];
            let mut r = vec![0.0; block];
            if n == 0 {
                l[0] = 1.0;
                r[0] = 1.0;
            }
            eq.process_block(&mut l, &mut r);
            for (i, &s) in l.iter().enumerate() {
                if s.abs() > peak_val {
                    peak_val = s.abs();
                    peak_idx = n + i;
                }
            }
            n += block;
        }
        assert_eq!(peak_idx, 512);
    }

    #[test]
    fn test_reorder_bands() {
        let mut eq = stack();
        let a = eq
            .add_band(band_config(EqBandKind::Peaking, 100.0, 3.0, 1.0))
            .unwrap();
        let _b = eq
            .add_band(band_config(EqBandKind::Peaking, 5000.0, -3.0, 1.0))
            .unwrap();
        let first_id = eq.band(a).unwrap().id();
        eq.reorder_band(0, 1).unwrap();
        assert_eq!(eq.band(1).unwrap().id(), first_id);
        assert!(eq.reorder_band(0, 5).is_err());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut eq = stack();
        eq.add_band(band_config(EqBandKind::LowShelf, 120.0, 4.0, 0.7))
            .unwrap();
        eq.add_band(band_config(EqBandKind::HighShelf, 8000.0, -2.0, 0.7))
            .unwrap();
        eq.set_dry_wet(0.8);
        let snap = eq.snapshot(true);
        assert_eq!(snap.bands.len(), 2);
        let rebuilt = EqStack::from_snapshot(&snap, 48000.0, 256);
        assert_eq!(rebuilt.band_count(), 2);
        assert_eq!(rebuilt.snapshot(true), snap);
    }
}
