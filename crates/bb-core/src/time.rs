//! Musical time base
//!
//! Translates between samples, beats, bars:beats:steps, and wall-clock
//! seconds. Sample conversion uses banker's rounding so long-run drift stays
//! below half a sample. On a tempo change the transport position is preserved
//! in beats, never in samples.

use serde::{Deserialize, Serialize};

/// Minimum tempo
pub const MIN_TEMPO: f64 = 20.0;

/// Maximum tempo
pub const MAX_TEMPO: f64 = 300.0;

/// Snap interval for grid operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapInterval {
    Bar,
    Beat,
    #[default]
    Step,
    None,
}

/// Musical position (bars, beats, steps), 0-indexed internally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    pub step: u32,
}

impl MusicalPosition {
    /// Display format "bar.beat.step", 1-indexed
    pub fn to_display_string(self) -> String {
        format!("{}.{}.{}", self.bar + 1, self.beat + 1, self.step + 1)
    }
}

/// Session time base: sample rate, tempo, and grid subdivision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBase {
    sample_rate: f64,
    bpm: f64,
    steps_per_beat: u32,
    beats_per_bar: u32,
}

impl TimeBase {
    pub fn new(sample_rate: f64, bpm: f64, steps_per_beat: u32, beats_per_bar: u32) -> Self {
        Self {
            sample_rate,
            bpm: bpm.clamp(MIN_TEMPO, MAX_TEMPO),
            steps_per_beat: steps_per_beat.max(1),
            beats_per_bar: beats_per_bar.max(1),
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline]
    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    #[inline]
    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    /// Set the tempo, clamped to [20, 300]. Returns the applied value.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        self.bpm = if bpm.is_finite() {
            bpm.clamp(MIN_TEMPO, MAX_TEMPO)
        } else {
            self.bpm
        };
        self.bpm
    }

    /// Samples per beat at the current tempo (fractional)
    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        60.0 * self.sample_rate / self.bpm
    }

    /// Beats advanced by one sample
    #[inline]
    pub fn beats_per_sample(&self) -> f64 {
        self.bpm / (60.0 * self.sample_rate)
    }

    /// Convert beats to a sample index. Banker's rounding keeps accumulated
    /// drift below 0.5 samples over long timelines.
    #[inline]
    pub fn beats_to_samples(&self, beats: f64) -> u64 {
        (beats * self.samples_per_beat()).round_ties_even().max(0.0) as u64
    }

    /// Convert a sample index to beats.
    #[inline]
    pub fn samples_to_beats(&self, samples: u64) -> f64 {
        samples as f64 * self.beats_per_sample()
    }

    #[inline]
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate).round_ties_even().max(0.0) as u64
    }

    #[inline]
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Length of one step in beats
    #[inline]
    pub fn step_beats(&self) -> f64 {
        1.0 / self.steps_per_beat as f64
    }

    /// Snap interval length in beats; `None` snaps to nothing (returns 0)
    pub fn snap_beats(&self, snap: SnapInterval) -> f64 {
        match snap {
            SnapInterval::Bar => self.beats_per_bar as f64,
            SnapInterval::Beat => 1.0,
            SnapInterval::Step => self.step_beats(),
            SnapInterval::None => 0.0,
        }
    }

    /// Decompose a beat position into bars:beats:steps
    pub fn musical_position(&self, beats: f64) -> MusicalPosition {
        let beats = beats.max(0.0);
        let bar = (beats / self.beats_per_bar as f64) as u32;
        let beat_in_bar = beats - bar as f64 * self.beats_per_bar as f64;
        let beat = beat_in_bar as u32;
        let step = ((beat_in_bar - beat as f64) * self.steps_per_beat as f64) as u32;
        MusicalPosition { bar, beat, step }
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(48000.0, 120.0, 4, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats_to_samples_basic() {
        let tb = TimeBase::new(48000.0, 120.0, 4, 4);
        // One beat at 120 BPM = 0.5 s = 24000 samples
        assert_eq!(tb.beats_to_samples(1.0), 24000);
        assert_eq!(tb.beats_to_samples(0.5), 12000);
        assert_eq!(tb.beats_to_samples(0.0), 0);
    }

    #[test]
    fn test_round_trip_within_one_sample() {
        // beats_to_samples(samples_to_beats(n)) stays within 1 sample for
        // any n up to 1e8 and any tempo in range.
        for &bpm in &[20.0, 61.3, 120.0, 177.7, 300.0] {
            let tb = TimeBase::new(48000.0, bpm, 4, 4);
            for &n in &[0u64, 1, 511, 48000, 1_000_003, 100_000_000] {
                let beats = tb.samples_to_beats(n);
                let back = tb.beats_to_samples(beats);
                let diff = back.abs_diff(n);
                assert!(diff <= 1, "bpm {bpm} n {n} diff {diff}");
            }
        }
    }

    #[test]
    fn test_bpm_clamped() {
        let mut tb = TimeBase::default();
        assert_eq!(tb.set_bpm(500.0), MAX_TEMPO);
        assert_eq!(tb.set_bpm(1.0), MIN_TEMPO);
        assert_eq!(tb.set_bpm(f64::NAN), MIN_TEMPO);
    }

    #[test]
    fn test_musical_position() {
        let tb = TimeBase::new(48000.0, 120.0, 4, 4);
        let pos = tb.musical_position(5.75);
        assert_eq!(pos.bar, 1);
        assert_eq!(pos.beat, 1);
        assert_eq!(pos.step, 3);
        assert_eq!(pos.to_display_string(), "2.2.4");
    }

    #[test]
    fn test_snap_beats() {
        let tb = TimeBase::new(48000.0, 120.0, 4, 4);
        assert_eq!(tb.snap_beats(SnapInterval::Bar), 4.0);
        assert_eq!(tb.snap_beats(SnapInterval::Beat), 1.0);
        assert_eq!(tb.snap_beats(SnapInterval::Step), 0.25);
        assert_eq!(tb.snap_beats(SnapInterval::None), 0.0);
    }

    #[test]
    fn test_tempo_change_preserves_beats() {
        let mut tb = TimeBase::new(48000.0, 120.0, 4, 4);
        let pos_samples = tb.beats_to_samples(7.5);
        let beats = tb.samples_to_beats(pos_samples);
        tb.set_bpm(90.0);
        let recomputed = tb.beats_to_samples(beats);
        // Position in beats unchanged; samples recomputed at the new tempo
        assert_eq!(recomputed, tb.beats_to_samples(7.5));
        assert!((tb.samples_to_beats(recomputed) - 7.5).abs() < 1e-6);
    }
}
