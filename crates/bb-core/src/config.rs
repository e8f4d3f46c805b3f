//! Session configuration

use serde::{Deserialize, Serialize};

use crate::{EngineError, EngineResult, SampleRate};

/// Per-session configuration, fixed at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fixed rate for this session
    pub sample_rate: SampleRate,
    /// Processing block length, power of two in 64..=2048
    pub block_len: usize,
    /// Max concurrent voices across the session
    pub voice_pool_size: usize,
    /// Grid subdivision: 2/3/4/6/8 steps per beat
    pub steps_per_beat: u32,
    /// Beats per bar
    pub beats_per_bar: u32,
    /// Default FFT grid size for linear-phase EQs; per-EQ override allowed
    pub default_eq_fft_size: usize,
    /// Arrangement length in bars
    pub arrangement_length_bars: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            block_len: 512,
            voice_pool_size: 32,
            steps_per_beat: 4,
            beats_per_bar: 4,
            default_eq_fft_size: 4096,
            arrangement_length_bars: 8,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.block_len.is_power_of_two() || !(64..=2048).contains(&self.block_len) {
            return Err(EngineError::InvalidParameter {
                name: "block_len",
                value: self.block_len as f64,
            });
        }
        if self.voice_pool_size == 0 {
            return Err(EngineError::InvalidParameter {
                name: "voice_pool_size",
                value: 0.0,
            });
        }
        if ![2, 3, 4, 6, 8].contains(&self.steps_per_beat) {
            return Err(EngineError::InvalidParameter {
                name: "steps_per_beat",
                value: self.steps_per_beat as f64,
            });
        }
        if self.beats_per_bar == 0 {
            return Err(EngineError::InvalidParameter {
                name: "beats_per_bar",
                value: 0.0,
            });
        }
        if !self.default_eq_fft_size.is_power_of_two()
            || !(256..=8192).contains(&self.default_eq_fft_size)
        {
            return Err(EngineError::InvalidParameter {
                name: "default_eq_fft_size",
                value: self.default_eq_fft_size as f64,
            });
        }
        if self.arrangement_length_bars == 0 {
            return Err(EngineError::InvalidParameter {
                name: "arrangement_length_bars",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Arrangement length in beats
    #[inline]
    pub fn arrangement_length_beats(&self) -> f64 {
        (self.arrangement_length_bars * self.beats_per_bar) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_block_len() {
        let mut cfg = SessionConfig::default();
        cfg.block_len = 500;
        assert!(cfg.validate().is_err());
        cfg.block_len = 4096;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_steps_per_beat() {
        let mut cfg = SessionConfig::default();
        cfg.steps_per_beat = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_arrangement_beats() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.arrangement_length_beats(), 32.0);
    }
}
