//! Sample and level primitives

use serde::{Deserialize, Serialize};

/// Internal sample type. The engine processes in f64 and converts to f32 at
/// the host boundary.
pub type Sample = f64;

/// Supported session sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(hz: u32) -> Option<Self> {
        match hz {
            44100 => Some(Self::Hz44100),
            48000 => Some(Self::Hz48000),
            88200 => Some(Self::Hz88200),
            96000 => Some(Self::Hz96000),
            _ => None,
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Linear gain from decibels
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    Decibels(db).to_gain()
}

/// Decibels from linear gain
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    Decibels::from_gain(gain).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_trip() {
        for db in [-60.0, -12.0, -6.0, 0.0, 6.0] {
            let gain = db_to_gain(db);
            assert!((gain_to_db(gain) - db).abs() < 1e-9);
        }
    }

    #[test]
    fn test_silence_floor() {
        assert_eq!(Decibels(-150.0).to_gain(), 0.0);
        assert_eq!(Decibels::from_gain(0.0), Decibels::NEG_INF);
    }

    #[test]
    fn test_sample_rate_from_u32() {
        assert_eq!(SampleRate::from_u32(48000), Some(SampleRate::Hz48000));
        assert_eq!(SampleRate::from_u32(22050), None);
    }
}
