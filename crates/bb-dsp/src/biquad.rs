//! Biquad filter sections using Transposed Direct Form II
//!
//! Coefficients follow the RBJ Audio EQ Cookbook. TDF-II keeps quantization
//! noise low and the z^-1/z^-2 state survives coefficient updates, so
//! parameter changes at block boundaries are click-free.

use std::f64::consts::PI;

use bb_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Biquad coefficients, normalized so a0 = 1
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

struct Raw {
    b0: f64,
    b1: f64,
    b2: f64,
    a0: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn normalize(r: Raw) -> Self {
        Self {
            b0: r.b0 / r.a0,
            b1: r.b1 / r.a0,
            b2: r.b2 / r.a0,
            a1: r.a1 / r.a0,
            a2: r.a2 / r.a0,
        }
    }

    fn omega(freq: f64, sample_rate: f64) -> (f64, f64, f64) {
        let omega = 2.0 * PI * freq / sample_rate;
        (omega, omega.sin(), omega.cos())
    }

    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        Self::normalize(Raw {
            b0: (1.0 - cos_w) / 2.0,
            b1: 1.0 - cos_w,
            b2: (1.0 - cos_w) / 2.0,
            a0: 1.0 + alpha,
            a1: -2.0 * cos_w,
            a2: 1.0 - alpha,
        })
    }

    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        Self::normalize(Raw {
            b0: (1.0 + cos_w) / 2.0,
            b1: -(1.0 + cos_w),
            b2: (1.0 + cos_w) / 2.0,
            a0: 1.0 + alpha,
            a1: -2.0 * cos_w,
            a2: 1.0 - alpha,
        })
    }

    /// Bandpass with constant 0 dB peak gain
    pub fn bandpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        Self::normalize(Raw {
            b0: alpha,
            b1: 0.0,
            b2: -alpha,
            a0: 1.0 + alpha,
            a1: -2.0 * cos_w,
            a2: 1.0 - alpha,
        })
    }

    pub fn notch(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        Self::normalize(Raw {
            b0: 1.0,
            b1: -2.0 * cos_w,
            b2: 1.0,
            a0: 1.0 + alpha,
            a1: -2.0 * cos_w,
            a2: 1.0 - alpha,
        })
    }

    pub fn allpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        Self::normalize(Raw {
            b0: 1.0 - alpha,
            b1: -2.0 * cos_w,
            b2: 1.0 + alpha,
            a0: 1.0 + alpha,
            a1: -2.0 * cos_w,
            a2: 1.0 - alpha,
        })
    }

    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        Self::normalize(Raw {
            b0: 1.0 + alpha * a,
            b1: -2.0 * cos_w,
            b2: 1.0 - alpha * a,
            a0: 1.0 + alpha / a,
            a1: -2.0 * cos_w,
            a2: 1.0 - alpha / a,
        })
    }

    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
        Self::normalize(Raw {
            b0: a * ((a + 1.0) - (a - 1.0) * cos_w + two_sqrt_a_alpha),
            b1: 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w),
            b2: a * ((a + 1.0) - (a - 1.0) * cos_w - two_sqrt_a_alpha),
            a0: (a + 1.0) + (a - 1.0) * cos_w + two_sqrt_a_alpha,
            a1: -2.0 * ((a - 1.0) + (a + 1.0) * cos_w),
            a2: (a + 1.0) + (a - 1.0) * cos_w - two_sqrt_a_alpha,
        })
    }

    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let (_, sin_w, cos_w) = Self::omega(freq, sample_rate);
        let alpha = sin_w / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
        Self::normalize(Raw {
            b0: a * ((a + 1.0) + (a - 1.0) * cos_w + two_sqrt_a_alpha),
            b1: -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w),
            b2: a * ((a + 1.0) + (a - 1.0) * cos_w - two_sqrt_a_alpha),
            a0: (a + 1.0) - (a - 1.0) * cos_w + two_sqrt_a_alpha,
            a1: 2.0 * ((a - 1.0) - (a + 1.0) * cos_w),
            a2: (a + 1.0) - (a - 1.0) * cos_w - two_sqrt_a_alpha,
        })
    }

    /// Unity gain, no filtering
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Q implied by a bandwidth in Hz around a center frequency
#[inline]
pub fn q_from_bandwidth(freq: f64, bandwidth_hz: f64) -> f64 {
    if bandwidth_hz <= 0.0 {
        return 100.0;
    }
    (freq / bandwidth_hz).clamp(0.01, 100.0)
}

/// Q implied by a shelf slope via the conventional normalized-slope relation:
/// S = slope / 12 dB/oct, Q = 1 / sqrt((A + 1/A)(1/S - 1) + 2).
pub fn q_from_shelf_slope(gain_db: f64, slope_db_per_oct: f64) -> f64 {
    let a = 10.0_f64.powf(gain_db.abs() / 40.0);
    let s = (slope_db_per_oct / 12.0).clamp(0.01, 4.0);
    let arg = ((a + 1.0 / a) * (1.0 / s - 1.0) + 2.0).max(1e-6);
    (1.0 / arg.sqrt()).clamp(0.01, 100.0)
}

/// Evaluate H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2) at
/// z = e^(j 2 pi f / fs). Returns (magnitude, phase).
pub fn frequency_response(coeffs: &BiquadCoeffs, freq: f64, sample_rate: f64) -> (f64, f64) {
    let omega = 2.0 * PI * freq / sample_rate;
    let cos_w = omega.cos();
    let sin_w = omega.sin();
    let cos_2w = (2.0 * omega).cos();
    let sin_2w = (2.0 * omega).sin();

    let num_real = coeffs.b0 + coeffs.b1 * cos_w + coeffs.b2 * cos_2w;
    let num_imag = -coeffs.b1 * sin_w - coeffs.b2 * sin_2w;
    let den_real = 1.0 + coeffs.a1 * cos_w + coeffs.a2 * cos_2w;
    let den_imag = -coeffs.a1 * sin_w - coeffs.a2 * sin_2w;

    let den_mag_sq = den_real * den_real + den_imag * den_imag;
    let h_real = (num_real * den_real + num_imag * den_imag) / den_mag_sq;
    let h_imag = (num_imag * den_real - num_real * den_imag) / den_mag_sq;

    let magnitude = (h_real * h_real + h_imag * h_imag).sqrt();
    let phase = h_imag.atan2(h_real);
    (magnitude, phase)
}

/// Transposed Direct Form II biquad section
#[derive(Debug, Clone)]
pub struct BiquadTdf2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTdf2 {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            coeffs: BiquadCoeffs::bypass(),
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    pub fn with_coeffs(coeffs: BiquadCoeffs, sample_rate: f64) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    /// Swap coefficients; internal state is preserved.
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl Processor for BiquadTdf2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTdf2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}

impl ProcessorConfig for BiquadTdf2 {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass_identity() {
        let mut filter = BiquadTdf2::new(48000.0);
        let out = filter.process_sample(0.5);
        assert!((out - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = BiquadTdf2::new(48000.0);
        filter.set_coeffs(BiquadCoeffs::lowpass(1000.0, 0.707, 48000.0));
        for _ in 0..1000 {
            filter.process_sample(1.0);
        }
        assert!((filter.process_sample(1.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = BiquadTdf2::new(48000.0);
        filter.set_coeffs(BiquadCoeffs::highpass(1000.0, 0.707, 48000.0));
        for _ in 0..1000 {
            filter.process_sample(1.0);
        }
        assert!(filter.process_sample(1.0).abs() < 0.01);
    }

    // Reference contract: magnitude at DC, Nyquist, and the band extremes
    // matches the closed-form expression within 0.05 dB.
    #[test]
    fn test_peaking_magnitude_contract() {
        let sr = 48000.0;
        let coeffs = BiquadCoeffs::peaking(1000.0, 2.0, 6.0, sr);
        let (mag_center, _) = frequency_response(&coeffs, 1000.0, sr);
        assert!((20.0 * mag_center.log10() - 6.0).abs() < 0.05);
        let (mag_dc, _) = frequency_response(&coeffs, 0.0, sr);
        assert!((20.0 * mag_dc.log10()).abs() < 0.05);
        let (mag_ny, _) = frequency_response(&coeffs, sr / 2.0, sr);
        assert!((20.0 * mag_ny.log10()).abs() < 0.05);
    }

    #[test]
    fn test_shelf_magnitude_contract() {
        let sr = 48000.0;
        let coeffs = BiquadCoeffs::low_shelf(200.0, 0.707, -9.0, sr);
        let (mag_dc, _) = frequency_response(&coeffs, 1.0, sr);
        assert!((20.0 * mag_dc.log10() + 9.0).abs() < 0.05);
        let (mag_hi, _) = frequency_response(&coeffs, sr / 2.0, sr);
        assert!((20.0 * mag_hi.log10()).abs() < 0.05);

        let coeffs = BiquadCoeffs::high_shelf(5000.0, 0.707, 4.5, sr);
        let (mag_ny, _) = frequency_response(&coeffs, sr / 2.0, sr);
        assert!((20.0 * mag_ny.log10() - 4.5).abs() < 0.05);
        let (mag_dc, _) = frequency_response(&coeffs, 1.0, sr);
        assert!((20.0 * mag_dc.log10()).abs() < 0.05);
    }

    #[test]
    fn test_allpass_is_unity_magnitude() {
        let sr = 48000.0;
        let coeffs = BiquadCoeffs::allpass(700.0, 1.0, sr);
        for freq in [50.0, 700.0, 5000.0, 20000.0] {
            let (mag, _) = frequency_response(&coeffs, freq, sr);
            assert!((20.0 * mag.log10()).abs() < 0.05, "freq {freq}");
        }
    }

    #[test]
    fn test_q_from_bandwidth() {
        use approx::assert_relative_eq;
        assert_relative_eq!(q_from_bandwidth(1000.0, 500.0), 2.0);
        assert_relative_eq!(q_from_bandwidth(440.0, 110.0), 4.0);
        assert_eq!(q_from_bandwidth(1000.0, 0.0), 100.0);
    }

    #[test]
    fn test_q_from_shelf_slope_monotone() {
        // Steeper slope must give higher Q
        let q_gentle = q_from_shelf_slope(6.0, 6.0);
        let q_steep = q_from_shelf_slope(6.0, 12.0);
        assert!(q_steep > q_gentle);
    }

    #[test]
    fn test_state_survives_coeff_update() {
        let mut filter = BiquadTdf2::new(48000.0);
        filter.set_coeffs(BiquadCoeffs::lowpass(500.0, 0.707, 48000.0));
        for i in 0..256 {
            filter.process_sample((i as f64 * 0.13).sin());
        }
        let z1 = filter.z1;
        filter.set_coeffs(BiquadCoeffs::lowpass(800.0, 0.9, 48000.0));
        assert_eq!(filter.z1, z1);
    }
}
