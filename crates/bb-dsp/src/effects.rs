//! Insert effects: feedback delay and algorithmic reverb
//!
//! The reverb is a Schroeder topology (parallel damped combs into series
//! allpasses) with a set of early-reflection taps generated from a seeded
//! RNG, so offline renders with the same seed are byte-identical.

use bb_core::Sample;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{Processor, ProcessorConfig};

/// Maximum delay time the buffer is sized for
const MAX_DELAY_SECS: f64 = 2.0;

/// Stereo feedback delay with dry/wet mix
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    buffer_l: Vec<f64>,
    buffer_r: Vec<f64>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f64,
    mix: f64,
    time_ms: f64,
    sample_rate: f64,
}

impl FeedbackDelay {
    pub fn new(sample_rate: f64) -> Self {
        let capacity = (MAX_DELAY_SECS * sample_rate) as usize;
        let mut delay = Self {
            buffer_l: vec![0.0; capacity],
            buffer_r: vec![0.0; capacity],
            write_pos: 0,
            delay_samples: 1,
            feedback: 0.35,
            mix: 0.3,
            time_ms: 350.0,
            sample_rate,
        };
        delay.set_time_ms(350.0);
        delay
    }

    pub fn set_time_ms(&mut self, ms: f64) {
        self.time_ms = ms.clamp(1.0, MAX_DELAY_SECS * 1000.0);
        self.delay_samples = ((self.time_ms * 0.001 * self.sample_rate) as usize)
            .clamp(1, self.buffer_l.len() - 1);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn feedback(&self) -> f64 {
        self.feedback
    }

    pub fn mix(&self) -> f64 {
        self.mix
    }

    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let len = self.buffer_l.len();
        for i in 0..left.len() {
            let read_pos = (self.write_pos + len - self.delay_samples) % len;
            let delayed_l = self.buffer_l[read_pos];
            let delayed_r = self.buffer_r[read_pos];
            self.buffer_l[self.write_pos] = left[i] + delayed_l * self.feedback;
            self.buffer_r[self.write_pos] = right[i] + delayed_r * self.feedback;
            self.write_pos = (self.write_pos + 1) % len;
            left[i] = left[i] * (1.0 - self.mix) + delayed_l * self.mix;
            right[i] = right[i] * (1.0 - self.mix) + delayed_r * self.mix;
        }
    }
}

impl Processor for FeedbackDelay {
    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

impl ProcessorConfig for FeedbackDelay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let capacity = (MAX_DELAY_SECS * sample_rate) as usize;
        self.buffer_l = vec![0.0; capacity];
        self.buffer_r = vec![0.0; capacity];
        self.write_pos = 0;
        self.set_time_ms(self.time_ms);
    }
}

/// Damped feedback comb filter
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f64>,
    pos: usize,
    feedback: f64,
    damp: f64,
    filter_state: f64,
}

impl Comb {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            feedback: 0.84,
            damp: 0.2,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let out = self.buffer[self.pos];
        self.filter_state = out * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

/// Schroeder allpass diffuser
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f64>,
    pos: usize,
    gain: f64,
}

impl Allpass {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            gain: 0.5,
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let delayed = self.buffer[self.pos];
        let out = -input + delayed;
        self.buffer[self.pos] = input + delayed * self.gain;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// Early-reflection tap
#[derive(Debug, Clone, Copy)]
struct Tap {
    delay: usize,
    gain: f64,
}

/// Comb delays in samples at 44.1 kHz; scaled to the session rate.
/// Right channel gets a small spread offset for width.
const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const STEREO_SPREAD: usize = 23;
const NUM_EARLY_TAPS: usize = 8;

/// Algorithmic reverb with deterministic seeded early reflections
#[derive(Debug, Clone)]
pub struct Reverb {
    combs_l: Vec<Comb>,
    combs_r: Vec<Comb>,
    allpasses_l: Vec<Allpass>,
    allpasses_r: Vec<Allpass>,
    early_l: Vec<Tap>,
    early_r: Vec<Tap>,
    early_buffer_l: Vec<f64>,
    early_buffer_r: Vec<f64>,
    early_pos: usize,
    mix: f64,
    room_size: f64,
    damp: f64,
    seed: u64,
    sample_rate: f64,
}

impl Reverb {
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        let scale = sample_rate / 44100.0;
        let combs_l: Vec<Comb> = COMB_TUNING
            .iter()
            .map(|&d| Comb::new((d as f64 * scale) as usize))
            .collect();
        let combs_r: Vec<Comb> = COMB_TUNING
            .iter()
            .map(|&d| Comb::new(((d + STEREO_SPREAD) as f64 * scale) as usize))
            .collect();
        let allpasses_l: Vec<Allpass> = ALLPASS_TUNING
            .iter()
            .map(|&d| Allpass::new((d as f64 * scale) as usize))
            .collect();
        let allpasses_r: Vec<Allpass> = ALLPASS_TUNING
            .iter()
            .map(|&d| Allpass::new(((d + STEREO_SPREAD) as f64 * scale) as usize))
            .collect();

        let early_len = (0.09 * sample_rate) as usize + 1;
        let mut reverb = Self {
            combs_l,
            combs_r,
            allpasses_l,
            allpasses_r,
            early_l: Vec::with_capacity(NUM_EARLY_TAPS),
            early_r: Vec::with_capacity(NUM_EARLY_TAPS),
            early_buffer_l: vec![0.0; early_len],
            early_buffer_r: vec![0.0; early_len],
            early_pos: 0,
            mix: 0.25,
            room_size: 0.5,
            damp: 0.3,
            seed,
            sample_rate,
        };
        reverb.generate_early_taps();
        reverb.apply_tone();
        reverb
    }

    /// Regenerate the early-reflection taps from the seed. Identical seeds
    /// give identical tap sets, which keeps offline renders deterministic.
    fn generate_early_taps(&mut self) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let max_delay = self.early_buffer_l.len() - 1;
        self.early_l.clear();
        self.early_r.clear();
        for tap in 0..NUM_EARLY_TAPS {
            let decay = 0.7_f64.powi(tap as i32);
            let delay_l = rng.random_range(0.005..0.085);
            let delay_r = rng.random_range(0.005..0.085);
            self.early_l.push(Tap {
                delay: ((delay_l * self.sample_rate) as usize).min(max_delay),
                gain: decay * rng.random_range(0.4..0.9),
            });
            self.early_r.push(Tap {
                delay: ((delay_r * self.sample_rate) as usize).min(max_delay),
                gain: decay * rng.random_range(0.4..0.9),
            });
        }
    }

    fn apply_tone(&mut self) {
        let feedback = 0.7 + self.room_size * 0.28;
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.feedback = feedback;
            comb.damp = self.damp;
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.generate_early_taps();
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn mix(&self) -> f64 {
        self.mix
    }

    pub fn set_room_size(&mut self, size: f64) {
        self.room_size = size.clamp(0.0, 1.0);
        self.apply_tone();
    }

    pub fn room_size(&self) -> f64 {
        self.room_size
    }

    pub fn set_damp(&mut self, damp: f64) {
        self.damp = damp.clamp(0.0, 1.0);
        self.apply_tone();
    }

    pub fn damp(&self) -> f64 {
        self.damp
    }

    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let early_len = self.early_buffer_l.len();
        for i in 0..left.len() {
            let input_l = left[i];
            let input_r = right[i];
            let mono = (input_l + input_r) * 0.5;

            self.early_buffer_l[self.early_pos] = input_l;
            self.early_buffer_r[self.early_pos] = input_r;
            let mut early_l = 0.0;
            let mut early_r = 0.0;
            for tap in &self.early_l {
                let idx = (self.early_pos + early_len - tap.delay) % early_len;
                early_l += self.early_buffer_l[idx] * tap.gain;
            }
            for tap in &self.early_r {
                let idx = (self.early_pos + early_len - tap.delay) % early_len;
                early_r += self.early_buffer_r[idx] * tap.gain;
            }
            self.early_pos = (self.early_pos + 1) % early_len;

            let mut wet_l = 0.0;
            let mut wet_r = 0.0;
            for comb in &mut self.combs_l {
                wet_l += comb.process(mono);
            }
            for comb in &mut self.combs_r {
                wet_r += comb.process(mono);
            }
            for allpass in &mut self.allpasses_l {
                wet_l = allpass.process(wet_l);
            }
            for allpass in &mut self.allpasses_r {
                wet_r = allpass.process(wet_r);
            }

            let wet_l = wet_l * 0.25 + early_l * 0.3;
            let wet_r = wet_r * 0.25 + early_r * 0.3;
            left[i] = input_l * (1.0 - self.mix) + wet_l * self.mix;
            right[i] = input_r * (1.0 - self.mix) + wet_r * self.mix;
        }
    }
}

impl Processor for Reverb {
    fn reset(&mut self) {
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        for ap in self.allpasses_l.iter_mut().chain(self.allpasses_r.iter_mut()) {
            ap.reset();
        }
        self.early_buffer_l.fill(0.0);
        self.early_buffer_r.fill(0.0);
        self.early_pos = 0;
    }
}

impl ProcessorConfig for Reverb {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        *self = Reverb::new(sample_rate, self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize) -> (Vec<f64>, Vec<f64>) {
        let mut l = vec![0.0; len];
        let r = vec![0.0; len];
        l[0] = 1.0;
        (l, r)
    }

    #[test]
    fn test_delay_echoes_after_delay_time() {
        let mut delay = FeedbackDelay::new(48000.0);
        delay.set_time_ms(100.0);
        delay.set_mix(1.0);
        delay.set_feedback(0.0);
        let (mut l, mut r) = impulse(9600);
        l[0] = 1.0;
        delay.process_block(&mut l, &mut r);
        let expected = (0.1 * 48000.0) as usize;
        let peak_idx = l
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .unwrap()
            .0;
        assert_eq!(peak_idx, expected);
    }

    #[test]
    fn test_delay_feedback_decays() {
        let mut delay = FeedbackDelay::new(48000.0);
        delay.set_time_ms(10.0);
        delay.set_mix(1.0);
        delay.set_feedback(0.5);
        let (mut l, mut r) = impulse(48000);
        delay.process_block(&mut l, &mut r);
        let tail = &l[24000..];
        let tail_peak = tail.iter().fold(0.0f64, |m, &s| m.max(s.abs()));
        assert!(tail_peak < 0.01);
    }

    #[test]
    fn test_reverb_produces_tail() {
        let mut reverb = Reverb::new(48000.0, 7);
        reverb.set_mix(1.0);
        let (mut l, mut r) = impulse(48000);
        reverb.process_block(&mut l, &mut r);
        // Energy well after the direct sound
        let tail_energy: f64 = l[4800..9600].iter().map(|s| s * s).sum();
        assert!(tail_energy > 1e-6);
    }

    #[test]
    fn test_reverb_is_deterministic_for_a_seed() {
        let render = |seed: u64| {
            let mut reverb = Reverb::new(48000.0, seed);
            reverb.set_mix(1.0);
            let (mut l, mut r) = impulse(9600);
            reverb.process_block(&mut l, &mut r);
            (l, r)
        };
        let (a_l, a_r) = render(42);
        let (b_l, b_r) = render(42);
        assert_eq!(a_l, b_l);
        assert_eq!(a_r, b_r);
        let (c_l, _) = render(43);
        assert_ne!(a_l, c_l);
    }

    #[test]
    fn test_reverb_zero_mix_is_identity() {
        let mut reverb = Reverb::new(48000.0, 1);
        reverb.set_mix(0.0);
        let mut l = vec![0.25; 512];
        let mut r = vec![-0.25; 512];
        reverb.process_block(&mut l, &mut r);
        assert!(l.iter().all(|&s| (s - 0.25).abs() < 1e-12));
        assert!(r.iter().all(|&s| (s + 0.25).abs() < 1e-12));
    }
}
