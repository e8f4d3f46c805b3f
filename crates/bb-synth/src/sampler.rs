//! Sample playback
//!
//! Plays an immutable PCM buffer at a rate given as a ratio or in cents,
//! with optional start/end trim and gain. Fractional positions use linear
//! interpolation; when the rate is within 2^-16 of unity the fast path
//! indexes directly. Stopping fades over 2 ms to avoid clicks.

use std::sync::Arc;

use bb_core::Sample;

/// Rates closer to 1.0 than this skip interpolation
const UNITY_EPSILON: f64 = 1.0 / 65536.0;

/// Stop fade length in seconds
const STOP_FADE_SECS: f64 = 0.002;

/// Immutable stereo PCM, shared by reference between control and audio
/// threads. Mono sources are stored with both channels equal.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub left: Vec<Sample>,
    pub right: Vec<Sample>,
    pub sample_rate: f64,
}

impl SampleBuffer {
    pub fn stereo(left: Vec<Sample>, right: Vec<Sample>, sample_rate: f64) -> Self {
        debug_assert_eq!(left.len(), right.len());
        Self {
            left,
            right,
            sample_rate,
        }
    }

    pub fn mono(data: Vec<Sample>, sample_rate: f64) -> Self {
        Self {
            right: data.clone(),
            left: data,
            sample_rate,
        }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.left.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Forward,
}

/// One polyphonic sample playback head
#[derive(Debug, Clone)]
pub struct SamplePlayer {
    buffer: Option<Arc<SampleBuffer>>,
    position: f64,
    rate: f64,
    gain: f64,
    start: usize,
    end: usize,
    loop_mode: LoopMode,
    active: bool,
    /// 1.0 while running; ramps to 0 during a stop fade
    fade: f64,
    fade_step: f64,
    stopping: bool,
    sample_rate: f64,
}

impl SamplePlayer {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            buffer: None,
            position: 0.0,
            rate: 1.0,
            gain: 1.0,
            start: 0,
            end: 0,
            loop_mode: LoopMode::Off,
            active: false,
            fade: 1.0,
            fade_step: 1.0 / (STOP_FADE_SECS * sample_rate),
            stopping: false,
            sample_rate,
        }
    }

    pub fn set_buffer(&mut self, buffer: Arc<SampleBuffer>) {
        self.start = 0;
        self.end = buffer.frames();
        self.buffer = Some(buffer);
    }

    pub fn clear_buffer(&mut self) -> Option<Arc<SampleBuffer>> {
        self.active = false;
        self.buffer.take()
    }

    /// Trim to `[start, end)` frames of the source
    pub fn set_trim(&mut self, start: usize, end: usize) {
        if let Some(buffer) = &self.buffer {
            let frames = buffer.frames();
            self.start = start.min(frames);
            self.end = end.clamp(self.start, frames);
        }
    }

    /// Playback rate as a ratio (1.0 = original pitch)
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            1.0
        };
    }

    /// Playback rate in cents relative to the original pitch
    pub fn set_rate_cents(&mut self, cents: f64) {
        self.set_rate(2.0_f64.powf(cents / 1200.0));
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain.max(0.0);
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start playback from the trim start
    pub fn trigger(&mut self, velocity: f64) {
        if self.buffer.is_none() || self.end <= self.start {
            return;
        }
        self.position = self.start as f64;
        self.gain = velocity.clamp(0.0, 1.0);
        self.active = true;
        self.stopping = false;
        self.fade = 1.0;
    }

    /// Begin the 2 ms stop fade
    pub fn stop(&mut self) {
        if self.active {
            self.stopping = true;
        }
    }

    /// Cut immediately (no fade)
    pub fn kill(&mut self) {
        self.active = false;
        self.stopping = false;
        self.fade = 1.0;
    }

    /// Additively render into `[from, to)` of a stereo block
    pub fn render(&mut self, left: &mut [Sample], right: &mut [Sample], from: usize, to: usize) {
        if !self.active {
            return;
        }
        let Some(buffer) = self.buffer.clone() else {
            self.active = false;
            return;
        };
        let end = self.end.min(buffer.frames());
        if end <= self.start {
            self.active = false;
            return;
        }

        let fast_path = (self.rate - 1.0).abs() < UNITY_EPSILON;
        for i in from..to {
            if self.position >= end as f64 {
                match self.loop_mode {
                    LoopMode::Forward => {
                        self.position = self.start as f64 + (self.position - end as f64);
                    }
                    LoopMode::Off => {
                        self.active = false;
                        break;
                    }
                }
            }

            let (sample_l, sample_r) = if fast_path {
                let idx = self.position as usize;
                (buffer.left[idx], buffer.right[idx])
            } else {
                let idx = self.position as usize;
                let frac = self.position - idx as f64;
                let next = (idx + 1).min(end - 1);
                (
                    buffer.left[idx] + (buffer.left[next] - buffer.left[idx]) * frac,
                    buffer.right[idx] + (buffer.right[next] - buffer.right[idx]) * frac,
                )
            };

            if self.stopping {
                self.fade -= self.fade_step;
                if self.fade <= 0.0 {
                    self.active = false;
                    self.stopping = false;
                    self.fade = 1.0;
                    break;
                }
            }

            let gain = self.gain * self.fade;
            left[i] += sample_l * gain;
            right[i] += sample_r * gain;
            self.position += if fast_path { 1.0 } else { self.rate };
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.fade_step = 1.0 / (STOP_FADE_SECS * sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(frames: usize) -> Arc<SampleBuffer> {
        let data: Vec<f64> = (0..frames).map(|i| i as f64 / frames as f64).collect();
        Arc::new(SampleBuffer::mono(data, 48000.0))
    }

    fn render(player: &mut SamplePlayer, len: usize) -> Vec<f64> {
        let mut l = vec![0.0; len];
        let mut r = vec![0.0; len];
        player.render(&mut l, &mut r, 0, len);
        l
    }

    #[test]
    fn test_unity_rate_is_exact() {
        let mut player = SamplePlayer::new(48000.0);
        player.set_buffer(ramp_buffer(256));
        player.trigger(1.0);
        let out = render(&mut player, 260);
        for (i, &s) in out.iter().take(256).enumerate() {
            assert_eq!(s, i as f64 / 256.0);
        }
        assert_eq!(out[256], 0.0);
        assert!(!player.is_active());
    }

    #[test]
    fn test_half_rate_interpolates() {
        let mut player = SamplePlayer::new(48000.0);
        player.set_buffer(ramp_buffer(256));
        player.set_rate(0.5);
        player.trigger(1.0);
        let out = render(&mut player, 64);
        // A linear ramp interpolates exactly at any fractional position
        for (i, &s) in out.iter().enumerate() {
            let expected = (i as f64 * 0.5) / 256.0;
            assert!((s - expected).abs() < 1e-12, "i {i}");
        }
    }

    #[test]
    fn test_rate_cents_octave() {
        let mut player = SamplePlayer::new(48000.0);
        player.set_rate_cents(1200.0);
        assert!((player.rate() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_trim_limits_playback() {
        let mut player = SamplePlayer::new(48000.0);
        player.set_buffer(ramp_buffer(256));
        player.set_trim(100, 150);
        player.trigger(1.0);
        let out = render(&mut player, 100);
        assert_eq!(out[0], 100.0 / 256.0);
        // Only 50 frames play
        assert!(out[49] != 0.0);
        assert_eq!(out[50], 0.0);
    }

    #[test]
    fn test_forward_loop_wraps() {
        let mut player = SamplePlayer::new(48000.0);
        player.set_buffer(ramp_buffer(64));
        player.set_loop_mode(LoopMode::Forward);
        player.trigger(1.0);
        let out = render(&mut player, 200);
        assert!(player.is_active());
        // After the wrap the ramp restarts
        assert_eq!(out[64], 0.0);
        assert_eq!(out[65], 1.0 / 64.0);
    }

    #[test]
    fn test_stop_fades_out() {
        let mut player = SamplePlayer::new(48000.0);
        let data = vec![1.0; 4800];
        player.set_buffer(Arc::new(SampleBuffer::mono(data, 48000.0)));
        player.trigger(1.0);
        render(&mut player, 64);
        player.stop();
        let out = render(&mut player, 200);
        // Fade is 2 ms = 96 samples at 48 kHz
        assert!(out[0] < 1.0);
        assert!(out[0] > 0.8);
        assert_eq!(out[120], 0.0);
        assert!(!player.is_active());
    }

    #[test]
    fn test_trigger_without_buffer_is_noop() {
        let mut player = SamplePlayer::new(48000.0);
        player.trigger(1.0);
        assert!(!player.is_active());
    }
}
