//! Voice pool with stealing
//!
//! Fixed capacity, owned by the audio thread. On note-on with no idle
//! voice, the pool steals the voice with the lowest current amp-envelope
//! output, breaking ties by oldest start time. Note-offs release the most
//! recent active voice of the matching (track, note) pair.

use bb_core::{Sample, TrackId};

use crate::voice::{Voice, VoiceParams, VoiceState};

/// Activity counters published to the control plane each block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoicePoolStats {
    pub active: usize,
    pub capacity: usize,
    pub steals: u64,
}

pub struct VoicePool {
    voices: Vec<Voice>,
    next_id: u64,
    clock: u64,
    steals: u64,
    beats_per_sample: f64,
}

impl VoicePool {
    pub fn new(capacity: usize, sample_rate: f64) -> Self {
        Self {
            voices: (0..capacity.max(1)).map(|_| Voice::new(sample_rate)).collect(),
            next_id: 1,
            clock: 0,
            steals: 0,
            beats_per_sample: 0.0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    pub fn stats(&self) -> VoicePoolStats {
        VoicePoolStats {
            active: self.active_count(),
            capacity: self.capacity(),
            steals: self.steals,
        }
    }

    /// Tempo feed for tempo-synced LFOs; set once per block.
    pub fn set_tempo(&mut self, bpm: f64, sample_rate: f64) {
        self.beats_per_sample = bpm / (60.0 * sample_rate);
    }

    /// Advance the pool's age clock; call once per block.
    pub fn advance_clock(&mut self, samples: u64) {
        self.clock = self.clock.wrapping_add(samples);
    }

    /// Start a note. Returns the new voice id.
    pub fn note_on(
        &mut self,
        track: TrackId,
        note: u8,
        velocity: f64,
        params: &VoiceParams,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let slot = match self.voices.iter().position(|v| v.is_idle()) {
            Some(idx) => idx,
            None => {
                self.steals += 1;
                self.steal_slot()
            }
        };
        let stolen = !self.voices[slot].is_idle();
        self.voices[slot].trigger(id, track, note, velocity, params, self.clock, stolen);
        id
    }

    /// Steal target: lowest current amp-envelope output, ties broken by
    /// oldest start time.
    fn steal_slot(&self) -> usize {
        let mut best = 0;
        let mut best_level = f64::INFINITY;
        let mut best_age = u64::MAX;
        for (i, voice) in self.voices.iter().enumerate() {
            let level = voice.amp_level();
            if level < best_level || (level == best_level && voice.started_at() < best_age) {
                best = i;
                best_level = level;
                best_age = voice.started_at();
            }
        }
        best
    }

    /// Release the most recent active voice playing (track, note).
    pub fn note_off(&mut self, track: TrackId, note: u8) {
        let target = self
            .voices
            .iter_mut()
            .filter(|v| {
                v.state() == VoiceState::Active && v.track() == track && v.note() == note
            })
            .max_by_key(|v| v.started_at());
        if let Some(voice) = target {
            voice.release();
        }
    }

    /// Release every active voice (transport stop)
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    /// Hard-silence everything (seek)
    pub fn kill_all(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
    }

    /// Additively render all of one track's voices into `[from, to)` of the
    /// track's stereo block. With no voices this is a no-op.
    pub fn render_track(
        &mut self,
        track: TrackId,
        left: &mut [Sample],
        right: &mut [Sample],
        from: usize,
        to: usize,
    ) {
        for voice in &mut self.voices {
            if !voice.is_idle() && voice.track() == track {
                voice.render(left, right, from, to, self.beats_per_sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_core::{AdsrParams, TrackParams};

    fn params() -> VoiceParams {
        let mut p = VoiceParams::from(&TrackParams::default());
        p.amp_env = AdsrParams {
            attack: 0.01,
            decay: 0.05,
            sustain: 0.8,
            release: 0.05,
        };
        p
    }

    fn run_block(pool: &mut VoicePool, track: TrackId, len: usize) {
        let mut l = vec![0.0; len];
        let mut r = vec![0.0; len];
        pool.render_track(track, &mut l, &mut r, 0, len);
        pool.advance_clock(len as u64);
    }

    #[test]
    fn test_pool_never_exceeds_capacity() {
        let mut pool = VoicePool::new(4, 48000.0);
        let p = params();
        for note in 0..16 {
            pool.note_on(1, 60 + note, 1.0, &p);
            run_block(&mut pool, 1, 64);
            assert!(pool.active_count() <= 4);
        }
    }

    #[test]
    fn test_steals_quietest_voice() {
        // Scenario: pool of 4, five note-ons with a 10 ms attack. After a
        // few ms the fifth note steals the quietest voice, which is the
        // youngest one (still lowest on its attack ramp).
        let mut pool = VoicePool::new(4, 48000.0);
        let p = params();
        // Stagger starts so envelope levels differ
        pool.note_on(1, 60, 1.0, &p);
        run_block(&mut pool, 1, 240); // 5 ms
        pool.note_on(1, 61, 1.0, &p);
        run_block(&mut pool, 1, 120);
        pool.note_on(1, 62, 1.0, &p);
        run_block(&mut pool, 1, 120);
        pool.note_on(1, 63, 1.0, &p);
        run_block(&mut pool, 1, 60);

        // Levels before the steal, sorted: note 63 is quietest
        let levels: Vec<(u8, f64)> = pool
            .voices
            .iter()
            .map(|v| (v.note(), v.amp_level()))
            .collect();
        let quietest = levels
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap()
            .0;
        assert_eq!(quietest, 63);

        pool.note_on(1, 64, 1.0, &p);
        // The stolen slot now carries note 64 and note 63 is gone
        let notes: Vec<u8> = pool.voices.iter().map(|v| v.note()).collect();
        assert!(notes.contains(&64));
        assert!(!notes.contains(&63));
        assert_eq!(pool.stats().steals, 1);
    }

    #[test]
    fn test_steal_tiebreak_oldest() {
        let mut pool = VoicePool::new(2, 48000.0);
        let mut p = params();
        // Zero attack: both voices sit at identical sustain level
        p.amp_env.attack = 0.0;
        p.amp_env.decay = 0.0;
        pool.note_on(1, 60, 1.0, &p);
        run_block(&mut pool, 1, 64);
        pool.note_on(1, 61, 1.0, &p);
        run_block(&mut pool, 1, 64);
        pool.note_on(1, 62, 1.0, &p);
        let notes: Vec<u8> = pool.voices.iter().map(|v| v.note()).collect();
        // Note 60 (oldest) was stolen
        assert!(!notes.contains(&60));
        assert!(notes.contains(&61));
        assert!(notes.contains(&62));
    }

    #[test]
    fn test_note_off_targets_most_recent() {
        let mut pool = VoicePool::new(4, 48000.0);
        let p = params();
        pool.note_on(1, 60, 1.0, &p);
        run_block(&mut pool, 1, 64);
        pool.note_on(1, 60, 1.0, &p);
        run_block(&mut pool, 1, 64);
        pool.note_off(1, 60);
        let releasing: Vec<u64> = pool
            .voices
            .iter()
            .filter(|v| v.state() == VoiceState::Releasing)
            .map(|v| v.started_at())
            .collect();
        assert_eq!(releasing.len(), 1);
        // The released one is the most recent
        let max_start = pool
            .voices
            .iter()
            .filter(|v| !v.is_idle())
            .map(|v| v.started_at())
            .max()
            .unwrap();
        assert_eq!(releasing[0], max_start);
    }

    #[test]
    fn test_note_off_ignores_other_tracks() {
        let mut pool = VoicePool::new(4, 48000.0);
        let p = params();
        pool.note_on(1, 60, 1.0, &p);
        pool.note_off(2, 60);
        assert_eq!(
            pool.voices
                .iter()
                .filter(|v| v.state() == VoiceState::Releasing)
                .count(),
            0
        );
    }

    #[test]
    fn test_render_with_no_voices_is_noop() {
        let mut pool = VoicePool::new(4, 48000.0);
        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        pool.render_track(1, &mut l, &mut r, 0, 64);
        assert!(l.iter().all(|&s| s == 0.0));
    }
}
