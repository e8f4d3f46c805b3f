//! Transport and event emission

use bb_core::{Arrangement, AutomationLane, Clip, ClipKind, EngineResult, LoopRegion, ParamTarget,
    Pattern, PatternId, TimeBase, TrackId};

/// Preallocated pattern-bank capacity; upserts beyond this allocate, which
/// only happens through control-plane edits, never in steady state.
const PATTERN_BANK_CAPACITY: usize = 256;

/// Events carry their sample offset within the current block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub offset: usize,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    NoteOff {
        track: TrackId,
        note: u8,
    },
    Automation {
        target: ParamTarget,
        value: f64,
    },
    NoteOn {
        track: TrackId,
        note: u8,
        velocity: f64,
    },
}

impl EventKind {
    /// Dispatch order on equal offsets: note-offs free voices before
    /// note-ons steal, and parameter changes land before new notes.
    fn rank(&self) -> u8 {
        match self {
            EventKind::NoteOff { .. } => 0,
            EventKind::Automation { .. } => 1,
            EventKind::NoteOn { .. } => 2,
        }
    }
}

/// Pattern storage owned by the audio thread
#[derive(Debug, Default)]
pub struct PatternBank {
    patterns: Vec<Pattern>,
}

impl PatternBank {
    pub fn new() -> Self {
        Self {
            patterns: Vec::with_capacity(PATTERN_BANK_CAPACITY),
        }
    }

    pub fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Replace an existing pattern with the same id, or add a new one.
    /// Returns the displaced pattern so its storage can be freed off the
    /// audio thread.
    pub fn upsert(&mut self, pattern: Pattern) -> Option<Pattern> {
        match self.patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(slot) => Some(std::mem::replace(slot, pattern)),
            None => {
                self.patterns.push(pattern);
                None
            }
        }
    }

    pub fn remove(&mut self, id: PatternId) -> Option<Pattern> {
        let idx = self.patterns.iter().position(|p| p.id == id)?;
        Some(self.patterns.swap_remove(idx))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// A note-off owed to a previous block's note-on, kept in beats so a tempo
/// change recomputes its sample position automatically.
#[derive(Debug, Clone, Copy)]
struct PendingOff {
    beat: f64,
    track: TrackId,
    note: u8,
}

pub struct Sequencer {
    time: TimeBase,
    state: TransportState,
    position_samples: u64,
    loop_region: Option<LoopRegion>,
    arrangement_length_beats: f64,
    pending_offs: Vec<PendingOff>,
}

impl Sequencer {
    pub fn new(time: TimeBase, arrangement_length_beats: f64) -> Self {
        Self {
            time,
            state: TransportState::Stopped,
            position_samples: 0,
            loop_region: None,
            arrangement_length_beats,
            pending_offs: Vec::with_capacity(128),
        }
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[inline]
    pub fn time(&self) -> &TimeBase {
        &self.time
    }

    #[inline]
    pub fn position_samples(&self) -> u64 {
        self.position_samples
    }

    #[inline]
    pub fn position_beats(&self) -> f64 {
        self.time.samples_to_beats(self.position_samples)
    }

    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    /// Start playback. A no-op while already playing.
    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    /// Stop playback; the position is retained. A no-op while stopped.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.pending_offs.clear();
    }

    /// Seek to a beat position; legal in both transport states.
    /// Out-of-range positions saturate to the arrangement bounds.
    pub fn seek(&mut self, beats: f64) {
        let clamped = beats.clamp(0.0, self.arrangement_length_beats);
        self.position_samples = self.time.beats_to_samples(clamped);
        self.pending_offs.clear();
    }

    /// Tempo change mid-play: the position is preserved in beats and the
    /// sample counter is recomputed at the new tempo.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let beats = self.position_beats();
        let applied = self.time.set_bpm(bpm);
        self.position_samples = self.time.beats_to_samples(beats);
        applied
    }

    pub fn set_loop(&mut self, start_beat: f64, end_beat: f64, enabled: bool) -> EngineResult<()> {
        self.loop_region = Some(LoopRegion::new(start_beat, end_beat, enabled)?);
        Ok(())
    }

    pub fn clear_loop(&mut self) {
        self.loop_region = None;
    }

    /// Emit all events for the next `block_len` samples into `out`, sorted
    /// by (offset, kind). Advances the transport, wrapping at the loop end
    /// by splitting the block so offsets never leave `[0, block_len)`.
    pub fn next_events(
        &mut self,
        block_len: usize,
        arrangement: &Arrangement,
        patterns: &PatternBank,
        lanes: &[AutomationLane],
        out: &mut Vec<Event>,
    ) {
        out.clear();
        if self.state != TransportState::Playing {
            return;
        }

        let loop_active = self
            .loop_region
            .filter(|l| l.enabled)
            .filter(|l| l.end_beat > l.start_beat);

        let mut base_offset = 0usize;
        let mut remaining = block_len;

        while remaining > 0 {
            let seg_start = self.position_samples;
            let mut seg_len = remaining;
            let mut wraps = false;

            if let Some(region) = loop_active {
                let loop_end = self.time.beats_to_samples(region.end_beat);
                if seg_start < loop_end && seg_start + remaining as u64 >= loop_end {
                    seg_len = (loop_end - seg_start) as usize;
                    wraps = true;
                }
            }

            self.collect_segment(
                seg_start,
                seg_len,
                base_offset,
                arrangement,
                patterns,
                lanes,
                out,
            );
            self.position_samples += seg_len as u64;
            base_offset += seg_len;
            remaining -= seg_len;

            if wraps {
                // Gates that extend past the loop end are cut at the wrap
                let region = loop_active.unwrap();
                let wrap_offset = base_offset.min(block_len.saturating_sub(1));
                let mut i = 0;
                while i < self.pending_offs.len() {
                    if self.pending_offs[i].beat >= region.end_beat {
                        let off = self.pending_offs.swap_remove(i);
                        out.push(Event {
                            offset: wrap_offset,
                            kind: EventKind::NoteOff {
                                track: off.track,
                                note: off.note,
                            },
                        });
                    } else {
                        i += 1;
                    }
                }
                self.position_samples = self.time.beats_to_samples(region.start_beat);
            }
        }

        out.sort_by(|a, b| (a.offset, a.kind.rank()).cmp(&(b.offset, b.kind.rank())));
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_segment(
        &mut self,
        seg_start: u64,
        seg_len: usize,
        base_offset: usize,
        arrangement: &Arrangement,
        patterns: &PatternBank,
        lanes: &[AutomationLane],
        out: &mut Vec<Event>,
    ) {
        let seg_end = seg_start + seg_len as u64;
        let b0 = self.time.samples_to_beats(seg_start);
        let b1 = self.time.samples_to_beats(seg_end);
        let step_beats = self.time.step_beats();

        // Flush pending note-offs landing in this segment
        let mut i = 0;
        while i < self.pending_offs.len() {
            let s = self.time.beats_to_samples(self.pending_offs[i].beat);
            if s >= seg_start && s < seg_end {
                let off = self.pending_offs.swap_remove(i);
                out.push(Event {
                    offset: base_offset + (s - seg_start) as usize,
                    kind: EventKind::NoteOff {
                        track: off.track,
                        note: off.note,
                    },
                });
            } else {
                i += 1;
            }
        }

        for clip in arrangement.clips_in_range(b0 - step_beats, b1 + step_beats) {
            if clip.muted || clip.length_beats <= 0.0 {
                continue;
            }
            match clip.kind {
                ClipKind::Pattern => {
                    self.collect_pattern_clip(
                        clip, seg_start, seg_end, base_offset, patterns, out,
                    );
                }
                ClipKind::Automation => {
                    if b0 >= clip.start_beat && b0 < clip.end_beat() {
                        if let Some(lane) = lanes.iter().find(|l| l.id == clip.payload) {
                            if let Some(value) = lane.value_at(b0) {
                                out.push(Event {
                                    offset: base_offset,
                                    kind: EventKind::Automation {
                                        target: lane.target,
                                        value,
                                    },
                                });
                            }
                        }
                    }
                }
                ClipKind::Audio => {
                    // Audio clips trigger their sample player at the clip
                    // start
                    let s = self.time.beats_to_samples(clip.start_beat);
                    if s >= seg_start && s < seg_end {
                        out.push(Event {
                            offset: base_offset + (s - seg_start) as usize,
                            kind: EventKind::NoteOn {
                                track: clip.track,
                                note: 60,
                                velocity: 1.0,
                            },
                        });
                    }
                }
            }
        }
    }

    fn collect_pattern_clip(
        &mut self,
        clip: &Clip,
        seg_start: u64,
        seg_end: u64,
        base_offset: usize,
        patterns: &PatternBank,
        out: &mut Vec<Event>,
    ) {
        let Some(pattern) = patterns.get(clip.payload) else {
            return; // missing payload: fail silently
        };
        let steps_per_beat = self.time.steps_per_beat();
        let pattern_beats = pattern.length_beats(steps_per_beat);
        if pattern_beats <= 0.0 {
            return;
        }
        let step_beats = self.time.step_beats();

        let b0 = self.time.samples_to_beats(seg_start);
        let b1 = self.time.samples_to_beats(seg_end);

        // The pattern tiles across the clip; pad one repetition around the
        // window so rounding at the edges cannot drop a step.
        let first_rep = (((b0 - clip.start_beat) / pattern_beats).floor() as i64 - 1).max(0);
        let last_rep = (((b1 - clip.start_beat) / pattern_beats).floor() as i64 + 1).max(0);

        for rep in first_rep..=last_rep {
            let rep_start = clip.start_beat + rep as f64 * pattern_beats;
            if rep_start >= clip.end_beat() {
                break;
            }
            for (k, step) in pattern.steps.iter().enumerate() {
                if !step.active {
                    continue;
                }
                let beat = rep_start + (k as f64 + step.nudge as f64) * step_beats;
                if beat >= clip.end_beat() {
                    continue;
                }
                let s = self.time.beats_to_samples(beat);
                if s < seg_start || s >= seg_end {
                    continue;
                }
                out.push(Event {
                    offset: base_offset + (s - seg_start) as usize,
                    kind: EventKind::NoteOn {
                        track: clip.track,
                        note: step.note,
                        velocity: step.velocity as f64,
                    },
                });

                // Gate: one step, truncated at the clip end
                let gate_beat = (beat + step_beats).min(clip.end_beat());
                let gate_sample = self.time.beats_to_samples(gate_beat);
                if gate_sample >= seg_start && gate_sample < seg_end {
                    out.push(Event {
                        offset: base_offset + (gate_sample - seg_start) as usize,
                        kind: EventKind::NoteOff {
                            track: clip.track,
                            note: step.note,
                        },
                    });
                } else {
                    self.pending_offs.push(PendingOff {
                        beat: gate_beat,
                        track: clip.track,
                        note: step.note,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_core::{Clip, Pattern};

    fn make_time() -> TimeBase {
        TimeBase::new(48000.0, 120.0, 4, 4)
    }

    fn setup(pattern_steps: &[(usize, u8)]) -> (Sequencer, Arrangement, PatternBank, TrackId) {
        let time = make_time();
        let mut pattern = Pattern::new("test", 16);
        for &(idx, note) in pattern_steps {
            pattern.set_step(idx, note, 1.0);
        }
        let pattern_id = pattern.id;
        let mut bank = PatternBank::new();
        bank.upsert(pattern);

        let mut arrangement = Arrangement::new(32.0);
        let track = 7;
        arrangement
            .add_clip(Clip::pattern(track, 0.0, 4.0, pattern_id), 0.25)
            .unwrap();

        (Sequencer::new(time, 32.0), arrangement, bank, track)
    }

    fn note_ons(events: &[Event]) -> Vec<(usize, u8)> {
        events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::NoteOn { note, .. } => Some((e.offset, note)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_stopped_emits_nothing() {
        let (mut seq, arrangement, bank, _) = setup(&[(0, 36)]);
        let mut out = Vec::new();
        seq.next_events(512, &arrangement, &bank, &[], &mut out);
        assert!(out.is_empty());
        assert_eq!(seq.position_samples(), 0);
    }

    #[test]
    fn test_step_zero_fires_at_sample_zero() {
        let (mut seq, arrangement, bank, _) = setup(&[(0, 36)]);
        seq.play();
        let mut out = Vec::new();
        seq.next_events(512, &arrangement, &bank, &[], &mut out);
        let ons = note_ons(&out);
        assert_eq!(ons, vec![(0, 36)]);
    }

    #[test]
    fn test_drum_pattern_event_accuracy() {
        // One bar at 120 BPM, 48 kHz: kick step 0, snare step 4,
        // hats steps 0/2/4/6. Steps are 16ths: step k at k * 6000 samples.
        let (mut seq, mut arrangement, mut bank, _) = setup(&[(0, 36)]);
        let mut snare = Pattern::new("snare", 16);
        snare.set_step(4, 38, 1.0);
        let mut hats = Pattern::new("hats", 16);
        for k in [0, 2, 4, 6] {
            hats.set_step(k, 42, 1.0);
        }
        let snare_id = snare.id;
        let hats_id = hats.id;
        bank.upsert(snare);
        bank.upsert(hats);
        arrangement
            .add_clip(Clip::pattern(8, 0.0, 4.0, snare_id), 0.25)
            .unwrap();
        arrangement
            .add_clip(Clip::pattern(9, 0.0, 4.0, hats_id), 0.25)
            .unwrap();

        seq.play();
        let mut events = Vec::new();
        let mut ons: Vec<(u64, u8)> = Vec::new();
        let block = 512;
        let one_bar = 96000; // 4 beats * 24000 samples
        let mut pos = 0u64;
        while pos < one_bar {
            seq.next_events(block, &arrangement, &bank, &[], &mut events);
            for e in &events {
                if let EventKind::NoteOn { note, .. } = e.kind {
                    ons.push((pos + e.offset as u64, note));
                }
            }
            pos += block as u64;
        }

        let kicks: Vec<u64> = ons.iter().filter(|(_, n)| *n == 36).map(|(s, _)| *s).collect();
        let snares: Vec<u64> = ons.iter().filter(|(_, n)| *n == 38).map(|(s, _)| *s).collect();
        let hats: Vec<u64> = ons.iter().filter(|(_, n)| *n == 42).map(|(s, _)| *s).collect();
        assert_eq!(kicks, vec![0]);
        assert_eq!(snares, vec![24000]);
        assert_eq!(hats, vec![0, 12000, 24000, 36000]);
    }

    #[test]
    fn test_every_note_appears_exactly_once() {
        // Property: each scheduled step fires exactly once regardless of
        // block size, at beats_to_samples(beat) - block_start.
        for &block in &[64usize, 160, 512, 1024] {
            let (mut seq, arrangement, bank, _) =
                setup(&[(0, 60), (3, 61), (7, 62), (15, 63)]);
            seq.play();
            let mut events = Vec::new();
            let mut seen: Vec<(u64, u8)> = Vec::new();
            let mut pos = 0u64;
            while pos < 96000 {
                seq.next_events(block, &arrangement, &bank, &[], &mut events);
                for e in &events {
                    if let EventKind::NoteOn { note, .. } = e.kind {
                        seen.push((pos + e.offset as u64, note));
                    }
                }
                pos += block as u64;
            }
            let time = make_time();
            let mut expected: Vec<(u64, u8)> = [(0usize, 60u8), (3, 61), (7, 62), (15, 63)]
                .iter()
                .map(|&(k, n)| (time.beats_to_samples(k as f64 * 0.25), n))
                .collect();
            expected.sort();
            seen.sort();
            assert_eq!(seen, expected, "block {block}");
        }
    }

    #[test]
    fn test_note_off_scheduled_one_step_later() {
        let (mut seq, arrangement, bank, track) = setup(&[(0, 36)]);
        seq.play();
        let mut events = Vec::new();
        let mut offs: Vec<u64> = Vec::new();
        let mut pos = 0u64;
        while pos < 12000 {
            seq.next_events(512, &arrangement, &bank, &[], &mut events);
            for e in &events {
                if let EventKind::NoteOff { track: t, note } = e.kind {
                    assert_eq!((t, note), (track, 36));
                    offs.push(pos + e.offset as u64);
                }
            }
            pos += 512;
        }
        // One step = 1/4 beat = 6000 samples at 120 BPM / 48 kHz
        assert_eq!(offs, vec![6000]);
    }

    #[test]
    fn test_offs_sort_before_ons_at_same_sample() {
        // Step gate of step k ends exactly when step k+1 starts
        let (mut seq, arrangement, bank, _) = setup(&[(0, 36), (1, 36)]);
        seq.play();
        let mut events = Vec::new();
        // Step 1 starts at sample 6000, inside the second 512-block? No:
        // use one big block to see both events at the same offset.
        seq.next_events(12000, &arrangement, &bank, &[], &mut events);
        let at_6000: Vec<&Event> = events.iter().filter(|e| e.offset == 6000).collect();
        assert_eq!(at_6000.len(), 2);
        assert!(matches!(at_6000[0].kind, EventKind::NoteOff { .. }));
        assert!(matches!(at_6000[1].kind, EventKind::NoteOn { .. }));
    }

    #[test]
    fn test_loop_wrap_splits_block() {
        // Loop [0, 1) beat = [0, 24000) samples. Position 0.99 beats; the
        // block containing the wrap replays the loop start without
        // duplicating or dropping events.
        let (mut seq, arrangement, bank, _) = setup(&[(0, 36)]);
        seq.play();
        seq.set_loop(0.0, 1.0, true).unwrap();
        seq.seek(0.99);
        let start = seq.position_samples();
        let to_wrap = (24000 - start) as usize;

        let mut events = Vec::new();
        seq.next_events(512, &arrangement, &bank, &[], &mut events);
        let ons = note_ons(&events);
        // The loop-start kick replays at the wrap offset
        assert_eq!(ons.len(), 1, "{ons:?}");
        assert_eq!(ons[0], (to_wrap, 36));
        // Position wrapped to just after the loop start
        let wrapped_beats = seq.position_beats();
        assert!(wrapped_beats < 0.02, "{wrapped_beats}");
    }

    #[test]
    fn test_loop_wrap_position_invariant() {
        // After a wrap, position_beats lies within
        // [loop_start, loop_end + block_len in beats]
        let (mut seq, arrangement, bank, _) = setup(&[(0, 36)]);
        seq.play();
        seq.set_loop(1.0, 3.0, true).unwrap();
        seq.seek(1.0);
        let mut events = Vec::new();
        let block = 512;
        let block_beats = block as f64 * 120.0 / (60.0 * 48000.0);
        for _ in 0..400 {
            seq.next_events(block, &arrangement, &bank, &[], &mut events);
            let beats = seq.position_beats();
            assert!(
                beats >= 1.0 - 1e-9 && beats <= 3.0 + block_beats,
                "position {beats}"
            );
        }
    }

    #[test]
    fn test_bpm_change_preserves_beat_position() {
        let (mut seq, arrangement, bank, _) = setup(&[(0, 36)]);
        seq.play();
        let mut events = Vec::new();
        for _ in 0..20 {
            seq.next_events(512, &arrangement, &bank, &[], &mut events);
        }
        let beats_before = seq.position_beats();
        seq.set_bpm(60.0);
        let beats_after = seq.position_beats();
        assert!((beats_before - beats_after).abs() < 1e-6);
        // Sample position doubled at half tempo
        assert!(seq.position_samples() > 20 * 512);
    }

    #[test]
    fn test_seek_saturates_to_bounds() {
        let (mut seq, _, _, _) = setup(&[(0, 36)]);
        seq.seek(-5.0);
        assert_eq!(seq.position_samples(), 0);
        seq.seek(1000.0);
        assert_eq!(seq.position_beats(), 32.0);
    }

    #[test]
    fn test_transport_idempotent() {
        let (mut seq, _, _, _) = setup(&[]);
        seq.play();
        seq.play();
        assert_eq!(seq.state(), TransportState::Playing);
        seq.stop();
        let pos = seq.position_samples();
        seq.stop();
        assert_eq!(seq.state(), TransportState::Stopped);
        assert_eq!(seq.position_samples(), pos);
    }

    #[test]
    fn test_muted_clip_is_silent() {
        let time = make_time();
        let mut pattern = Pattern::new("p", 16);
        pattern.set_step(0, 36, 1.0);
        let pid = pattern.id;
        let mut bank = PatternBank::new();
        bank.upsert(pattern);
        let mut arrangement = Arrangement::new(32.0);
        let mut clip = Clip::pattern(1, 0.0, 4.0, pid);
        clip.muted = true;
        arrangement.add_clip(clip, 0.25).unwrap();
        let mut seq = Sequencer::new(time, 32.0);
        seq.play();
        let mut out = Vec::new();
        seq.next_events(512, &arrangement, &bank, &[], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_pattern_fails_silently() {
        let time = make_time();
        let bank = PatternBank::new();
        let mut arrangement = Arrangement::new(32.0);
        arrangement
            .add_clip(Clip::pattern(1, 0.0, 4.0, 9999), 0.25)
            .unwrap();
        let mut seq = Sequencer::new(time, 32.0);
        seq.play();
        let mut out = Vec::new();
        seq.next_events(512, &arrangement, &bank, &[], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_automation_emitted_at_block_start() {
        use bb_core::{AutomationLane, ParamTarget};
        let time = make_time();
        let mut lane = AutomationLane::new(ParamTarget::TrackVolume(1));
        lane.add_point(0.0, 0.0);
        lane.add_point(4.0, 1.0);
        let lane_id = lane.id;
        let mut arrangement = Arrangement::new(32.0);
        arrangement
            .add_clip(Clip::automation(1, 0.0, 4.0, lane_id), 0.25)
            .unwrap();
        let bank = PatternBank::new();
        let mut seq = Sequencer::new(time, 32.0);
        seq.play();
        let mut out = Vec::new();
        let lanes = vec![lane];
        // Advance to beat 2 (48000 samples)
        for _ in 0..94 {
            seq.next_events(512, &arrangement, &bank, &lanes, &mut out);
        }
        seq.next_events(512, &arrangement, &bank, &lanes, &mut out);
        let auto: Vec<&Event> = out
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Automation { .. }))
            .collect();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].offset, 0);
        if let EventKind::Automation { value, .. } = auto[0].kind {
            // ~halfway through the 4-beat ramp
            assert!((value - 0.5).abs() < 0.02, "{value}");
        }
    }

    #[test]
    fn test_pattern_tiles_across_long_clip() {
        // A 16-step (4-beat) pattern in an 8-beat clip repeats once
        let (mut seq, mut arrangement, bank, _) = setup(&[(0, 36)]);
        // Replace the 4-beat clip with an 8-beat one on another track
        let pid = bank.patterns[0].id;
        arrangement
            .add_clip(Clip::pattern(20, 8.0, 8.0, pid), 0.25)
            .unwrap();
        seq.play();
        seq.seek(8.0);
        let mut events = Vec::new();
        let mut ons: Vec<u64> = Vec::new();
        let mut pos = seq.position_samples();
        while pos < seq.time().beats_to_samples(16.0) {
            seq.next_events(512, &arrangement, &bank, &[], &mut events);
            for e in &events {
                if let EventKind::NoteOn { track: 20, .. } = e.kind {
                    ons.push(pos + e.offset as u64);
                }
            }
            pos += 512;
        }
        // Repetitions at beats 8 and 12
        let time = make_time();
        assert_eq!(
            ons,
            vec![time.beats_to_samples(8.0), time.beats_to_samples(12.0)]
        );
    }
}
