//! Session data model: patterns, clips, tracks, buses, loop region
//!
//! These are value objects shared between the control plane and the audio
//! plane. Mutation happens on the control thread; the audio thread receives
//! owned copies through the message ring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{EngineError, EngineResult};

// ═══════════════════════════════════════════════════════════════════════════
// IDS
// ═══════════════════════════════════════════════════════════════════════════

pub type TrackId = u64;
pub type PatternId = u64;
pub type ClipId = u64;
pub type BusId = u64;
pub type SampleId = u64;
pub type LaneId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh object id, unique within the process
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The master bus has a fixed, well-known id
pub const MASTER_BUS_ID: BusId = 0;

// ═══════════════════════════════════════════════════════════════════════════
// PATTERN
// ═══════════════════════════════════════════════════════════════════════════

/// Default number of steps in a new pattern
pub const DEFAULT_PATTERN_STEPS: usize = 16;

/// One step of a pattern row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub active: bool,
    /// MIDI note number 0..=127
    pub note: u8,
    /// Velocity 0..=1
    pub velocity: f32,
    /// Micro-timing offset within the step, 0..1 of the step length
    pub nudge: f32,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            active: false,
            note: 60,
            velocity: 1.0,
            nudge: 0.0,
        }
    }
}

/// Step pattern. Identity is the id; the steps are plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub steps: Vec<Step>,
}

impl Pattern {
    pub fn new(name: &str, step_count: usize) -> Self {
        Self {
            id: next_id(),
            name: name.to_string(),
            steps: vec![Step::default(); step_count.max(1)],
        }
    }

    /// Activate a step with the given note and velocity
    pub fn set_step(&mut self, index: usize, note: u8, velocity: f32) {
        if let Some(step) = self.steps.get_mut(index) {
            step.active = true;
            step.note = note.min(127);
            step.velocity = velocity.clamp(0.0, 1.0);
        }
    }

    pub fn clear_step(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            step.active = false;
        }
    }

    /// Pattern length in beats at the given grid subdivision
    pub fn length_beats(&self, steps_per_beat: u32) -> f64 {
        self.steps.len() as f64 / steps_per_beat as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CLIP / ARRANGEMENT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipKind {
    Pattern,
    Audio,
    Automation,
}

/// Placement of a payload on the arrangement timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub track: TrackId,
    pub start_beat: f64,
    pub length_beats: f64,
    pub kind: ClipKind,
    /// Pattern, sample, or automation-lane id depending on `kind`
    pub payload: u64,
    pub muted: bool,
}

impl Clip {
    pub fn pattern(track: TrackId, start_beat: f64, length_beats: f64, pattern: PatternId) -> Self {
        Self {
            id: next_id(),
            track,
            start_beat,
            length_beats,
            kind: ClipKind::Pattern,
            payload: pattern,
            muted: false,
        }
    }

    pub fn automation(track: TrackId, start_beat: f64, length_beats: f64, lane: LaneId) -> Self {
        Self {
            id: next_id(),
            track,
            start_beat,
            length_beats,
            kind: ClipKind::Automation,
            payload: lane,
            muted: false,
        }
    }

    #[inline]
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.length_beats
    }
}

/// Arrangement timeline: clips placed on tracks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub length_beats: f64,
    pub clips: Vec<Clip>,
}

impl Arrangement {
    pub fn new(length_beats: f64) -> Self {
        Self {
            length_beats,
            clips: Vec::new(),
        }
    }

    /// Add a clip, enforcing the timeline invariants: minimum length,
    /// arrangement bounds (start saturates), and no overlap within a track.
    pub fn add_clip(&mut self, mut clip: Clip, min_length_beats: f64) -> EngineResult<ClipId> {
        if clip.length_beats < min_length_beats {
            return Err(EngineError::InvalidParameter {
                name: "clip.length_beats",
                value: clip.length_beats,
            });
        }
        clip.start_beat = clip.start_beat.clamp(0.0, self.length_beats);
        if clip.end_beat() > self.length_beats {
            clip.length_beats = self.length_beats - clip.start_beat;
        }
        let overlaps = self.clips.iter().any(|c| {
            c.track == clip.track
                && c.start_beat < clip.end_beat()
                && clip.start_beat < c.end_beat()
        });
        if overlaps {
            return Err(EngineError::InvalidState("clip overlaps existing clip"));
        }
        let id = clip.id;
        self.clips.push(clip);
        Ok(id)
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let idx = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(idx))
    }

    /// Clips on any track intersecting the half-open beat window
    pub fn clips_in_range(&self, start_beat: f64, end_beat: f64) -> impl Iterator<Item = &Clip> {
        self.clips
            .iter()
            .filter(move |c| c.start_beat < end_beat && start_beat < c.end_beat())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOOP REGION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start_beat: f64,
    pub end_beat: f64,
    pub enabled: bool,
}

impl LoopRegion {
    pub fn new(start_beat: f64, end_beat: f64, enabled: bool) -> EngineResult<Self> {
        if !(start_beat < end_beat) || start_beat < 0.0 {
            return Err(EngineError::InvalidParameter {
                name: "loop_region",
                value: start_beat,
            });
        }
        Ok(Self {
            start_beat,
            end_beat,
            enabled,
        })
    }

    #[inline]
    pub fn length_beats(&self) -> f64 {
        self.end_beat - self.start_beat
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TRACK
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Drum,
    Synth,
    Sample,
    Bus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

/// Oscillator waveform selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
    Pulse { width: f32 },
}

impl Default for Waveform {
    fn default() -> Self {
        Self::Saw
    }
}

/// ADSR timings in seconds, sustain as level 0..=1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrParams {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.08,
            sustain: 0.7,
            release: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub cutoff_hz: f64,
    /// Resonance 0..=1, mapped to Q in [0.5, 20] by the voice
    pub resonance: f64,
    pub kind: FilterKind,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 8000.0,
            resonance: 0.2,
            kind: FilterKind::Lowpass,
        }
    }
}

/// Low-frequency oscillator routing for a track's voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfoTarget {
    PitchCents,
    FilterCutoff,
    Amp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LfoParams {
    pub target: LfoTarget,
    /// Rate in Hz, or in beats per cycle when `synced`
    pub rate: f64,
    pub synced: bool,
    /// Modulation depth in target units (cents, Hz, or linear amp)
    pub depth: f64,
    pub enabled: bool,
}

impl Default for LfoParams {
    fn default() -> Self {
        Self {
            target: LfoTarget::PitchCents,
            rate: 5.0,
            synced: false,
            depth: 0.0,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SendLevel {
    pub bus: BusId,
    pub level: f32,
}

/// Per-track synthesis and mix parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackParams {
    /// Output volume 0..=1
    pub volume: f32,
    /// Pan -1..=1
    pub pan: f32,
    pub amp_env: AdsrParams,
    pub filter: FilterParams,
    pub filter_env: AdsrParams,
    /// Filter envelope amount in Hz, signed for polarity
    pub filter_env_amount: f64,
    pub detune_cents: f64,
    pub waveform: Waveform,
    /// When set, voices restart oscillator phase on every trigger
    pub reset_phase: bool,
    pub lfos: [LfoParams; 2],
    pub sends: Vec<SendLevel>,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            amp_env: AdsrParams::default(),
            filter: FilterParams::default(),
            filter_env: AdsrParams {
                attack: 0.001,
                decay: 0.2,
                sustain: 0.0,
                release: 0.2,
            },
            filter_env_amount: 0.0,
            detune_cents: 0.0,
            waveform: Waveform::default(),
            reset_phase: false,
            lfos: [LfoParams::default(); 2],
            sends: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub color: u32,
    pub muted: bool,
    pub soloed: bool,
    pub params: TrackParams,
}

impl Track {
    pub fn new(name: &str, kind: TrackKind) -> Self {
        Self {
            id: next_id(),
            name: name.to_string(),
            kind,
            color: 0x4f8fba,
            muted: false,
            soloed: false,
            params: TrackParams::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BUS
// ═══════════════════════════════════════════════════════════════════════════

/// Bus description. Routing and effect chains live in the engine graph; this
/// is the persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusDef {
    pub id: BusId,
    pub name: String,
    pub input_gain_db: f64,
    pub output_gain_db: f64,
    /// Downstream bus this one feeds; master feeds the output device
    pub output_to: BusId,
}

impl BusDef {
    pub fn new(name: &str) -> Self {
        Self {
            id: next_id(),
            name: name.to_string(),
            input_gain_db: 0.0,
            output_gain_db: 0.0,
            output_to: MASTER_BUS_ID,
        }
    }

    pub fn master() -> Self {
        Self {
            id: MASTER_BUS_ID,
            name: "Master".to_string(),
            input_gain_db: 0.0,
            output_gain_db: 0.0,
            output_to: MASTER_BUS_ID,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// AUTOMATION
// ═══════════════════════════════════════════════════════════════════════════

/// Addressable automation / parameter-event target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamTarget {
    TrackVolume(TrackId),
    TrackPan(TrackId),
    TrackCutoff(TrackId),
    SendLevel(TrackId, BusId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub beat: f64,
    pub value: f64,
}

/// Automation lane: sorted breakpoints, linearly interpolated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    pub id: LaneId,
    pub target: ParamTarget,
    pub points: Vec<AutomationPoint>,
}

impl AutomationLane {
    pub fn new(target: ParamTarget) -> Self {
        Self {
            id: next_id(),
            target,
            points: Vec::new(),
        }
    }

    /// Insert a point, keeping the list sorted by beat
    pub fn add_point(&mut self, beat: f64, value: f64) {
        let idx = self
            .points
            .partition_point(|p| p.beat < beat);
        self.points.insert(idx, AutomationPoint { beat, value });
    }

    /// Linearly interpolated value at a beat position
    pub fn value_at(&self, beat: f64) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|p| p.beat <= beat);
        if idx == 0 {
            return Some(self.points[0].value);
        }
        if idx == self.points.len() {
            return Some(self.points[idx - 1].value);
        }
        let a = self.points[idx - 1];
        let b = self.points[idx];
        let span = b.beat - a.beat;
        if span <= 0.0 {
            return Some(b.value);
        }
        let t = (beat - a.beat) / span;
        Some(a.value + (b.value - a.value) * t)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EFFECT / EQ / COMPRESSOR CONFIG
// ═══════════════════════════════════════════════════════════════════════════

/// Maximum EQ bands per stack
pub const MAX_EQ_BANDS: usize = 24;

/// Maximum insert slots per chain
pub const MAX_INSERT_SLOTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EqBandKind {
    #[default]
    Peaking,
    LowShelf,
    HighShelf,
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EqMode {
    #[default]
    ZeroLatency,
    LinearPhase,
}

/// One EQ band's persisted parameters. Q and bandwidth are exclusive: the
/// band stores whichever was set last.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBandConfig {
    pub id: u64,
    pub kind: EqBandKind,
    pub frequency: f64,
    pub gain_db: f64,
    pub q: f64,
    pub bandwidth_hz: Option<f64>,
    /// Shelf slope in dB/octave, shelves only
    pub slope_db_per_oct: f64,
    pub enabled: bool,
}

impl Default for EqBandConfig {
    fn default() -> Self {
        Self {
            id: next_id(),
            kind: EqBandKind::Peaking,
            frequency: 1000.0,
            gain_db: 0.0,
            q: 1.0,
            bandwidth_hz: None,
            slope_db_per_oct: 12.0,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectorKind {
    #[default]
    Peak,
    Rms,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MakeupGain {
    Manual(f64),
    Auto,
}

impl Default for MakeupGain {
    fn default() -> Self {
        Self::Manual(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorConfig {
    pub threshold_db: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup: MakeupGain,
    pub detector: DetectorKind,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            knee_db: 6.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup: MakeupGain::default(),
            detector: DetectorKind::Peak,
        }
    }
}

/// Built-in insert effect kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Delay,
    Reverb,
    Distortion,
}

/// Persisted insert-slot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertConfig {
    pub position: usize,
    pub kind: EffectKind,
    pub enabled: bool,
    pub bypass: bool,
    pub params: Vec<f64>,
}
