//! Control-plane and reverse-ring message types
//!
//! Control messages carry POD or owned handles; nothing the audio thread
//! would have to allocate or free. Heavy objects (effect slots, EQ stacks,
//! whole track processors, sample buffers) are constructed on the control
//! thread and swapped in by pointer; the displaced object travels back on
//! the reverse ring as [`Garbage`] for the control thread to drop.

use std::sync::Arc;

use bb_core::{BusId, Clip, ClipId, CompressorConfig, EqBandConfig, EqBandKind, EqMode, LaneId,
    ParamTarget, Pattern, PatternId, TrackId, TrackParams};
use bb_core::AutomationLane;
use bb_dsp::EqStack;
use bb_synth::SampleBuffer;

use crate::graph::BusNode;
use crate::insert::EffectSlot;
use crate::scheduler::TrackProcessor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCmd {
    Play,
    Stop,
    Seek(f64),
    SetBpm(f64),
    SetLoop {
        start_beat: f64,
        end_beat: f64,
        enabled: bool,
    },
    ClearLoop,
}

/// Addresses a channel strip: a track's, or a bus's (the master included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripAddr {
    Track(TrackId),
    Bus(BusId),
}

/// Single-field EQ band edit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EqBandChange {
    Kind(EqBandKind),
    Frequency(f64),
    GainDb(f64),
    Q(f64),
    BandwidthHz(f64),
    SlopeDbPerOct(f64),
    Enabled(bool),
}

/// Control thread -> audio thread
pub enum ControlMsg {
    Transport(TransportCmd),

    NoteOn {
        track: TrackId,
        note: u8,
        velocity: f64,
    },
    NoteOff {
        track: TrackId,
        note: u8,
    },
    /// External parameter event ("now" semantics: applied next block)
    SetParam {
        target: ParamTarget,
        value: f64,
    },

    AddTrack(Box<TrackProcessor>),
    RemoveTrack(TrackId),
    SetTrackParams {
        track: TrackId,
        params: Box<TrackParams>,
    },
    SetTrackMute {
        track: TrackId,
        muted: bool,
    },
    SetTrackSolo {
        track: TrackId,
        soloed: bool,
    },

    UpsertPattern(Box<Pattern>),
    RemovePattern(PatternId),
    AddClip(Clip),
    RemoveClip(ClipId),
    UpsertLane(Box<AutomationLane>),
    RemoveLane(LaneId),

    LoadSample {
        track: TrackId,
        buffer: Arc<SampleBuffer>,
    },

    LoadEffect {
        addr: StripAddr,
        position: Option<usize>,
        slot: Box<EffectSlot>,
    },
    RemoveEffect {
        addr: StripAddr,
        position: usize,
    },
    ReorderEffect {
        addr: StripAddr,
        from: usize,
        to: usize,
    },
    SetEffectBypass {
        addr: StripAddr,
        position: usize,
        bypass: bool,
    },
    SetChainBypass {
        addr: StripAddr,
        bypass: bool,
    },
    SetEffectParam {
        addr: StripAddr,
        position: usize,
        param: usize,
        value: f64,
    },

    EqAddBand {
        addr: StripAddr,
        config: EqBandConfig,
    },
    EqRemoveBand {
        addr: StripAddr,
        index: usize,
    },
    EqReorderBand {
        addr: StripAddr,
        from: usize,
        to: usize,
    },
    EqSetBand {
        addr: StripAddr,
        index: usize,
        change: EqBandChange,
    },
    EqSetMode {
        addr: StripAddr,
        mode: EqMode,
    },
    EqSetEnabled {
        addr: StripAddr,
        enabled: bool,
    },
    EqSetBypass {
        addr: StripAddr,
        bypass: bool,
    },
    EqSetDryWet {
        addr: StripAddr,
        mix: f64,
    },
    EqSetCharacter {
        addr: StripAddr,
        amount: f64,
        drive_db: f64,
    },
    /// Whole-stack swap (used for fft-size overrides); the old stack comes
    /// back as garbage
    ReplaceEq {
        addr: StripAddr,
        eq: Box<EqStack>,
    },

    SetCompressor {
        addr: StripAddr,
        config: CompressorConfig,
    },
    SetCompressorEnabled {
        addr: StripAddr,
        enabled: bool,
    },

    SetPreGainDb {
        addr: StripAddr,
        db: f64,
    },
    SetPostGainDb {
        addr: StripAddr,
        db: f64,
    },
    SetPan {
        addr: StripAddr,
        pan: f64,
    },
    SetSendLevel {
        addr: StripAddr,
        bus: BusId,
        level: f64,
    },

    AddBus(Box<BusNode>),
    RemoveBus(BusId),
    /// Route `from`'s output into `to`. The audio thread re-verifies
    /// acyclicity and ignores the message if a cycle would form.
    ConnectBus {
        from: BusId,
        to: BusId,
    },
    SetBusGains {
        bus: BusId,
        input_db: f64,
        output_db: f64,
    },
}

/// Objects displaced on the audio thread, returned for control-side drop
pub enum Garbage {
    Effect(Box<EffectSlot>),
    Eq(Box<EqStack>),
    Track(Box<TrackProcessor>),
    Bus(Box<BusNode>),
    Buffer(Arc<SampleBuffer>),
    Pattern(Pattern),
    Lane(AutomationLane),
    Params(Box<TrackParams>),
}

/// Per-track meter values for one block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackMeters {
    pub track: TrackId,
    pub peak_l_db: f64,
    pub peak_r_db: f64,
    pub rms_l_db: f64,
    pub rms_r_db: f64,
    pub gain_reduction_db: f64,
}

/// Master-section meter values for one block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterFrame {
    pub peak_l_db: f64,
    pub peak_r_db: f64,
    pub lufs_momentary: f64,
    pub lufs_short_term: f64,
    pub lufs_integrated: f64,
    pub true_peak_db: f64,
    pub voices_active: u32,
    /// DSP edge cases clamped on the audio thread since the last frame
    pub clamp_count: u32,
}

/// Audio thread -> control thread
pub enum ReverseMsg {
    Meters(MeterFrame),
    Track(TrackMeters),
    Garbage(Garbage),
    /// Non-critical messages were dropped under backpressure
    Dropped { count: u32 },
}
