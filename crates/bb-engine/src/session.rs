//! Session: the root object of the engine
//!
//! A [`Session`] is the control-side description of everything the engine
//! plays: configuration, tracks, patterns, arrangement, buses, loop region,
//! strip configurations, and loaded samples. [`Session::spawn`] builds the
//! audio-thread [`AudioEngine`] plus a [`SessionHandle`] the control plane
//! keeps. The handle keeps its model in sync with what it has sent, so
//! snapshots are deterministic and an offline render of the same model
//! reproduces the live graph.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rtrb::Consumer;

use bb_core::{Arrangement, AutomationLane, BusDef, BusId, Clip, ClipId, CompressorConfig,
    EngineError, EngineResult, EqBandConfig, EqMode, InsertConfig, LoopRegion,
    MASTER_BUS_ID, MAX_EQ_BANDS, MAX_INSERT_SLOTS, ParamTarget, Pattern, SessionConfig,
    SessionSnapshot, StripConfig, TimeBase, Track, TrackId, TrackKind, TrackParams,
    TrackSnapshot, EffectKind};
use bb_dsp::EqStack;
use bb_seq::{PatternBank, Sequencer};
use bb_synth::SampleBuffer;

use crate::graph::{BusGraph, BusNode};
use crate::insert::{EffectSlot, InsertChain, build_effect};
use crate::messages::{ControlMsg, EqBandChange, ReverseMsg, StripAddr, TransportCmd};
use crate::rings::{ControlSender, MeterReadings, control_ring, reverse_ring};
use crate::scheduler::{AudioEngine, TrackProcessor};
use crate::strip::TrackStrip;

/// Loaded, immutable sample buffers shared between control threads
#[derive(Debug, Clone, Default)]
pub struct SampleRegistry {
    inner: Arc<RwLock<HashMap<TrackId, Arc<SampleBuffer>>>>,
}

impl SampleRegistry {
    pub fn insert(&self, track: TrackId, buffer: Arc<SampleBuffer>) {
        self.inner.write().insert(track, buffer);
    }

    pub fn get(&self, track: TrackId) -> Option<Arc<SampleBuffer>> {
        self.inner.read().get(&track).cloned()
    }
}

/// Control-side description of a session
#[derive(Clone)]
pub struct Session {
    pub config: SessionConfig,
    pub bpm: f64,
    /// Seed for reverb impulse generation; identical seeds give identical
    /// offline renders
    pub seed: u64,
    pub tracks: Vec<Track>,
    pub patterns: Vec<Pattern>,
    pub buses: Vec<BusDef>,
    /// Strip configuration per track, per bus, and for the master
    pub strips: Vec<(StripAddr, StripConfig)>,
    pub arrangement: Arrangement,
    pub loop_region: Option<LoopRegion>,
    pub lanes: Vec<AutomationLane>,
    pub samples: SampleRegistry,
}

impl Session {
    pub fn new(config: SessionConfig) -> EngineResult<Self> {
        config.validate()?;
        let arrangement = Arrangement::new(config.arrangement_length_beats());
        let mut master_strip = StripConfig::default();
        master_strip.eq.fft_size = config.default_eq_fft_size;
        Ok(Self {
            config,
            bpm: 120.0,
            seed: 0,
            tracks: Vec::new(),
            patterns: Vec::new(),
            buses: vec![BusDef::master()],
            strips: vec![(StripAddr::Bus(MASTER_BUS_ID), master_strip)],
            arrangement,
            loop_region: None,
            lanes: Vec::new(),
            samples: SampleRegistry::default(),
        })
    }

    pub fn add_track(&mut self, name: &str, kind: TrackKind) -> TrackId {
        let track = Track::new(name, kind);
        let id = track.id;
        let mut strip = StripConfig::default();
        strip.eq.fft_size = self.config.default_eq_fft_size;
        strip.mixer.pan = track.params.pan as f64;
        self.strips.push((StripAddr::Track(id), strip));
        self.tracks.push(track);
        id
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn strip_config(&self, addr: StripAddr) -> Option<&StripConfig> {
        self.strips.iter().find(|(a, _)| *a == addr).map(|(_, c)| c)
    }

    pub fn strip_config_mut(&mut self, addr: StripAddr) -> Option<&mut StripConfig> {
        self.strips
            .iter_mut()
            .find(|(a, _)| *a == addr)
            .map(|(_, c)| c)
    }

    pub fn add_pattern(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub fn add_bus(&mut self, name: &str) -> BusId {
        let bus = BusDef::new(name);
        let id = bus.id;
        self.buses.push(bus);
        self.strips
            .push((StripAddr::Bus(id), StripConfig::default()));
        id
    }

    pub fn add_clip(&mut self, clip: Clip) -> EngineResult<ClipId> {
        let min_len = 1.0 / self.config.steps_per_beat as f64;
        self.arrangement.add_clip(clip, min_len)
    }

    pub fn add_lane(&mut self, lane: AutomationLane) {
        self.lanes.push(lane);
    }

    pub fn set_loop(&mut self, start_beat: f64, end_beat: f64, enabled: bool) -> EngineResult<()> {
        self.loop_region = Some(LoopRegion::new(start_beat, end_beat, enabled)?);
        Ok(())
    }

    fn time_base(&self) -> TimeBase {
        TimeBase::new(
            self.config.sample_rate.as_f64(),
            self.bpm,
            self.config.steps_per_beat,
            self.config.beats_per_bar,
        )
    }

    /// Apply a strip configuration onto a live strip
    fn configure_strip(&self, strip: &mut TrackStrip, config: &StripConfig) {
        let sample_rate = self.config.sample_rate.as_f64();
        strip.set_pre_gain_db(config.mixer.pre_gain_db);
        strip.set_post_gain_db(config.mixer.post_gain_db);
        strip.eq = EqStack::from_snapshot(&config.eq, sample_rate, self.config.block_len);
        strip.eq_enabled = config.eq.enabled;
        strip.set_compressor_config(&config.compressor);
        strip.compressor_enabled = config.compressor_enabled;
        strip.inserts = InsertChain::from_snapshot(&config.inserts, sample_rate, self.seed);
        for send in &config.mixer.sends {
            strip.set_send(send.bus, send.level as f64);
        }
    }

    /// Build the audio engine and the control handle. The session is
    /// consumed into the handle's model.
    pub fn spawn(self) -> EngineResult<(AudioEngine, SessionHandle)> {
        self.config.validate()?;
        let sample_rate = self.config.sample_rate.as_f64();

        let mut sequencer = Sequencer::new(self.time_base(), self.arrangement.length_beats);
        if let Some(region) = self.loop_region {
            sequencer.set_loop(region.start_beat, region.end_beat, region.enabled)?;
        }

        let mut patterns = PatternBank::new();
        for pattern in &self.patterns {
            patterns.upsert(pattern.clone());
        }

        let mut tracks = Vec::with_capacity(self.tracks.len());
        for track in &self.tracks {
            let mut processor = TrackProcessor::new(track, &self.config);
            if let Some(config) = self.strip_config(StripAddr::Track(track.id)) {
                self.configure_strip(&mut processor.strip, config);
            }
            if let Some(buffer) = self.samples.get(track.id) {
                let _ = processor.set_sample(buffer);
            }
            tracks.push(processor);
        }

        let mut graph = BusGraph::new(self.config.block_len);
        // Two passes: materialize every bus first, then apply routing, so
        // creation order cannot reference a bus that does not exist yet.
        for def in self.buses.iter().filter(|b| b.id != MASTER_BUS_ID) {
            let mut flat = def.clone();
            flat.output_to = MASTER_BUS_ID;
            let mut node = BusNode::new(&flat, self.config.block_len);
            if let Some(config) = self.strip_config(StripAddr::Bus(def.id)) {
                node.chain = InsertChain::from_snapshot(&config.inserts, sample_rate, self.seed);
            }
            if graph.add_bus(node).is_err() {
                return Err(EngineError::InvalidState("duplicate bus id"));
            }
        }
        for def in self.buses.iter().filter(|b| b.id != MASTER_BUS_ID) {
            if def.output_to != MASTER_BUS_ID {
                graph.connect(def.id, def.output_to)?;
            }
        }

        let mut master = TrackStrip::new(
            sample_rate,
            self.config.block_len,
            self.config.default_eq_fft_size,
        );
        if let Some(config) = self.strip_config(StripAddr::Bus(MASTER_BUS_ID)) {
            self.configure_strip(&mut master, config);
        }

        let (control_tx, control_rx) = control_ring();
        let (reverse_tx, reverse_rx) = reverse_ring();

        let engine = AudioEngine::new(
            self.config.clone(),
            sequencer,
            self.arrangement.clone(),
            patterns,
            self.lanes.clone(),
            tracks,
            graph,
            master,
            control_rx,
            reverse_tx,
        );

        let handle = SessionHandle {
            model: self,
            sender: ControlSender::new(control_tx),
            reverse_rx,
            readings: MeterReadings::default(),
            advisory: 0,
        };
        Ok((engine, handle))
    }
}

/// The control plane's handle: sends messages, mirrors the sent state in
/// its model, polls meters, and owns the garbage the audio thread returns.
pub struct SessionHandle {
    model: Session,
    sender: ControlSender,
    reverse_rx: Consumer<ReverseMsg>,
    readings: MeterReadings,
    /// Count of parameter writes that were snapped to their valid range
    advisory: u32,
}

impl SessionHandle {
    pub fn config(&self) -> &SessionConfig {
        &self.model.config
    }

    pub fn model(&self) -> &Session {
        &self.model
    }

    /// Out-of-range parameter writes are clamped, not rejected; this
    /// advisory counter tells the UI that a value it sent was adjusted.
    /// Reading clears it.
    pub fn take_advisory(&mut self) -> u32 {
        std::mem::take(&mut self.advisory)
    }

    fn note_clamp(&mut self, sent: f64, applied: f64) -> f64 {
        if !sent.is_finite() || (sent - applied).abs() > f64::EPSILON * sent.abs().max(1.0) {
            self.advisory = self.advisory.saturating_add(1);
        }
        applied
    }

    // ---- transport ----

    pub fn play(&mut self) -> EngineResult<()> {
        self.sender.send(ControlMsg::Transport(TransportCmd::Play))
    }

    pub fn stop(&mut self) -> EngineResult<()> {
        self.sender.send(ControlMsg::Transport(TransportCmd::Stop))
    }

    pub fn seek(&mut self, beats: f64) -> EngineResult<()> {
        self.sender
            .send(ControlMsg::Transport(TransportCmd::Seek(beats)))
    }

    /// Tempo change; out-of-range values clamp exactly as the audio thread
    /// clamps them.
    pub fn set_bpm(&mut self, bpm: f64) -> EngineResult<()> {
        let applied = bpm.clamp(bb_core::MIN_TEMPO, bb_core::MAX_TEMPO);
        self.model.bpm = self.note_clamp(bpm, applied);
        self.sender
            .send(ControlMsg::Transport(TransportCmd::SetBpm(bpm)))
    }

    pub fn set_loop(&mut self, start_beat: f64, end_beat: f64, enabled: bool) -> EngineResult<()> {
        let region = LoopRegion::new(start_beat, end_beat, enabled)?;
        self.model.loop_region = Some(region);
        self.sender.send(ControlMsg::Transport(TransportCmd::SetLoop {
            start_beat,
            end_beat,
            enabled,
        }))
    }

    // ---- live input ----

    pub fn note_on(&mut self, track: TrackId, note: u8, velocity: f64) -> EngineResult<()> {
        self.sender.send(ControlMsg::NoteOn {
            track,
            note,
            velocity,
        })
    }

    pub fn note_off(&mut self, track: TrackId, note: u8) -> EngineResult<()> {
        self.sender.send(ControlMsg::NoteOff { track, note })
    }

    pub fn set_param(&mut self, target: ParamTarget, value: f64) -> EngineResult<()> {
        self.sender.send(ControlMsg::SetParam { target, value })
    }

    // ---- tracks ----

    pub fn set_track_params(&mut self, track: TrackId, params: TrackParams) -> EngineResult<()> {
        if let Some(t) = self.model.track_mut(track) {
            t.params = params.clone();
        }
        self.sender.send(ControlMsg::SetTrackParams {
            track,
            params: Box::new(params),
        })
    }

    pub fn set_track_mute(&mut self, track: TrackId, muted: bool) -> EngineResult<()> {
        if let Some(t) = self.model.track_mut(track) {
            t.muted = muted;
        }
        if let Some(config) = self.model.strip_config_mut(StripAddr::Track(track)) {
            config.mixer.muted = muted;
        }
        self.sender.send(ControlMsg::SetTrackMute { track, muted })
    }

    pub fn set_track_solo(&mut self, track: TrackId, soloed: bool) -> EngineResult<()> {
        if let Some(t) = self.model.track_mut(track) {
            t.soloed = soloed;
        }
        if let Some(config) = self.model.strip_config_mut(StripAddr::Track(track)) {
            config.mixer.soloed = soloed;
        }
        self.sender.send(ControlMsg::SetTrackSolo { track, soloed })
    }

    // ---- patterns / clips / lanes ----

    pub fn upsert_pattern(&mut self, pattern: Pattern) -> EngineResult<()> {
        match self.model.patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(slot) => *slot = pattern.clone(),
            None => self.model.patterns.push(pattern.clone()),
        }
        self.sender
            .send(ControlMsg::UpsertPattern(Box::new(pattern)))
    }

    pub fn add_clip(&mut self, clip: Clip) -> EngineResult<ClipId> {
        let min_len = 1.0 / self.model.config.steps_per_beat as f64;
        let id = self.model.arrangement.add_clip(clip, min_len)?;
        self.sender.send(ControlMsg::AddClip(clip))?;
        Ok(id)
    }

    pub fn remove_clip(&mut self, id: ClipId) -> EngineResult<()> {
        self.model.arrangement.remove_clip(id);
        self.sender.send(ControlMsg::RemoveClip(id))
    }

    pub fn upsert_lane(&mut self, lane: AutomationLane) -> EngineResult<()> {
        match self.model.lanes.iter_mut().find(|l| l.id == lane.id) {
            Some(slot) => *slot = lane.clone(),
            None => self.model.lanes.push(lane.clone()),
        }
        self.sender.send(ControlMsg::UpsertLane(Box::new(lane)))
    }

    // ---- samples ----

    pub fn load_sample(&mut self, track: TrackId, buffer: SampleBuffer) -> EngineResult<()> {
        let buffer = Arc::new(buffer);
        self.model.samples.insert(track, buffer.clone());
        self.sender.send(ControlMsg::LoadSample { track, buffer })
    }

    // ---- inserts ----

    /// Build an effect control-side and hand it to the audio thread.
    pub fn add_effect(
        &mut self,
        addr: StripAddr,
        kind: EffectKind,
        position: Option<usize>,
    ) -> EngineResult<usize> {
        let sample_rate = self.model.config.sample_rate.as_f64();
        let seed = self.model.seed;
        let config = self
            .model
            .strip_config_mut(addr)
            .ok_or(EngineError::InvalidState("no such strip"))?;
        if config.inserts.len() >= MAX_INSERT_SLOTS {
            return Err(EngineError::CapacityExceeded("insert slots"));
        }
        let position = position
            .unwrap_or(config.inserts.len())
            .min(config.inserts.len());
        let slot = EffectSlot::new(build_effect(kind, sample_rate, seed));
        config.inserts.insert(
            position,
            InsertConfig {
                position,
                kind,
                enabled: true,
                bypass: false,
                params: Vec::new(),
            },
        );
        renumber(&mut config.inserts);
        self.sender.send(ControlMsg::LoadEffect {
            addr,
            position: Some(position),
            slot: Box::new(slot),
        })?;
        Ok(position)
    }

    pub fn remove_effect(&mut self, addr: StripAddr, position: usize) -> EngineResult<()> {
        if let Some(config) = self.model.strip_config_mut(addr) {
            if position < config.inserts.len() {
                config.inserts.remove(position);
                renumber(&mut config.inserts);
            }
        }
        self.sender.send(ControlMsg::RemoveEffect { addr, position })
    }

    pub fn reorder_effect(&mut self, addr: StripAddr, from: usize, to: usize) -> EngineResult<()> {
        if let Some(config) = self.model.strip_config_mut(addr) {
            if from < config.inserts.len() && to < config.inserts.len() {
                let insert = config.inserts.remove(from);
                config.inserts.insert(to, insert);
                renumber(&mut config.inserts);
            }
        }
        self.sender.send(ControlMsg::ReorderEffect { addr, from, to })
    }

    pub fn set_effect_bypass(
        &mut self,
        addr: StripAddr,
        position: usize,
        bypass: bool,
    ) -> EngineResult<()> {
        if let Some(config) = self.model.strip_config_mut(addr) {
            if let Some(insert) = config.inserts.get_mut(position) {
                insert.bypass = bypass;
            }
        }
        self.sender.send(ControlMsg::SetEffectBypass {
            addr,
            position,
            bypass,
        })
    }

    pub fn set_chain_bypass(&mut self, addr: StripAddr, bypass: bool) -> EngineResult<()> {
        self.sender.send(ControlMsg::SetChainBypass { addr, bypass })
    }

    pub fn set_effect_param(
        &mut self,
        addr: StripAddr,
        position: usize,
        param: usize,
        value: f64,
    ) -> EngineResult<()> {
        if let Some(config) = self.model.strip_config_mut(addr) {
            if let Some(insert) = config.inserts.get_mut(position) {
                if insert.params.len() <= param {
                    insert.params.resize(param + 1, 0.0);
                }
                insert.params[param] = value;
            }
        }
        self.sender.send(ControlMsg::SetEffectParam {
            addr,
            position,
            param,
            value,
        })
    }

    // ---- EQ ----

    pub fn eq_add_band(&mut self, addr: StripAddr, config: EqBandConfig) -> EngineResult<usize> {
        let strip = self
            .model
            .strip_config_mut(addr)
            .ok_or(EngineError::InvalidState("no such strip"))?;
        if strip.eq.bands.len() >= MAX_EQ_BANDS {
            return Err(EngineError::CapacityExceeded("eq bands"));
        }
        strip.eq.bands.push(config);
        let index = strip.eq.bands.len() - 1;
        self.sender.send(ControlMsg::EqAddBand { addr, config })?;
        Ok(index)
    }

    pub fn eq_remove_band(&mut self, addr: StripAddr, index: usize) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            if index < strip.eq.bands.len() {
                strip.eq.bands.remove(index);
            }
        }
        self.sender.send(ControlMsg::EqRemoveBand { addr, index })
    }

    pub fn eq_set_band(
        &mut self,
        addr: StripAddr,
        index: usize,
        change: EqBandChange,
    ) -> EngineResult<()> {
        let mut clamped = None;
        if let Some(strip) = self.model.strip_config_mut(addr) {
            if let Some(band) = strip.eq.bands.get_mut(index) {
                match change {
                    EqBandChange::Kind(kind) => band.kind = kind,
                    EqBandChange::Frequency(f) => {
                        band.frequency = f.clamp(10.0, 48_000.0);
                        clamped = Some((f, band.frequency));
                    }
                    EqBandChange::GainDb(g) => {
                        band.gain_db = g.clamp(-60.0, 60.0);
                        clamped = Some((g, band.gain_db));
                    }
                    EqBandChange::Q(q) => {
                        band.q = q.clamp(0.01, 100.0);
                        band.bandwidth_hz = None;
                        clamped = Some((q, band.q));
                    }
                    EqBandChange::BandwidthHz(bw) => band.bandwidth_hz = Some(bw),
                    EqBandChange::SlopeDbPerOct(s) => {
                        band.slope_db_per_oct = s.clamp(0.1, 48.0);
                        clamped = Some((s, band.slope_db_per_oct));
                    }
                    EqBandChange::Enabled(enabled) => band.enabled = enabled,
                }
            }
        }
        if let Some((sent, applied)) = clamped {
            self.note_clamp(sent, applied);
        }
        self.sender.send(ControlMsg::EqSetBand {
            addr,
            index,
            change,
        })
    }

    pub fn eq_set_mode(&mut self, addr: StripAddr, mode: EqMode) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.eq.mode = mode;
        }
        self.sender.send(ControlMsg::EqSetMode { addr, mode })
    }

    pub fn eq_set_enabled(&mut self, addr: StripAddr, enabled: bool) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.eq.enabled = enabled;
        }
        self.sender.send(ControlMsg::EqSetEnabled { addr, enabled })
    }

    pub fn eq_set_dry_wet(&mut self, addr: StripAddr, mix: f64) -> EngineResult<()> {
        let applied = self.note_clamp(mix, mix.clamp(0.0, 1.0));
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.eq.dry_wet = applied;
        }
        self.sender.send(ControlMsg::EqSetDryWet { addr, mix })
    }

    pub fn eq_set_character(
        &mut self,
        addr: StripAddr,
        amount: f64,
        drive_db: f64,
    ) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.eq.character_amount = amount.clamp(0.0, 1.0);
        }
        self.sender.send(ControlMsg::EqSetCharacter {
            addr,
            amount,
            drive_db,
        })
    }

    // ---- compressor ----

    pub fn set_compressor(
        &mut self,
        addr: StripAddr,
        config: CompressorConfig,
    ) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.compressor = config;
        }
        self.sender.send(ControlMsg::SetCompressor { addr, config })
    }

    pub fn set_compressor_enabled(&mut self, addr: StripAddr, enabled: bool) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.compressor_enabled = enabled;
        }
        self.sender
            .send(ControlMsg::SetCompressorEnabled { addr, enabled })
    }

    // ---- strip gains ----

    pub fn set_pre_gain_db(&mut self, addr: StripAddr, db: f64) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.mixer.pre_gain_db = db;
        }
        self.sender.send(ControlMsg::SetPreGainDb { addr, db })
    }

    pub fn set_post_gain_db(&mut self, addr: StripAddr, db: f64) -> EngineResult<()> {
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.mixer.post_gain_db = db;
        }
        self.sender.send(ControlMsg::SetPostGainDb { addr, db })
    }

    pub fn set_pan(&mut self, addr: StripAddr, pan: f64) -> EngineResult<()> {
        let applied = self.note_clamp(pan, pan.clamp(-1.0, 1.0));
        if let Some(strip) = self.model.strip_config_mut(addr) {
            strip.mixer.pan = applied;
        }
        if let StripAddr::Track(id) = addr {
            if let Some(track) = self.model.track_mut(id) {
                track.params.pan = applied as f32;
            }
        }
        self.sender.send(ControlMsg::SetPan { addr, pan })
    }

    pub fn set_send_level(&mut self, addr: StripAddr, bus: BusId, level: f64) -> EngineResult<()> {
        let applied = self.note_clamp(level, level.clamp(0.0, 1.0)) as f32;
        if let Some(strip) = self.model.strip_config_mut(addr) {
            match strip.mixer.sends.iter_mut().find(|s| s.bus == bus) {
                Some(send) => send.level = applied,
                None => strip.mixer.sends.push(bb_core::SendLevel {
                    bus,
                    level: applied,
                }),
            }
        }
        if let StripAddr::Track(id) = addr {
            if let Some(track) = self.model.track_mut(id) {
                match track.params.sends.iter_mut().find(|s| s.bus == bus) {
                    Some(send) => send.level = applied,
                    None => track.params.sends.push(bb_core::SendLevel {
                        bus,
                        level: applied,
                    }),
                }
            }
        }
        self.sender.send(ControlMsg::SetSendLevel { addr, bus, level })
    }

    // ---- buses ----

    /// Create a bus routed to the master and hand its node to the engine.
    pub fn add_bus(&mut self, name: &str) -> EngineResult<BusId> {
        let def = BusDef::new(name);
        let id = def.id;
        let node = BusNode::new(&def, self.model.config.block_len);
        self.model.buses.push(def);
        self.model
            .strips
            .push((StripAddr::Bus(id), StripConfig::default()));
        self.sender.send(ControlMsg::AddBus(Box::new(node)))?;
        Ok(id)
    }

    /// Route one bus into another. Cycle rejection happens here against the
    /// model before anything is sent; the audio thread re-verifies.
    pub fn connect_bus(&mut self, from: BusId, to: BusId) -> EngineResult<()> {
        if from == MASTER_BUS_ID {
            return Err(EngineError::InvalidState("master output is fixed"));
        }
        if self.would_cycle(from, to) {
            return Err(EngineError::GraphCycle);
        }
        if let Some(def) = self.model.buses.iter_mut().find(|b| b.id == from) {
            def.output_to = to;
        } else {
            return Err(EngineError::InvalidState("unknown source bus"));
        }
        self.sender.send(ControlMsg::ConnectBus { from, to })
    }

    pub fn set_bus_gains(&mut self, bus: BusId, input_db: f64, output_db: f64) -> EngineResult<()> {
        if let Some(def) = self.model.buses.iter_mut().find(|b| b.id == bus) {
            def.input_gain_db = input_db;
            def.output_gain_db = output_db;
        } else {
            return Err(EngineError::InvalidState("unknown bus"));
        }
        self.sender.send(ControlMsg::SetBusGains {
            bus,
            input_db,
            output_db,
        })
    }

    fn would_cycle(&self, from: BusId, to: BusId) -> bool {
        // Walk downstream from `to`; reaching `from` again closes a loop
        let mut current = to;
        for _ in 0..self.model.buses.len() + 1 {
            if current == from {
                return true;
            }
            if current == MASTER_BUS_ID {
                return false;
            }
            match self.model.buses.iter().find(|b| b.id == current) {
                Some(def) => current = def.output_to,
                None => return false,
            }
        }
        true
    }

    // ---- meters / polling ----

    /// Drain the reverse ring: update meter readings and drop reclaimed
    /// objects on this thread.
    pub fn poll(&mut self) -> &MeterReadings {
        while let Ok(msg) = self.reverse_rx.pop() {
            match msg {
                ReverseMsg::Meters(frame) => self.readings.master = frame,
                ReverseMsg::Track(meters) => self.readings.update_track(meters),
                ReverseMsg::Garbage(garbage) => drop(garbage),
                ReverseMsg::Dropped { count } => {
                    self.readings.dropped += count as u64;
                    log::warn!("audio thread dropped {count} reverse messages");
                }
            }
        }
        &self.readings
    }

    // ---- persistence ----

    /// Emit the persisted-state snapshot with deterministic ordering.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut tracks: Vec<TrackSnapshot> = self
            .model
            .tracks
            .iter()
            .map(|track| {
                let strip = self
                    .model
                    .strip_config(StripAddr::Track(track.id))
                    .cloned()
                    .unwrap_or_default();
                let mut mixer = strip.mixer;
                mixer.muted = track.muted;
                mixer.soloed = track.soloed;
                TrackSnapshot {
                    id: track.id,
                    name: track.name.clone(),
                    kind: track.kind,
                    color: track.color,
                    params: track.params.clone(),
                    mixer,
                    eq: strip.eq,
                    compressor_enabled: strip.compressor_enabled,
                    compressor: strip.compressor,
                    inserts: strip.inserts,
                }
            })
            .collect();
        tracks.sort_by_key(|t| t.id);

        let mut snapshot = SessionSnapshot {
            bpm: self.model.bpm,
            sample_rate: self.model.config.sample_rate.as_u32(),
            arrangement_length_beats: self.model.arrangement.length_beats,
            tracks,
            buses: self.model.buses.clone(),
            loop_region: self.model.loop_region,
        };
        snapshot.normalize();
        snapshot
    }
}

/// Re-number insert positions after an edit so they stay dense
fn renumber(inserts: &mut [InsertConfig]) {
    for (i, config) in inserts.iter_mut().enumerate() {
        config.position = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_session_has_master_bus() {
        let s = session();
        assert_eq!(s.buses.len(), 1);
        assert_eq!(s.buses[0].id, MASTER_BUS_ID);
        assert!(s.strip_config(StripAddr::Bus(MASTER_BUS_ID)).is_some());
    }

    #[test]
    fn test_spawn_round_trip() {
        let mut s = session();
        let track = s.add_track("lead", TrackKind::Synth);
        let (engine, handle) = s.spawn().unwrap();
        assert_eq!(engine.block_len(), 512);
        let snap = handle.snapshot();
        assert_eq!(snap.tracks.len(), 1);
        assert_eq!(snap.tracks[0].id, track);
    }

    #[test]
    fn test_strip_state_survives_in_model() {
        // Whatever the handle sends is also in the model, so a later
        // offline render reproduces the live strips.
        let mut s = session();
        let track = s.add_track("t", TrackKind::Synth);
        let (_engine, mut handle) = s.spawn().unwrap();
        let addr = StripAddr::Track(track);
        handle.eq_add_band(addr, EqBandConfig::default()).unwrap();
        handle.eq_set_enabled(addr, true).unwrap();
        handle.add_effect(addr, EffectKind::Delay, None).unwrap();
        handle.set_compressor_enabled(addr, true).unwrap();

        let config = handle.model().strip_config(addr).unwrap();
        assert_eq!(config.eq.bands.len(), 1);
        assert!(config.eq.enabled);
        assert_eq!(config.inserts.len(), 1);
        assert!(config.compressor_enabled);
    }

    #[test]
    fn test_connect_bus_cycle_rejected_control_side() {
        let mut s = session();
        s.add_track("t", TrackKind::Synth);
        let (_engine, mut handle) = s.spawn().unwrap();
        let a = handle.add_bus("a").unwrap();
        let b = handle.add_bus("b").unwrap();
        handle.connect_bus(a, b).unwrap();
        assert!(matches!(
            handle.connect_bus(b, a),
            Err(EngineError::GraphCycle)
        ));
        assert!(matches!(
            handle.connect_bus(MASTER_BUS_ID, a),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_eq_capacity_enforced_on_handle() {
        let mut s = session();
        let track = s.add_track("t", TrackKind::Synth);
        let (_engine, mut handle) = s.spawn().unwrap();
        let addr = StripAddr::Track(track);
        for _ in 0..MAX_EQ_BANDS {
            handle.eq_add_band(addr, EqBandConfig::default()).unwrap();
        }
        assert!(matches!(
            handle.eq_add_band(addr, EqBandConfig::default()),
            Err(EngineError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_insert_capacity_enforced_on_handle() {
        let mut s = session();
        let track = s.add_track("t", TrackKind::Synth);
        let (_engine, mut handle) = s.spawn().unwrap();
        let addr = StripAddr::Track(track);
        for _ in 0..MAX_INSERT_SLOTS {
            handle.add_effect(addr, EffectKind::Delay, None).unwrap();
        }
        assert!(matches!(
            handle.add_effect(addr, EffectKind::Delay, None),
            Err(EngineError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_advisory_counts_clamped_writes() {
        let mut s = session();
        let track = s.add_track("t", TrackKind::Synth);
        let (_engine, mut handle) = s.spawn().unwrap();
        assert_eq!(handle.take_advisory(), 0);
        handle.set_pan(StripAddr::Track(track), 3.0).unwrap();
        handle.set_bpm(10_000.0).unwrap();
        assert_eq!(handle.take_advisory(), 2);
        assert_eq!(handle.take_advisory(), 0);
        // In-range writes do not trip the advisory
        handle.set_pan(StripAddr::Track(track), 0.5).unwrap();
        assert_eq!(handle.take_advisory(), 0);
    }

    #[test]
    fn test_snapshot_deterministic_ordering() {
        let mut s = session();
        s.add_track("b", TrackKind::Synth);
        s.add_track("a", TrackKind::Drum);
        let first = s.tracks[0].id;
        let (_engine, mut handle) = s.spawn().unwrap();
        handle.set_track_mute(first, true).unwrap();
        let snap1 = handle.snapshot();
        let snap2 = handle.snapshot();
        assert_eq!(snap1, snap2);
        assert!(snap1.tracks.windows(2).all(|w| w[0].id < w[1].id));
    }
}
