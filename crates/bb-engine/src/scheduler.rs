//! Real-time scheduler
//!
//! The single driver of the audio clock. Each pull: drain the control ring
//! under a message budget and apply graph mutations, ask the sequencer for
//! this block's events (split at the loop wrap), dispatch them in timestamp
//! order between segmented voice renders, run every track strip, sum buses,
//! run the master chain, and publish meters. This path never allocates,
//! never locks, and never raises: rogue DSP values are clamped and counted.

use std::sync::Arc;

use rtrb::{Consumer, Producer};

use bb_core::{AutomationLane, EqMode, MASTER_BUS_ID, ParamTarget, Sample, SessionConfig, Track,
    TrackId, TrackKind, TrackParams};
use bb_core::Arrangement;
use bb_dsp::{EqStack, LufsMeter};
use bb_seq::{Event, EventKind, PatternBank, Sequencer, TransportState};
use bb_synth::voice::VoiceParams;
use bb_synth::{SampleBuffer, SamplePlayer, VoicePool};

use crate::graph::{BusGraph, BusNode};
use crate::insert::InsertChain;
use crate::messages::{ControlMsg, EqBandChange, Garbage, MeterFrame, ReverseMsg, StripAddr,
    TrackMeters, TransportCmd};
use crate::strip::TrackStrip;

/// Control messages applied per block before anything else
const DRAIN_BUDGET: usize = 256;

/// Sample playback heads per track
const PLAYERS_PER_TRACK: usize = 8;

/// One track's audio-side state: parameters, playback sources, and strip
pub struct TrackProcessor {
    pub id: TrackId,
    pub kind: TrackKind,
    pub muted: bool,
    pub soloed: bool,
    params: TrackParams,
    voice_params: VoiceParams,
    pub strip: TrackStrip,
    players: Vec<SamplePlayer>,
    next_player: usize,
    sample: Option<Arc<SampleBuffer>>,
    buf_l: Vec<Sample>,
    buf_r: Vec<Sample>,
}

impl TrackProcessor {
    /// Built on the control thread; crosses to the audio thread boxed.
    pub fn new(track: &Track, config: &SessionConfig) -> Self {
        let sample_rate = config.sample_rate.as_f64();
        let mut strip = TrackStrip::new(sample_rate, config.block_len, config.default_eq_fft_size);
        strip.set_fader(track.params.volume as f64);
        strip.set_pan(track.params.pan as f64);
        strip.set_muted(track.muted);
        for send in &track.params.sends {
            strip.set_send(send.bus, send.level as f64);
        }
        Self {
            id: track.id,
            kind: track.kind,
            muted: track.muted,
            soloed: track.soloed,
            voice_params: VoiceParams::from(&track.params),
            params: track.params.clone(),
            strip,
            players: (0..PLAYERS_PER_TRACK)
                .map(|_| SamplePlayer::new(sample_rate))
                .collect(),
            next_player: 0,
            sample: None,
            buf_l: vec![0.0; config.block_len],
            buf_r: vec![0.0; config.block_len],
        }
    }

    pub fn params(&self) -> &TrackParams {
        &self.params
    }

    pub fn voice_params(&self) -> &VoiceParams {
        &self.voice_params
    }

    fn set_params(&mut self, params: TrackParams) -> TrackParams {
        let old = std::mem::replace(&mut self.params, params);
        self.voice_params = VoiceParams::from(&self.params);
        self.strip.set_fader(self.params.volume as f64);
        self.strip.set_pan(self.params.pan as f64);
        for send in &self.params.sends {
            self.strip.set_send(send.bus, send.level as f64);
        }
        old
    }

    pub fn set_sample(&mut self, buffer: Arc<SampleBuffer>) -> Option<Arc<SampleBuffer>> {
        for player in &mut self.players {
            player.kill();
            player.set_buffer(buffer.clone());
        }
        self.sample.replace(buffer)
    }

    /// Trigger the next free playback head; steals round-robin when all run
    fn trigger_sample(&mut self, note: u8, velocity: f64) {
        if self.sample.is_none() {
            return;
        }
        let idx = self
            .players
            .iter()
            .position(|p| !p.is_active())
            .unwrap_or_else(|| {
                let idx = self.next_player;
                self.next_player = (self.next_player + 1) % self.players.len();
                idx
            });
        let player = &mut self.players[idx];
        player.set_rate(2.0_f64.powf((note as f64 - 60.0) / 12.0));
        player.trigger(velocity);
    }

    fn render_players(&mut self, from: usize, to: usize) {
        // Split borrow so players can write into this track's buffers
        let Self {
            players,
            buf_l,
            buf_r,
            ..
        } = self;
        for player in players.iter_mut() {
            player.render(buf_l, buf_r, from, to);
        }
    }
}

/// The audio-thread engine
pub struct AudioEngine {
    config: SessionConfig,
    sequencer: Sequencer,
    arrangement: Arrangement,
    patterns: PatternBank,
    lanes: Vec<AutomationLane>,
    pool: VoicePool,
    tracks: Vec<TrackProcessor>,
    graph: BusGraph,
    master: TrackStrip,
    lufs: LufsMeter,
    control_rx: Consumer<ControlMsg>,
    reverse_tx: Producer<ReverseMsg>,
    events: Vec<Event>,
    clamp_count: u32,
    dropped: u32,
    any_solo: bool,
}

#[allow(clippy::too_many_arguments)]
impl AudioEngine {
    pub(crate) fn new(
        config: SessionConfig,
        sequencer: Sequencer,
        arrangement: Arrangement,
        patterns: PatternBank,
        lanes: Vec<AutomationLane>,
        tracks: Vec<TrackProcessor>,
        graph: BusGraph,
        master: TrackStrip,
        control_rx: Consumer<ControlMsg>,
        reverse_tx: Producer<ReverseMsg>,
    ) -> Self {
        let sample_rate = config.sample_rate.as_f64();
        let any_solo = tracks.iter().any(|t| t.soloed);
        Self {
            pool: VoicePool::new(config.voice_pool_size, sample_rate),
            lufs: LufsMeter::new(sample_rate),
            events: Vec::with_capacity(1024),
            clamp_count: 0,
            dropped: 0,
            any_solo,
            config,
            sequencer,
            arrangement,
            patterns,
            lanes,
            tracks,
            graph,
            master,
            control_rx,
            reverse_tx,
        }
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn block_len(&self) -> usize {
        self.config.block_len
    }

    pub fn transport_state(&self) -> TransportState {
        self.sequencer.state()
    }

    pub fn position_beats(&self) -> f64 {
        self.sequencer.position_beats()
    }

    /// Direct transport access for same-thread drivers (offline render)
    pub fn play(&mut self) {
        self.sequencer.play();
    }

    pub fn stop(&mut self) {
        self.sequencer.stop();
        self.pool.all_notes_off();
    }

    pub fn seek(&mut self, beats: f64) {
        self.sequencer.seek(beats);
        self.pool.kill_all();
    }

    pub fn lufs_integrated(&self) -> f64 {
        self.lufs.integrated()
    }

    /// Render one block of interleaved stereo f32 into `out`; `out.len()`
    /// must be `2 * block_len`.
    pub fn process(&mut self, out: &mut [f32]) {
        let block = self.config.block_len;
        debug_assert_eq!(out.len(), 2 * block);

        // 1. Control plane first, so "set BPM then play" lands this block
        self.drain_control();

        // 2. Sequencer events, loop-split so offsets stay in-block
        let bpm = self.sequencer.time().bpm();
        let sample_rate = self.config.sample_rate.as_f64();
        self.pool.set_tempo(bpm, sample_rate);
        let mut events = std::mem::take(&mut self.events);
        self.sequencer.next_events(
            block,
            &self.arrangement,
            &self.patterns,
            &self.lanes,
            &mut events,
        );

        // 3. Segmented dispatch: render voices up to each event, apply it,
        // continue. Note-offs sort before note-ons at equal offsets.
        for track in &mut self.tracks {
            track.buf_l.fill(0.0);
            track.buf_r.fill(0.0);
        }
        let mut cursor = 0usize;
        for i in 0..events.len() {
            let event = events[i];
            let offset = event.offset.min(block);
            if offset > cursor {
                self.render_sources(cursor, offset);
                cursor = offset;
            }
            self.apply_event(&event);
        }
        if cursor < block {
            self.render_sources(cursor, block);
        }
        events.clear();
        self.events = events;

        // 4. Strips and sends, then bus summing
        self.graph.clear_inputs();
        let any_solo = self.any_solo;
        let Self { tracks, graph, .. } = self;
        for track in tracks.iter_mut() {
            let audible = !track.muted && (!any_solo || track.soloed);
            let TrackProcessor {
                strip, buf_l, buf_r, ..
            } = track;
            strip.process(buf_l, buf_r, audible, &mut |bus, level, sl, sr| {
                graph.add_to_input(bus, level, sl, sr);
            });
            graph.add_to_input(MASTER_BUS_ID, 1.0, buf_l, buf_r);
        }
        self.graph.process();

        // 5. Master chain, metering, interleaved output
        let (master_l, master_r) = self.graph.master_input();
        self.master
            .process(master_l, master_r, true, &mut |_, _, _, _| {});
        let mut clamped = 0u32;
        for i in 0..block {
            let l = master_l[i];
            let r = master_r[i];
            let (l, r) = if l.is_finite() && r.is_finite() {
                (l, r)
            } else {
                clamped += 1;
                (0.0, 0.0)
            };
            master_l[i] = l;
            master_r[i] = r;
            out[2 * i] = l as f32;
            out[2 * i + 1] = r as f32;
        }
        self.clamp_count = self.clamp_count.wrapping_add(clamped);
        self.lufs.process_block(master_l, master_r);

        // 6. Advance and publish
        self.pool.advance_clock(block as u64);
        self.publish_meters();
    }

    fn render_sources(&mut self, from: usize, to: usize) {
        for track in &mut self.tracks {
            match track.kind {
                TrackKind::Synth => {
                    self.pool
                        .render_track(track.id, &mut track.buf_l, &mut track.buf_r, from, to);
                }
                TrackKind::Drum | TrackKind::Sample => {
                    track.render_players(from, to);
                }
                TrackKind::Bus => {}
            }
        }
    }

    fn apply_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::NoteOn {
                track: track_id,
                note,
                velocity,
            } => {
                if let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) {
                    match track.kind {
                        TrackKind::Synth => {
                            self.pool
                                .note_on(track_id, note, velocity, &track.voice_params);
                        }
                        TrackKind::Drum | TrackKind::Sample => {
                            track.trigger_sample(note, velocity);
                        }
                        TrackKind::Bus => {}
                    }
                }
            }
            EventKind::NoteOff {
                track: track_id,
                note,
            } => {
                if let Some(track) = self.tracks.iter().find(|t| t.id == track_id) {
                    if track.kind == TrackKind::Synth {
                        self.pool.note_off(track_id, note);
                    }
                }
            }
            EventKind::Automation { target, value } => {
                self.apply_param(target, value);
            }
        }
    }

    fn apply_param(&mut self, target: ParamTarget, value: f64) {
        match target {
            ParamTarget::TrackVolume(id) => {
                if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
                    track.params.volume = value.clamp(0.0, 1.0) as f32;
                    track.strip.set_fader(value);
                }
            }
            ParamTarget::TrackPan(id) => {
                if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
                    track.params.pan = value.clamp(-1.0, 1.0) as f32;
                    track.strip.set_pan(value);
                }
            }
            ParamTarget::TrackCutoff(id) => {
                if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
                    track.params.filter.cutoff_hz = value.clamp(20.0, 20000.0);
                    track.voice_params = VoiceParams::from(&track.params);
                }
            }
            ParamTarget::SendLevel(id, bus) => {
                if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
                    track.strip.set_send(bus, value);
                }
            }
        }
    }

    fn drain_control(&mut self) {
        for _ in 0..DRAIN_BUDGET {
            let Ok(msg) = self.control_rx.pop() else {
                break;
            };
            self.apply_msg(msg);
        }
    }

    /// Full strips exist on tracks and the master; plain buses only carry
    /// an insert chain, addressed through [`Self::chain_mut`].
    fn strip_mut(&mut self, addr: StripAddr) -> Option<&mut TrackStrip> {
        match addr {
            StripAddr::Track(id) => self
                .tracks
                .iter_mut()
                .find(|t| t.id == id)
                .map(|t| &mut t.strip),
            StripAddr::Bus(id) if id == MASTER_BUS_ID => Some(&mut self.master),
            StripAddr::Bus(_) => None,
        }
    }

    fn chain_mut(&mut self, addr: StripAddr) -> Option<&mut InsertChain> {
        match addr {
            StripAddr::Track(id) => self
                .tracks
                .iter_mut()
                .find(|t| t.id == id)
                .map(|t| &mut t.strip.inserts),
            StripAddr::Bus(id) if id == MASTER_BUS_ID => Some(&mut self.master.inserts),
            StripAddr::Bus(id) => self.graph.node_mut(id).map(|n| &mut n.chain),
        }
    }

    /// Push displaced objects back for control-side dropping. A full ring
    /// forces an in-place drop, which is counted.
    fn discard(&mut self, garbage: Garbage) {
        if self.reverse_tx.push(ReverseMsg::Garbage(garbage)).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
        }
    }

    fn apply_msg(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Transport(cmd) => match cmd {
                TransportCmd::Play => self.play(),
                TransportCmd::Stop => self.stop(),
                TransportCmd::Seek(beats) => self.seek(beats),
                TransportCmd::SetBpm(bpm) => {
                    self.sequencer.set_bpm(bpm);
                }
                TransportCmd::SetLoop {
                    start_beat,
                    end_beat,
                    enabled,
                } => {
                    let _ = self.sequencer.set_loop(start_beat, end_beat, enabled);
                }
                TransportCmd::ClearLoop => self.sequencer.clear_loop(),
            },
            ControlMsg::NoteOn {
                track,
                note,
                velocity,
            } => {
                self.apply_event(&Event {
                    offset: 0,
                    kind: EventKind::NoteOn {
                        track,
                        note,
                        velocity,
                    },
                });
            }
            ControlMsg::NoteOff { track, note } => {
                self.apply_event(&Event {
                    offset: 0,
                    kind: EventKind::NoteOff { track, note },
                });
            }
            ControlMsg::SetParam { target, value } => self.apply_param(target, value),

            ControlMsg::AddTrack(track) => {
                self.tracks.push(*track);
                self.update_solo();
            }
            ControlMsg::RemoveTrack(id) => {
                if let Some(idx) = self.tracks.iter().position(|t| t.id == id) {
                    let track = self.tracks.remove(idx);
                    self.discard(Garbage::Track(Box::new(track)));
                    self.update_solo();
                }
            }
            ControlMsg::SetTrackParams { track, params } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    let old = t.set_params(*params);
                    self.discard(Garbage::Params(Box::new(old)));
                }
            }
            ControlMsg::SetTrackMute { track, muted } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    t.muted = muted;
                    t.strip.set_muted(muted);
                }
            }
            ControlMsg::SetTrackSolo { track, soloed } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    t.soloed = soloed;
                }
                self.update_solo();
            }

            ControlMsg::UpsertPattern(pattern) => {
                if let Some(old) = self.patterns.upsert(*pattern) {
                    self.discard(Garbage::Pattern(old));
                }
            }
            ControlMsg::RemovePattern(id) => {
                if let Some(old) = self.patterns.remove(id) {
                    self.discard(Garbage::Pattern(old));
                }
            }
            ControlMsg::AddClip(clip) => {
                let min_len = self.sequencer.time().step_beats();
                let _ = self.arrangement.add_clip(clip, min_len);
            }
            ControlMsg::RemoveClip(id) => {
                self.arrangement.remove_clip(id);
            }
            ControlMsg::UpsertLane(lane) => {
                match self.lanes.iter_mut().position(|l| l.id == lane.id) {
                    Some(idx) => {
                        let old = std::mem::replace(&mut self.lanes[idx], *lane);
                        self.discard(Garbage::Lane(old));
                    }
                    None => self.lanes.push(*lane),
                }
            }
            ControlMsg::RemoveLane(id) => {
                if let Some(idx) = self.lanes.iter().position(|l| l.id == id) {
                    let old = self.lanes.swap_remove(idx);
                    self.discard(Garbage::Lane(old));
                }
            }

            ControlMsg::LoadSample { track, buffer } => {
                if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track) {
                    if let Some(old) = t.set_sample(buffer) {
                        self.discard(Garbage::Buffer(old));
                    }
                }
            }

            ControlMsg::LoadEffect {
                addr,
                position,
                slot,
            } => {
                let full = match self.chain_mut(addr) {
                    Some(chain) if chain.len() < bb_core::MAX_INSERT_SLOTS => {
                        let _ = chain.add(*slot, position);
                        None
                    }
                    _ => Some(slot),
                };
                if let Some(slot) = full {
                    // Chain full or no such strip; the slot goes straight back
                    self.discard(Garbage::Effect(slot));
                }
            }
            ControlMsg::RemoveEffect { addr, position } => {
                let removed = self
                    .chain_mut(addr)
                    .and_then(|chain| chain.remove(position));
                if let Some(slot) = removed {
                    self.discard(Garbage::Effect(Box::new(slot)));
                }
            }
            ControlMsg::ReorderEffect { addr, from, to } => {
                if let Some(chain) = self.chain_mut(addr) {
                    let _ = chain.reorder(from, to);
                }
            }
            ControlMsg::SetEffectBypass {
                addr,
                position,
                bypass,
            } => {
                if let Some(chain) = self.chain_mut(addr) {
                    chain.set_bypass(position, bypass);
                }
            }
            ControlMsg::SetChainBypass { addr, bypass } => {
                if let Some(chain) = self.chain_mut(addr) {
                    chain.set_chain_bypass(bypass);
                }
            }
            ControlMsg::SetEffectParam {
                addr,
                position,
                param,
                value,
            } => {
                if let Some(chain) = self.chain_mut(addr) {
                    chain.set_param(position, param, value);
                }
            }

            ControlMsg::EqAddBand { addr, config } => {
                if let Some(strip) = self.strip_mut(addr) {
                    let _ = strip.eq.add_band(config);
                }
            }
            ControlMsg::EqRemoveBand { addr, index } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.eq.remove_band(index);
                }
            }
            ControlMsg::EqReorderBand { addr, from, to } => {
                if let Some(strip) = self.strip_mut(addr) {
                    let _ = strip.eq.reorder_band(from, to);
                }
            }
            ControlMsg::EqSetBand {
                addr,
                index,
                change,
            } => {
                if let Some(strip) = self.strip_mut(addr) {
                    if let Some(band) = strip.eq.band_mut(index) {
                        let _ = match change {
                            EqBandChange::Kind(kind) => {
                                band.set_kind(kind);
                                Ok(())
                            }
                            EqBandChange::Frequency(f) => band.set_frequency(f),
                            EqBandChange::GainDb(g) => band.set_gain_db(g),
                            EqBandChange::Q(q) => band.set_q(q),
                            EqBandChange::BandwidthHz(bw) => band.set_bandwidth(bw),
                            EqBandChange::SlopeDbPerOct(s) => band.set_slope(s),
                            EqBandChange::Enabled(enabled) => {
                                band.set_enabled(enabled);
                                Ok(())
                            }
                        };
                    }
                }
            }
            ControlMsg::EqSetMode { addr, mode } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.eq.set_mode(mode);
                }
            }
            ControlMsg::EqSetEnabled { addr, enabled } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.eq_enabled = enabled;
                }
            }
            ControlMsg::EqSetBypass { addr, bypass } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.eq.set_bypass(bypass);
                }
            }
            ControlMsg::EqSetDryWet { addr, mix } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.eq.set_dry_wet(mix);
                }
            }
            ControlMsg::EqSetCharacter {
                addr,
                amount,
                drive_db,
            } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.eq.set_character(amount, drive_db);
                }
            }
            ControlMsg::ReplaceEq { addr, eq } => {
                if let Some(strip) = self.strip_mut(addr) {
                    let old = std::mem::replace(&mut strip.eq, *eq);
                    self.discard(Garbage::Eq(Box::new(old)));
                }
            }

            ControlMsg::SetCompressor { addr, config } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.set_compressor_config(&config);
                }
            }
            ControlMsg::SetCompressorEnabled { addr, enabled } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.compressor_enabled = enabled;
                }
            }

            ControlMsg::SetPreGainDb { addr, db } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.set_pre_gain_db(db);
                }
            }
            ControlMsg::SetPostGainDb { addr, db } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.set_post_gain_db(db);
                }
            }
            ControlMsg::SetPan { addr, pan } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.set_pan(pan);
                }
            }
            ControlMsg::SetSendLevel { addr, bus, level } => {
                if let Some(strip) = self.strip_mut(addr) {
                    strip.set_send(bus, level);
                }
            }

            ControlMsg::AddBus(node) => {
                if let Err(rejected) = self.graph.add_bus(*node) {
                    // Rejected mutation; the node goes back for dropping
                    self.discard(Garbage::Bus(Box::new(rejected)));
                }
            }
            ControlMsg::RemoveBus(id) => {
                if let Some(node) = self.graph.remove_bus(id) {
                    self.discard(Garbage::Bus(Box::new(node)));
                }
            }
            ControlMsg::ConnectBus { from, to } => {
                // The control side validated against its mirror; re-verify
                // here and silently keep the old routing on a cycle.
                let _ = self.graph.connect(from, to);
            }
            ControlMsg::SetBusGains {
                bus,
                input_db,
                output_db,
            } => {
                if let Some(node) = self.graph.node_mut(bus) {
                    node.set_gains_db(input_db, output_db);
                }
            }
        }
    }

    fn update_solo(&mut self) {
        self.any_solo = self.tracks.iter().any(|t| t.soloed);
    }

    fn publish_meters(&mut self) {
        let (peak_l, peak_r) = self.master.peak_db();
        let frame = MeterFrame {
            peak_l_db: peak_l,
            peak_r_db: peak_r,
            lufs_momentary: self.lufs.momentary(),
            lufs_short_term: self.lufs.short_term(),
            lufs_integrated: self.lufs.integrated(),
            true_peak_db: self.lufs.true_peak_db(),
            voices_active: self.pool.active_count() as u32,
            clamp_count: self.clamp_count,
        };
        if self.reverse_tx.push(ReverseMsg::Meters(frame)).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
        }
        for track in &self.tracks {
            let (peak_l, peak_r) = track.strip.peak_db();
            let (rms_l, rms_r) = track.strip.rms_db();
            let meters = TrackMeters {
                track: track.id,
                peak_l_db: peak_l,
                peak_r_db: peak_r,
                rms_l_db: rms_l,
                rms_r_db: rms_r,
                gain_reduction_db: track.strip.gain_reduction_db(),
            };
            if self.reverse_tx.push(ReverseMsg::Track(meters)).is_err() {
                self.dropped = self.dropped.wrapping_add(1);
            }
        }
        if self.dropped > 0 {
            let count = self.dropped;
            if self
                .reverse_tx
                .push(ReverseMsg::Dropped { count })
                .is_ok()
            {
                self.dropped = 0;
            }
        }
    }

    /// EQ stacks need the fixed block length; exposed for the session
    /// builder when it constructs replacement stacks.
    pub fn build_eq(&self) -> EqStack {
        EqStack::new(
            self.config.sample_rate.as_f64(),
            self.config.block_len,
            self.config.default_eq_fft_size,
        )
    }

    /// Latency the host should compensate for (master path)
    pub fn output_latency(&self) -> usize {
        let eq = if self.master.eq_enabled && self.master.eq.mode() == EqMode::LinearPhase {
            self.master.eq.latency()
        } else {
            0
        };
        eq + self.master.inserts.latency()
    }
}

impl AudioEngine {
    /// Build a replacement bus node on the control side
    pub fn make_bus_node(def: &bb_core::BusDef, config: &SessionConfig) -> BusNode {
        BusNode::new(def, config.block_len)
    }
}
