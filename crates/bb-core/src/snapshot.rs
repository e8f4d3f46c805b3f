//! Persisted-state snapshot
//!
//! The engine emits a [`SessionSnapshot`] for a host to serialize; the core
//! itself never reads or writes JSON. Ordering is deterministic: tracks by id
//! ascending, EQ bands by id ascending, insert slots by position.

use serde::{Deserialize, Serialize};

use crate::{
    BusDef, CompressorConfig, EqBandConfig, EqMode, InsertConfig, LoopRegion, SendLevel,
    TrackId, TrackKind, TrackParams,
};

/// Mixer-facing state of one track strip
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMixerState {
    pub pre_gain_db: f64,
    pub post_gain_db: f64,
    pub pan: f64,
    pub muted: bool,
    pub soloed: bool,
    pub sends: Vec<SendLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqSnapshot {
    pub enabled: bool,
    pub mode: EqMode,
    pub fft_size: usize,
    pub character_amount: f64,
    pub dry_wet: f64,
    pub bands: Vec<EqBandConfig>,
}

impl Default for EqSnapshot {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: EqMode::ZeroLatency,
            fft_size: 4096,
            character_amount: 0.0,
            dry_wet: 1.0,
            bands: Vec::new(),
        }
    }
}

/// Complete configurable state of one channel strip, the unit the host
/// persists and the session builder applies
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StripConfig {
    pub mixer: TrackMixerState,
    pub eq: EqSnapshot,
    pub compressor_enabled: bool,
    pub compressor: CompressorConfig,
    pub inserts: Vec<InsertConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub color: u32,
    pub params: TrackParams,
    pub mixer: TrackMixerState,
    pub eq: EqSnapshot,
    pub compressor_enabled: bool,
    pub compressor: CompressorConfig,
    pub inserts: Vec<InsertConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub bpm: f64,
    pub sample_rate: u32,
    pub arrangement_length_beats: f64,
    pub tracks: Vec<TrackSnapshot>,
    pub buses: Vec<BusDef>,
    pub loop_region: Option<LoopRegion>,
}

impl SessionSnapshot {
    /// Enforce the deterministic ordering contract in place.
    pub fn normalize(&mut self) {
        self.tracks.sort_by_key(|t| t.id);
        for track in &mut self.tracks {
            track.eq.bands.sort_by_key(|b| b.id);
            track.inserts.sort_by_key(|i| i.position);
        }
        self.buses.sort_by_key(|b| b.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EqBandKind;

    fn band(id: u64) -> EqBandConfig {
        EqBandConfig {
            id,
            kind: EqBandKind::Peaking,
            ..EqBandConfig::default()
        }
    }

    #[test]
    fn test_normalize_orders_deterministically() {
        let mut snap = SessionSnapshot {
            bpm: 120.0,
            sample_rate: 48000,
            arrangement_length_beats: 32.0,
            tracks: vec![
                TrackSnapshot {
                    id: 9,
                    name: "b".into(),
                    kind: TrackKind::Synth,
                    color: 0,
                    params: TrackParams::default(),
                    mixer: TrackMixerState::default(),
                    eq: EqSnapshot {
                        bands: vec![band(5), band(2)],
                        ..EqSnapshot::default()
                    },
                    compressor_enabled: false,
                    compressor: CompressorConfig::default(),
                    inserts: vec![],
                },
                TrackSnapshot {
                    id: 3,
                    name: "a".into(),
                    kind: TrackKind::Drum,
                    color: 0,
                    params: TrackParams::default(),
                    mixer: TrackMixerState::default(),
                    eq: EqSnapshot::default(),
                    compressor_enabled: false,
                    compressor: CompressorConfig::default(),
                    inserts: vec![],
                },
            ],
            buses: vec![BusDef::new("fx"), BusDef::master()],
            loop_region: None,
        };
        snap.normalize();
        assert_eq!(snap.tracks[0].id, 3);
        assert_eq!(snap.tracks[1].eq.bands[0].id, 2);
        assert_eq!(snap.buses[0].id, crate::MASTER_BUS_ID);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let mut snap = SessionSnapshot {
            bpm: 174.0,
            sample_rate: 44100,
            arrangement_length_beats: 64.0,
            tracks: vec![],
            buses: vec![BusDef::master()],
            loop_region: Some(LoopRegion::new(0.0, 8.0, true).unwrap()),
        };
        snap.normalize();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
