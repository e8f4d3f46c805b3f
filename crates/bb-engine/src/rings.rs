//! Lock-free ring endpoints between the control and audio planes

use rtrb::{Consumer, Producer, RingBuffer};

use crate::messages::{ControlMsg, MeterFrame, ReverseMsg, TrackMeters};

/// Control-ring capacity in messages
pub const CONTROL_RING_CAPACITY: usize = 1024;

/// Reverse-ring capacity in messages
pub const REVERSE_RING_CAPACITY: usize = 4096;

/// Bounded spin before a full control ring reports backpressure
const PUSH_SPIN_LIMIT: usize = 64;

pub fn control_ring() -> (Producer<ControlMsg>, Consumer<ControlMsg>) {
    RingBuffer::new(CONTROL_RING_CAPACITY)
}

pub fn reverse_ring() -> (Producer<ReverseMsg>, Consumer<ReverseMsg>) {
    RingBuffer::new(REVERSE_RING_CAPACITY)
}

/// Control-side sender with the bounded-spin backpressure contract:
/// a full ring is retried briefly, then the call fails fast with
/// [`bb_core::EngineError::Backpressure`] and the message is not sent.
pub struct ControlSender {
    producer: Producer<ControlMsg>,
}

impl ControlSender {
    pub fn new(producer: Producer<ControlMsg>) -> Self {
        Self { producer }
    }

    pub fn send(&mut self, msg: ControlMsg) -> bb_core::EngineResult<()> {
        let mut msg = msg;
        for _ in 0..PUSH_SPIN_LIMIT {
            match self.producer.push(msg) {
                Ok(()) => return Ok(()),
                Err(rtrb::PushError::Full(back)) => {
                    msg = back;
                    std::hint::spin_loop();
                }
            }
        }
        Err(bb_core::EngineError::Backpressure)
    }
}

/// Latest meter values assembled from the reverse ring; the UI polls these.
#[derive(Debug, Clone, Default)]
pub struct MeterReadings {
    pub master: MeterFrame,
    pub tracks: Vec<TrackMeters>,
    /// Total messages the audio thread reported dropping
    pub dropped: u64,
}

impl MeterReadings {
    pub fn track(&self, track: bb_core::TrackId) -> Option<&TrackMeters> {
        self.tracks.iter().find(|t| t.track == track)
    }

    pub(crate) fn update_track(&mut self, meters: TrackMeters) {
        match self.tracks.iter_mut().find(|t| t.track == meters.track) {
            Some(slot) => *slot = meters,
            None => self.tracks.push(meters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TransportCmd;

    #[test]
    fn test_send_and_receive() {
        let (tx, mut rx) = control_ring();
        let mut sender = ControlSender::new(tx);
        sender
            .send(ControlMsg::Transport(TransportCmd::Play))
            .unwrap();
        assert!(matches!(
            rx.pop(),
            Ok(ControlMsg::Transport(TransportCmd::Play))
        ));
    }

    #[test]
    fn test_backpressure_when_full() {
        let (tx, _rx) = RingBuffer::<ControlMsg>::new(2);
        let mut sender = ControlSender::new(tx);
        sender
            .send(ControlMsg::Transport(TransportCmd::Play))
            .unwrap();
        sender
            .send(ControlMsg::Transport(TransportCmd::Stop))
            .unwrap();
        let err = sender.send(ControlMsg::Transport(TransportCmd::Play));
        assert!(matches!(err, Err(bb_core::EngineError::Backpressure)));
    }

    #[test]
    fn test_meter_readings_upsert() {
        let mut readings = MeterReadings::default();
        readings.update_track(TrackMeters {
            track: 5,
            peak_l_db: -6.0,
            ..TrackMeters::default()
        });
        readings.update_track(TrackMeters {
            track: 5,
            peak_l_db: -3.0,
            ..TrackMeters::default()
        });
        assert_eq!(readings.tracks.len(), 1);
        assert_eq!(readings.track(5).unwrap().peak_l_db, -3.0);
    }
}
