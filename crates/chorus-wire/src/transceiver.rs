//! Local endpoint on the broadcast link: numbers outbound frames and
//! validates inbound ones.

use tracing::{debug, trace};

use crate::control::ControlBody;
use crate::error::CodecError;
use crate::frame::{ControlMessage, EmergentMessage, Frame};
use crate::registry::{PeerRegistry, SeqObservation};
use crate::signal::SignalWord;
use crate::vocab::{EmotionalState, EnvironmentalContext};
use crate::{Millis, NodeId};

/// A decoded frame from another node.
#[derive(Debug, Clone, PartialEq)]
pub struct Reception {
    pub frame: Frame,
    /// `None` when the registry was full and the sender is untracked.
    pub sequence: Option<SeqObservation>,
}

#[derive(Debug, Clone)]
pub struct Transceiver {
    local: NodeId,
    next_seq: u8,
    registry: PeerRegistry,
}

impl Transceiver {
    pub fn new(local: NodeId, registry: PeerRegistry) -> Self {
        Self {
            local,
            next_seq: 0,
            registry,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PeerRegistry {
        &mut self.registry
    }

    /// Sequence number the next outbound frame will carry.
    pub fn peek_seq(&self) -> u8 {
        self.next_seq
    }

    fn take_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    /// Frame a signal for broadcast.
    pub fn signal_frame(
        &mut self,
        now: Millis,
        signal: SignalWord,
        context: EnvironmentalContext,
        emotion: EmotionalState,
    ) -> EmergentMessage {
        let seq = self.take_seq();
        EmergentMessage::compose(self.local, seq, now, signal, context, emotion)
    }

    /// Frame a reply to the inbound message numbered `to_seq`.
    pub fn response_frame(
        &mut self,
        now: Millis,
        signal: SignalWord,
        context: EnvironmentalContext,
        emotion: EmotionalState,
        to_seq: u8,
    ) -> EmergentMessage {
        self.signal_frame(now, signal, context, emotion)
            .in_response_to(to_seq)
    }

    pub fn control_frame(&mut self, now: Millis, body: ControlBody) -> ControlMessage {
        ControlMessage {
            sender: self.local,
            timestamp: now,
            seq: self.take_seq(),
            body,
        }
    }

    /// Decode `bytes` and record the sender.
    ///
    /// Returns `Ok(None)` for our own frames echoed back by the medium.
    pub fn receive(&mut self, bytes: &[u8], now: Millis) -> Result<Option<Reception>, CodecError> {
        let frame = Frame::decode(bytes).inspect_err(|err| {
            debug!(len = bytes.len(), error = %err, "dropping frame");
        })?;
        let sender = frame.sender();
        if sender == self.local {
            trace!("ignoring own echo");
            return Ok(None);
        }
        let sequence = self.registry.touch(sender, frame.seq(), now).ok();
        Ok(Some(Reception { frame, sequence }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Components, Tone};
    use crate::vocab::ToneKind;

    fn word() -> SignalWord {
        let components: Components = std::iter::once(Tone::new(ToneKind::ToneMid, 200, 128)).collect();
        SignalWord::new(
            EnvironmentalContext::OpenSpace,
            EmotionalState::Neutral,
            components,
            0,
        )
        .unwrap()
    }

    #[test]
    fn sequence_counter_wraps() {
        let mut tx = Transceiver::new(NodeId([1; 6]), PeerRegistry::default());
        for expected in 0..=255u8 {
            let m = tx.control_frame(0, ControlBody::Formation {
                formation: crate::vocab::FormationType::Line,
                scale: 1.0,
            });
            assert_eq!(m.seq, expected);
        }
        assert_eq!(tx.peek_seq(), 0);
    }

    #[test]
    fn receive_tracks_peers_and_drops_echo() {
        let mut a = Transceiver::new(NodeId([1; 6]), PeerRegistry::default());
        let mut b = Transceiver::new(NodeId([2; 6]), PeerRegistry::default());

        let first = a.signal_frame(10, word(), EnvironmentalContext::OpenSpace, EmotionalState::Neutral);
        let rx = b.receive(&first.encode(), 12).unwrap().unwrap();
        assert_eq!(rx.sequence, Some(SeqObservation::First));
        assert_eq!(rx.frame, Frame::Signal(first.clone()));

        // lost frame
        let _ = a.signal_frame(20, word(), EnvironmentalContext::OpenSpace, EmotionalState::Neutral);
        let third = a.signal_frame(30, word(), EnvironmentalContext::OpenSpace, EmotionalState::Neutral);
        let rx = b.receive(&third.encode(), 31).unwrap().unwrap();
        assert_eq!(rx.sequence, Some(SeqObservation::Gap(1)));

        assert_eq!(a.receive(&first.encode(), 40).unwrap(), None);
        assert!(b.registry().is_alive(&NodeId([1; 6]), 40, 10_000));
    }

    #[test]
    fn corrupt_frames_do_not_touch_registry() {
        let mut a = Transceiver::new(NodeId([1; 6]), PeerRegistry::default());
        let mut b = Transceiver::new(NodeId([2; 6]), PeerRegistry::default());
        let mut bytes = a
            .signal_frame(0, word(), EnvironmentalContext::OpenSpace, EmotionalState::Neutral)
            .encode();
        bytes[20] ^= 0xFF;
        assert!(b.receive(&bytes, 0).is_err());
        assert!(b.registry().is_empty());
    }

    #[test]
    fn untracked_sender_still_delivers() {
        let mut a = Transceiver::new(NodeId([1; 6]), PeerRegistry::default());
        let mut b = Transceiver::new(NodeId([2; 6]), PeerRegistry::new(0));
        let m = a.signal_frame(0, word(), EnvironmentalContext::OpenSpace, EmotionalState::Neutral);
        let rx = b.receive(&m.encode(), 0).unwrap().unwrap();
        assert_eq!(rx.sequence, None);
    }
}
