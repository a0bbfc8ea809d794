//! One swarm node: every engine behind a single inbound queue and tick.
//!
//! Radio frames are queued by [`Node::enqueue`] and only processed inside
//! [`Node::tick`], so the same dispatch path serves real, simulated and
//! test traffic, and no engine is ever entered re-entrantly.

use std::collections::VecDeque;

use bytes::Bytes;
use chorus_coordination::{CoordinationEngine, CoordinationEvent};
use chorus_ecosystem::{EcosystemManager, EcosystemUpdate};
use chorus_signal::{Generated, PeerModel, SignalEngine};
use chorus_wire::{
    data_hash, elapsed, ControlBody, ControlMessage, EmergentMessage, EnvironmentalContext, Frame,
    Health, LeaderBid, Millis, NodeId, NodeKind, Outcome, PeerRegistry, SeqObservation, StatusReport,
    Transceiver,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::io::Collaborators;
use crate::snapshot::{JsonFileStore, Snapshot};

/// Link and dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub corrupt: u64,
    /// Frames dropped because the inbound queue overflowed.
    pub overflow: u64,
    pub duplicates: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub processed: usize,
    pub sent: usize,
    pub events: Vec<CoordinationEvent>,
    pub ecosystem: EcosystemUpdate,
}

pub struct Node {
    config: NodeConfig,
    id: NodeId,
    transceiver: Transceiver,
    signals: SignalEngine<StdRng>,
    peers: PeerModel,
    ecosystem: EcosystemManager,
    coordination: CoordinationEngine,
    io: Collaborators,
    inbound: VecDeque<Bytes>,
    stats: NodeStats,
    last_context: EnvironmentalContext,
    started: bool,
    last_signal: Millis,
    last_status: Millis,
    last_snapshot: Millis,
    last_tick: Millis,
}

impl Node {
    /// Build a node, warm-starting from the store when it holds a snapshot.
    /// Without a store, `snapshot_path` selects a JSON file store.
    pub fn new(mut config: NodeConfig, mut io: Collaborators) -> Result<Self> {
        let id = config.identity();
        if io.store.is_none() {
            if let Some(path) = &config.snapshot_path {
                io.store = Some(Box::new(JsonFileStore::new(path.clone())));
            }
        }
        let rng = StdRng::seed_from_u64(config.seed);
        let restored = match io.store.as_mut() {
            Some(store) => store.restore()?,
            None => None,
        };
        let restored = restored.filter(|snapshot| {
            if snapshot.node_id != id {
                warn!(node = %id, owner = %snapshot.node_id, "snapshot belongs to another node, cold start");
            }
            snapshot.node_id == id
        });

        let (signals, peers, ecosystem) = match restored {
            Some(snapshot) => {
                info!(node = %id, signals = snapshot.vocabulary.len(), peers = snapshot.peers.len(), "restored snapshot");
                let mut signals = SignalEngine::restore(
                    config.vocabulary.clone(),
                    snapshot.personality,
                    snapshot.vocabulary,
                    rng,
                );
                signals.set_generation(snapshot.generation);
                config.generation = snapshot.generation;
                (
                    signals,
                    snapshot.peers,
                    EcosystemManager::restore(config.ecosystem.clone(), snapshot.ecosystem),
                )
            }
            None => {
                let mut signals = SignalEngine::new(config.vocabulary.clone(), rng);
                signals.set_generation(config.generation);
                (
                    signals,
                    PeerModel::new(config.peers.clone()),
                    EcosystemManager::new(config.ecosystem.clone()),
                )
            }
        };

        let mut node = Self {
            id,
            transceiver: Transceiver::new(id, PeerRegistry::new(config.max_peers)),
            signals,
            peers,
            ecosystem,
            coordination: CoordinationEngine::new(id, config.coordination.clone()),
            io,
            inbound: VecDeque::with_capacity(config.inbound_queue),
            stats: NodeStats::default(),
            last_context: EnvironmentalContext::Unknown,
            started: false,
            last_signal: 0,
            last_status: 0,
            last_snapshot: 0,
            last_tick: 0,
            config,
        };
        if let Err(err) = node.ecosystem.register_node(id, node.config.kind, 0) {
            warn!(error = %err, "cannot track own profile");
        }
        Ok(node)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn signals(&self) -> &SignalEngine<StdRng> {
        &self.signals
    }

    pub fn peers(&self) -> &PeerModel {
        &self.peers
    }

    pub fn ecosystem(&self) -> &EcosystemManager {
        &self.ecosystem
    }

    pub fn coordination(&self) -> &CoordinationEngine {
        &self.coordination
    }

    pub fn transceiver(&self) -> &Transceiver {
        &self.transceiver
    }

    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Queue a raw frame for the next tick. The oldest frame is dropped when
    /// the queue is full.
    pub fn enqueue(&mut self, frame: Bytes) {
        if self.config.inbound_queue == 0 {
            self.stats.overflow += 1;
            return;
        }
        if self.inbound.len() >= self.config.inbound_queue {
            self.inbound.pop_front();
            self.stats.overflow += 1;
            trace!("inbound queue full, dropped oldest frame");
        }
        self.inbound.push_back(frame);
    }

    /// Self-reported evolution state, carried in status broadcasts and bids.
    pub fn set_status(&mut self, generation: u16, fitness: f32, health: Health) {
        self.config.generation = generation;
        self.config.fitness = fitness;
        self.config.health = health;
        self.signals.set_generation(generation);
        if let Err(err) = self.ecosystem.update_health(&self.id, health, self.last_tick) {
            debug!(error = %err, "own profile missing");
        }
    }

    /// Everyone we believe is around, ourselves included.
    pub fn participants(&self, now: Millis) -> Vec<NodeId> {
        let mut ids = self
            .transceiver
            .registry()
            .alive_peers(now, self.config.peer_timeout_ms);
        ids.push(self.id);
        ids
    }

    fn send(&mut self, frame: Frame) {
        self.io.radio.broadcast(frame.encode());
        self.stats.frames_out += 1;
    }

    /// Frame and broadcast a control body.
    pub fn send_control(&mut self, body: ControlBody, now: Millis) {
        trace!(kind = body.name(), "sending control frame");
        let message = self.transceiver.control_frame(now, body);
        self.send(Frame::Control(message));
    }

    fn send_signal(&mut self, generated: &Generated, message: EmergentMessage) {
        self.io
            .renderer
            .render(&generated.word, message.context, message.emotion);
        self.send(Frame::Signal(message));
    }

    fn own_bid(&self) -> LeaderBid {
        LeaderBid {
            kind: self.config.kind,
            generation: self.config.generation,
            fitness: self.config.fitness,
            battery: 100,
            strategies_learned: u16::try_from(self.signals.vocabulary().len()).unwrap_or(u16::MAX),
        }
    }

    /// Tell the swarm we checked `data` from `subject`.
    pub fn report_verification(&mut self, subject: NodeId, data: &[u8], correct: bool, confidence: f32, now: Millis) {
        let hash = data_hash(data);
        self.ecosystem
            .record_data_verification(subject, self.id, hash, correct, confidence, now);
        let outcome = if correct { Outcome::Success } else { Outcome::Contradicted };
        self.peers.update_trust(&subject, outcome);
        self.send_control(
            ControlBody::Verification {
                subject,
                data_hash: hash,
                correct,
                confidence,
            },
            now,
        );
    }

    /// Mutable access for host-driven coordination (tasks, proposals, votes).
    /// Bodies returned by the engine should go out through
    /// [`Node::send_control`].
    pub fn coordination_mut(&mut self) -> &mut CoordinationEngine {
        &mut self.coordination
    }

    /// Drain the inbound queue, then run every periodic duty.
    pub fn tick(&mut self, now: Millis) -> TickReport {
        self.last_tick = now;
        let mut report = TickReport::default();
        let sent_before = self.stats.frames_out;

        while let Some(frame) = self.inbound.pop_front() {
            self.dispatch(&frame, now, &mut report.events);
            report.processed += 1;
        }

        if !self.started {
            self.started = true;
            self.last_signal = now;
            self.last_status = now;
            self.last_snapshot = now;
            self.send_status(now);
            self.bid(now);
        }

        let maintenance = self.signals.update(now);
        for key in &maintenance.unanswered {
            trace!(%key, "signal went unanswered");
        }

        self.check_leader(now);
        report.ecosystem = self.ecosystem.update(now);
        let events = self.coordination.update(now);
        for event in &events {
            self.on_event(event);
        }
        report.events.extend(events);

        if elapsed(now, self.last_signal) >= self.config.signal_interval_ms {
            self.last_signal = now;
            self.broadcast_situation(now);
        }
        if elapsed(now, self.last_status) >= self.config.status_interval_ms {
            self.last_status = now;
            self.send_status(now);
        }
        if elapsed(now, self.last_snapshot) >= self.config.snapshot_interval_ms {
            self.last_snapshot = now;
            if let Err(err) = self.persist(now) {
                warn!(error = %err, "snapshot failed");
            }
        }
        let expired = self
            .transceiver
            .registry_mut()
            .expire(now, self.config.peer_timeout_ms.saturating_mul(3));
        if expired > 0 {
            debug!(expired, "forgot silent peers");
        }

        report.sent = usize::try_from(self.stats.frames_out - sent_before).unwrap_or(usize::MAX);
        report
    }

    fn bid(&mut self, now: Millis) {
        let bid = self.own_bid();
        match self.coordination.bid(bid, now) {
            Ok(body) => self.send_control(body, now),
            Err(err) => debug!(error = %err, "bid not entered"),
        }
    }

    fn send_status(&mut self, now: Millis) {
        let report = StatusReport {
            kind: self.config.kind,
            generation: self.config.generation,
            fitness: self.config.fitness,
            health: self.config.health,
        };
        self.send_control(ControlBody::Status(report), now);
    }

    /// A leader we stopped hearing from is dropped and a new round opened.
    fn check_leader(&mut self, now: Millis) {
        let Some(leader) = self.coordination.leader() else {
            if !self.coordination.election().is_collecting() && self.started {
                self.bid(now);
            }
            return;
        };
        if leader == self.id
            || self
                .transceiver
                .registry()
                .is_alive(&leader, now, self.config.coordination.leader_timeout_ms)
        {
            return;
        }
        warn!(leader = %leader, "leader silent");
        self.coordination.leader_lost(now);
        self.bid(now);
    }

    fn on_event(&mut self, event: &CoordinationEvent) {
        let (key, success) = match *event {
            CoordinationEvent::TaskCompleted(key) => (key, true),
            CoordinationEvent::TaskFailed(key) => (key, false),
            CoordinationEvent::LeaderElected(leader) => {
                info!(leader = %leader, is_self = leader == self.id, "leader");
                return;
            }
            _ => return,
        };
        let Some(assignee) = self.coordination.tasks().get(&key).and_then(|t| t.assignee) else {
            return;
        };
        self.ecosystem.record_mission(&assignee, success);
    }

    /// Broadcast a signal for the current situation, and react to fresh
    /// danger with an emergency response.
    fn broadcast_situation(&mut self, now: Millis) {
        let context = self.io.context.current_context();
        let emotion = self.io.emotion.current_emotion();

        if context == EnvironmentalContext::DangerSensed && self.last_context != context {
            let participants = self.participants(now);
            match self.coordination.emergency_response(&participants, now) {
                Ok(bodies) => {
                    for body in bodies {
                        self.send_control(body, now);
                    }
                }
                Err(err) => warn!(error = %err, "emergency response failed"),
            }
        }
        self.last_context = context;

        let generated = self.signals.generate_for_context(context, emotion, now);
        let message = self
            .transceiver
            .signal_frame(now, generated.word.clone(), context, emotion);
        if message.expects_response {
            self.signals.expect_response(message.seq, generated.key, now);
        }
        trace!(key = %generated.key, origin = ?generated.origin, seq = message.seq, "broadcasting signal");
        self.send_signal(&generated, message);
    }

    fn dispatch(&mut self, bytes: &[u8], now: Millis, events: &mut Vec<CoordinationEvent>) {
        let reception = match self.transceiver.receive(bytes, now) {
            Ok(Some(reception)) => reception,
            Ok(None) => return,
            Err(_) => {
                self.stats.corrupt += 1;
                return;
            }
        };
        self.stats.frames_in += 1;
        let sender = reception.frame.sender();

        if let Err(err) = self.ecosystem.register_node(sender, NodeKind::Unknown, now) {
            trace!(peer = %sender, error = %err, "peer not tracked by ecosystem");
        }
        match reception.sequence {
            Some(SeqObservation::Duplicate) => {
                self.stats.duplicates += 1;
                return;
            }
            Some(observation) => self.ecosystem.record_link_quality(&sender, observation.missed()),
            None => {}
        }

        match reception.frame {
            Frame::Signal(message) => self.on_signal(message, now),
            Frame::Control(message) => {
                if let Some(event) = self.on_control(message, now) {
                    self.on_event(&event);
                    events.push(event);
                }
            }
        }
    }

    fn on_signal(&mut self, message: EmergentMessage, now: Millis) {
        let sender = message.sender;
        if let Some(recognition) = self.peers.recognize(&sender, &message.signal) {
            trace!(peer = %sender, similarity = recognition.similarity, "recognised peer idiom");
        }
        if self
            .peers
            .learn_from_peer(sender, &message.signal, message.context, now)
        {
            self.signals
                .remember(sender, message.signal.clone(), message.context, now);
        } else {
            trace!(peer = %sender, "peer table full, not remembered");
        }

        if let Some(to_seq) = message.response_to {
            if self.signals.acknowledge(to_seq).is_some() {
                self.peers.update_trust(&sender, Outcome::Success);
                self.signals.record_memory_outcome(sender, 1.0);
            }
        }

        let context = self.io.context.current_context();
        let emotion = self.io.emotion.current_emotion();
        if let Some(generated) = self.signals.respond_to(&message, context, emotion, now) {
            let reply = self.transceiver.response_frame(
                now,
                generated.word.clone(),
                context,
                emotion,
                message.seq,
            );
            debug!(peer = %sender, to_seq = message.seq, "answering");
            self.send_signal(&generated, reply);
        }
    }

    fn on_control(&mut self, message: ControlMessage, now: Millis) -> Option<CoordinationEvent> {
        let sender = message.sender;
        match message.body {
            ControlBody::Status(status) => {
                let result = self
                    .ecosystem
                    .register_node(sender, status.kind, now)
                    .and_then(|()| {
                        self.ecosystem
                            .update_status(&sender, u32::from(status.generation), status.fitness, now)
                    })
                    .and_then(|()| self.ecosystem.update_health(&sender, status.health, now));
                if let Err(err) = result {
                    trace!(peer = %sender, error = %err, "status ignored");
                }
                None
            }
            ControlBody::Verification {
                subject,
                data_hash,
                correct,
                confidence,
            } => {
                self.ecosystem
                    .record_data_verification(subject, sender, data_hash, correct, confidence, now);
                let outcome = if correct { Outcome::Success } else { Outcome::Contradicted };
                self.peers.update_trust(&subject, outcome);
                None
            }
            body => {
                let participants = self.participants(now);
                let was_collecting = self.coordination.election().is_collecting();
                let applied = self.coordination.handle_control(sender, &body, &participants, now);
                // a bid from a peer opened a new round: stand in it too
                if matches!(body, ControlBody::LeaderBid(_)) && !was_collecting && self.started {
                    self.bid(now);
                }
                match applied {
                    Ok(event) => event,
                    Err(err) => {
                        debug!(peer = %sender, kind = body.name(), error = %err, "control frame not applied");
                        None
                    }
                }
            }
        }
    }

    /// Current learned state.
    pub fn snapshot(&self, now: Millis) -> Snapshot {
        Snapshot {
            node_id: self.id,
            saved_at: now,
            personality: *self.signals.personality(),
            generation: self.signals.generation(),
            vocabulary: self.signals.vocabulary().clone(),
            peers: self.peers.clone(),
            ecosystem: self.ecosystem.snapshot(),
        }
    }

    /// Write a snapshot to the store, if there is one.
    pub fn persist(&mut self, now: Millis) -> Result<()> {
        let snapshot = self.snapshot(now);
        match self.io.store.as_mut() {
            Some(store) => store.persist(&snapshot),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Outbox, Situation};
    use crate::snapshot::MemoryStore;
    use chorus_coordination::TaskStatus;
    use chorus_wire::{EmotionalState, SignalWord, TaskCategory, Tone, ToneKind};

    struct Harness {
        node: Node,
        situation: Situation,
        outbox: Outbox,
        store: MemoryStore,
    }

    fn harness(seed: u64, config: NodeConfig) -> Harness {
        let situation = Situation::new(EnvironmentalContext::OpenSpace, EmotionalState::Neutral);
        let outbox = Outbox::default();
        let store = MemoryStore::new();
        let io = Collaborators::manual(situation.clone(), outbox.clone(), Some(Box::new(store.clone())));
        let node = Node::new(config.with_seed(seed), io).unwrap();
        Harness {
            node,
            situation,
            outbox,
            store,
        }
    }

    fn deliver(from: &Harness, to: &mut Harness) {
        for frame in from.outbox.take() {
            to.node.enqueue(frame);
        }
    }

    #[test]
    fn queue_overflow_and_corrupt_frames_are_counted() {
        let mut h = harness(1, NodeConfig {
            inbound_queue: 2,
            ..NodeConfig::default()
        });
        for _ in 0..3 {
            h.node.enqueue(Bytes::from_static(&[0x02, 0xFF, 0x00]));
        }
        assert_eq!(h.node.queued(), 2);
        assert_eq!(h.node.stats().overflow, 1);
        let report = h.node.tick(0);
        assert_eq!(report.processed, 2);
        assert_eq!(h.node.stats().corrupt, 2);
        assert_eq!(h.node.stats().frames_in, 0);
    }

    #[test]
    fn status_frames_update_ecosystem() {
        let mut h = harness(1, NodeConfig::default());
        let peer = NodeId::from_seed(99);
        let mut radio = Transceiver::new(peer, PeerRegistry::new(8));
        let status = radio.control_frame(
            500,
            ControlBody::Status(StatusReport {
                kind: NodeKind::Scout,
                generation: 3,
                fitness: 0.7,
                health: Health::Excellent,
            }),
        );
        h.node.enqueue(Frame::Control(status).encode());
        h.node.tick(1_000);
        let profile = h.node.ecosystem().profile(&peer).unwrap();
        assert_eq!(profile.kind, NodeKind::Scout);
        assert_eq!(profile.generation, 3);
        assert_eq!(profile.health, Health::Excellent);
        assert_eq!(h.node.participants(1_000).len(), 2);
    }

    #[test]
    fn urgent_signal_gets_answered_and_credited() {
        let mut a = harness(1, NodeConfig::default());
        let mut b = harness(2, NodeConfig::default());
        a.situation.set(EnvironmentalContext::TaskFailure, EmotionalState::Negative);

        a.node.tick(0);
        b.node.tick(0);
        a.node.tick(2_000);
        deliver(&a, &mut b);
        b.node.tick(2_000);

        let replies: Vec<EmergentMessage> = b
            .outbox
            .take()
            .into_iter()
            .filter_map(|bytes| match Frame::decode(&bytes) {
                Ok(Frame::Signal(message)) if message.response_to.is_some() => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(replies.len(), 1);

        for reply in replies {
            a.node.enqueue(Frame::Signal(reply).encode());
        }
        a.node.tick(2_100);
        assert!((a.node.peers().trust(&b.node.id()) - 0.55).abs() < 1e-6);
    }

    #[test]
    fn signals_from_refused_peers_are_not_remembered() {
        let mut config = NodeConfig::default();
        config.peers = config.peers.with_max_peers(1);
        let mut h = harness(1, config);
        let word = SignalWord::new(
            EnvironmentalContext::ResourceFound,
            EmotionalState::Positive,
            std::iter::once(Tone::new(ToneKind::ToneHigh, 120, 200)).collect(),
            0,
        )
        .unwrap();
        for seed in [20, 21] {
            let mut radio = Transceiver::new(NodeId::from_seed(seed), PeerRegistry::new(8));
            let message = radio.signal_frame(
                100,
                word.clone(),
                EnvironmentalContext::ResourceFound,
                EmotionalState::Positive,
            );
            h.node.enqueue(Frame::Signal(message).encode());
        }
        h.node.tick(100);

        assert_eq!(h.node.peers().len(), 1);
        let senders: Vec<NodeId> = h.node.signals().memory().map(|m| m.sender).collect();
        assert_eq!(senders, vec![NodeId::from_seed(20)]);
    }

    #[test]
    fn lone_node_elects_itself() {
        let mut h = harness(1, NodeConfig::default());
        h.node.tick(0);
        assert!(h.node.coordination().election().is_collecting());
        let report = h.node.tick(10_000);
        assert!(report
            .events
            .contains(&CoordinationEvent::LeaderElected(h.node.id())));
        assert!(h.node.coordination().is_leader());
    }

    #[test]
    fn fresh_danger_starts_emergency_response() {
        let mut h = harness(1, NodeConfig::default());
        h.situation.set(EnvironmentalContext::DangerSensed, EmotionalState::VeryNegative);
        h.node.tick(0);
        h.node.tick(2_000);
        let task = h.node.coordination().tasks().live().next().unwrap();
        assert_eq!(task.category, TaskCategory::Emergency);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(h.node.coordination().formation().is_active());
        // still in danger: no second emergency
        h.node.tick(4_000);
        assert_eq!(h.node.coordination().tasks().len(), 1);
    }

    #[test]
    fn learned_state_survives_restart() {
        let mut h = harness(1, NodeConfig::default());
        h.node.tick(0);
        h.node.tick(2_000);
        assert_eq!(h.node.signals().vocabulary().len(), 1);
        h.node.set_status(7, 0.8, Health::Good);
        h.node.persist(2_000).unwrap();
        let personality = *h.node.signals().personality();

        let io = Collaborators::manual(Situation::default(), Outbox::default(), Some(Box::new(h.store.clone())));
        let restarted = Node::new(NodeConfig::default().with_seed(1), io).unwrap();
        assert_eq!(restarted.signals().vocabulary().len(), 1);
        assert_eq!(*restarted.signals().personality(), personality);
        assert_eq!(restarted.signals().generation(), 7);
        assert_eq!(restarted.config().generation, 7);
    }

    #[test]
    fn foreign_snapshot_is_ignored() {
        let mut h = harness(1, NodeConfig::default());
        h.node.tick(0);
        h.node.tick(2_000);
        h.node.persist(2_000).unwrap();

        let io = Collaborators::manual(Situation::default(), Outbox::default(), Some(Box::new(h.store.clone())));
        let other = Node::new(NodeConfig::default().with_seed(2), io).unwrap();
        assert!(other.signals().vocabulary().is_empty());
        assert_eq!(other.ecosystem().len(), 1);
        assert!(other.ecosystem().profile(&other.id()).is_some());
    }

    #[test]
    fn snapshot_path_backs_a_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        let config = NodeConfig::default().with_seed(3).with_snapshot_path(path.clone());

        let io = Collaborators::manual(Situation::default(), Outbox::default(), None);
        let mut node = Node::new(config.clone(), io).unwrap();
        node.tick(0);
        node.tick(2_000);
        node.persist(2_000).unwrap();
        assert!(path.exists());

        let io = Collaborators::manual(Situation::default(), Outbox::default(), None);
        let restarted = Node::new(config, io).unwrap();
        assert_eq!(restarted.signals().vocabulary(), node.signals().vocabulary());
    }
}
