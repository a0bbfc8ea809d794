//! Running a node on tokio.
//!
//! The node is owned by exactly one task. Frames reach it over an `mpsc`
//! channel and ticks come from an interval, so all engine state is touched
//! from that task only.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chorus_wire::Millis;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::io::Radio;
use crate::node::Node;

const INBOUND_CHANNEL: usize = 64;

/// Control side of a spawned node.
pub struct NodeHandle {
    inbound: mpsc::Sender<Bytes>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Node>,
}

impl NodeHandle {
    /// Sender for raw frames addressed to the node.
    pub fn inbound(&self) -> mpsc::Sender<Bytes> {
        self.inbound.clone()
    }

    pub async fn deliver(&self, frame: Bytes) -> Result<()> {
        self.inbound.send(frame).await.map_err(|_| Error::Stopped)
    }

    /// Stop the node after a final tick and snapshot, and hand it back.
    pub async fn shutdown(mut self) -> Result<Node> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.map_err(|_| Error::Stopped)
    }
}

fn clock(start: Instant) -> Millis {
    // wraps like a firmware millisecond counter
    start.elapsed().as_millis() as Millis
}

/// Run `node` on its own task, ticking every `tick_ms` of its config.
pub fn spawn(mut node: Node) -> NodeHandle {
    let (inbound, mut rx) = mpsc::channel::<Bytes>(INBOUND_CHANNEL);
    let (shutdown, mut stop) = oneshot::channel::<()>();
    let period = Duration::from_millis(u64::from(node.config().tick_ms.max(1)));

    let task = tokio::spawn(async move {
        let start = Instant::now();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(node = %node.id(), tick_ms = period.as_millis() as u64, "node running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    node.tick(clock(start));
                }
                frame = rx.recv() => match frame {
                    Some(frame) => node.enqueue(frame),
                    None => break,
                },
                _ = &mut stop => break,
            }
        }

        while let Ok(frame) = rx.try_recv() {
            node.enqueue(frame);
        }
        let now = clock(start);
        node.tick(now);
        if let Err(err) = node.persist(now) {
            warn!(node = %node.id(), error = %err, "final snapshot failed");
        }
        info!(node = %node.id(), "node stopped");
        node
    });

    NodeHandle {
        inbound,
        shutdown: Some(shutdown),
        task,
    }
}

/// A shared broadcast medium: every frame sent reaches every subscriber,
/// including the sender.
#[derive(Debug, Clone)]
pub struct ChannelRadio {
    medium: broadcast::Sender<Bytes>,
}

impl ChannelRadio {
    pub fn new(medium: broadcast::Sender<Bytes>) -> Self {
        Self { medium }
    }
}

impl Radio for ChannelRadio {
    fn broadcast(&mut self, frame: Bytes) {
        // no listeners is not an error on a radio link
        let _ = self.medium.send(frame);
    }
}

/// Forward everything on `medium` to a node's inbound channel until either
/// side closes.
pub fn bridge(medium: &broadcast::Sender<Bytes>, inbound: mpsc::Sender<Bytes>) -> JoinHandle<()> {
    let mut rx = medium.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if inbound.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "bridge lagged, frames lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::io::{Collaborators, Situation, TraceRenderer};
    use crate::snapshot::MemoryStore;
    use chorus_coordination::CoordinationConfig;
    use chorus_wire::{ControlBody, Frame, Health, NodeId, NodeKind, PeerRegistry, StatusReport, Transceiver};

    fn collaborators(radio: Box<dyn Radio>, store: MemoryStore) -> Collaborators {
        let situation = Situation::default();
        Collaborators {
            context: Box::new(situation.clone()),
            emotion: Box::new(situation),
            renderer: Box::new(TraceRenderer),
            radio,
            store: Some(Box::new(store)),
        }
    }

    #[tokio::test]
    async fn delivered_frames_are_processed_before_shutdown() {
        let (medium, _) = broadcast::channel(64);
        let store = MemoryStore::new();
        let node = Node::new(
            NodeConfig::default().with_seed(1).with_tick(10),
            collaborators(Box::new(ChannelRadio::new(medium)), store.clone()),
        )
        .unwrap();
        let handle = spawn(node);

        let peer = NodeId::from_seed(2);
        let mut radio = Transceiver::new(peer, PeerRegistry::new(8));
        let status = radio.control_frame(
            0,
            ControlBody::Status(StatusReport {
                kind: NodeKind::Heavy,
                generation: 1,
                fitness: 0.4,
                health: Health::Good,
            }),
        );
        handle.deliver(Frame::Control(status).encode()).await.unwrap();

        let node = handle.shutdown().await.unwrap();
        assert_eq!(node.ecosystem().profile(&peer).map(|p| p.kind), Some(NodeKind::Heavy));
        let saved = store.latest().unwrap();
        assert_eq!(saved.node_id, node.id());
    }

    #[tokio::test]
    async fn nodes_on_a_shared_medium_agree_on_leader() {
        let (medium, _) = broadcast::channel(256);
        let coordination = CoordinationConfig::default().with_election_window(100);
        let mut handles = Vec::new();
        for (seed, fitness) in [(1u64, 0.9f32), (2, 0.1)] {
            let config = NodeConfig {
                coordination: coordination.clone(),
                ..NodeConfig::default()
            }
            .with_seed(seed)
            .with_fitness(fitness)
            .with_tick(10);
            let node = Node::new(
                config,
                collaborators(Box::new(ChannelRadio::new(medium.clone())), MemoryStore::new()),
            )
            .unwrap();
            let handle = spawn(node);
            bridge(&medium, handle.inbound());
            handles.push(handle);
        }

        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let expected = NodeId::from_seed(1);
        for handle in handles {
            let node = handle.shutdown().await.unwrap();
            assert_eq!(node.coordination().leader(), Some(expected));
        }
    }
}
