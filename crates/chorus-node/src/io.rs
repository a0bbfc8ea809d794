//! Collaborators the node consumes: sensing, affect, actuation, radio and
//! storage all live outside the core.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chorus_wire::{EmotionalState, EnvironmentalContext, SignalWord};
use tracing::trace;

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Classifies present sensor state.
pub trait ContextSource: Send {
    fn current_context(&mut self) -> EnvironmentalContext;
}

/// Derives the node's affect from recent success and failure.
pub trait EmotionSource: Send {
    fn current_emotion(&mut self) -> EmotionalState;
}

/// Plays a chosen signal as sound or light.
pub trait SignalRenderer: Send {
    fn render(&mut self, signal: &SignalWord, context: EnvironmentalContext, emotion: EmotionalState);
}

/// Fire-and-forget broadcast on the shared link.
pub trait Radio: Send {
    fn broadcast(&mut self, frame: Bytes);
}

/// Durable home of the node's learned state.
pub trait SnapshotStore: Send {
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()>;
    /// `Ok(None)` on a cold start.
    fn restore(&mut self) -> Result<Option<Snapshot>>;
}

/// The full set of collaborators a node is built with.
pub struct Collaborators {
    pub context: Box<dyn ContextSource>,
    pub emotion: Box<dyn EmotionSource>,
    pub renderer: Box<dyn SignalRenderer>,
    pub radio: Box<dyn Radio>,
    pub store: Option<Box<dyn SnapshotStore>>,
}

/// A situation that tests and the simulator set by hand. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct Situation {
    inner: Arc<Mutex<(EnvironmentalContext, EmotionalState)>>,
}

impl Situation {
    pub fn new(context: EnvironmentalContext, emotion: EmotionalState) -> Self {
        Self {
            inner: Arc::new(Mutex::new((context, emotion))),
        }
    }

    pub fn set(&self, context: EnvironmentalContext, emotion: EmotionalState) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = (context, emotion);
    }

    pub fn get(&self) -> (EnvironmentalContext, EmotionalState) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ContextSource for Situation {
    fn current_context(&mut self) -> EnvironmentalContext {
        self.get().0
    }
}

impl EmotionSource for Situation {
    fn current_emotion(&mut self) -> EmotionalState {
        self.get().1
    }
}

/// Renderer that only traces what it would play.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceRenderer;

impl SignalRenderer for TraceRenderer {
    fn render(&mut self, signal: &SignalWord, context: EnvironmentalContext, emotion: EmotionalState) {
        trace!(
            ?context,
            ?emotion,
            components = signal.components.len(),
            duration_ms = signal.duration_ms(),
            "render"
        );
    }
}

/// Radio that queues frames for someone else to deliver. Clones share the
/// queue.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    frames: Arc<Mutex<Vec<Bytes>>>,
}

impl Outbox {
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.frames.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Radio for Outbox {
    fn broadcast(&mut self, frame: Bytes) {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).push(frame);
    }
}

impl Collaborators {
    /// Hand-driven collaborators: a shared situation, a tracing renderer, an
    /// outbox radio and an optional store.
    pub fn manual(situation: Situation, outbox: Outbox, store: Option<Box<dyn SnapshotStore>>) -> Self {
        Self {
            context: Box::new(situation.clone()),
            emotion: Box::new(situation),
            renderer: Box::new(TraceRenderer),
            radio: Box::new(outbox),
            store,
        }
    }
}
