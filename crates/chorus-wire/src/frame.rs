//! Fixed-layout frame codec.
//!
//! Two frame families share the broadcast link and are told apart by the
//! leading version byte. All multi-byte fields are little-endian and every
//! frame ends with the XOR of all preceding bytes.
//!
//! Signal frame, version `0x02`, 79 bytes:
//! - header: version 1, sender 6, timestamp 4, seq 1
//! - signal word, 59 bytes: context 1, valence 1 (signed), generation 2,
//!   component count 1, kinds 8×1, durations 8×2, intensities 8×1,
//!   utility 4 (f32), times used 4, times understood 4, last used 4,
//!   created at 4, personality signature 1, complexity preference 1
//! - trailer: context 1, emotion 1 (signed), confidence 1, expects response 1,
//!   is response 1, responding-to seq 1, signal age 1, checksum 1
//!
//! Control frame, version `0x03`, 46 bytes:
//! version 1, kind 1, sender 6, timestamp 4, seq 1, body 32 (zero padded),
//! checksum 1.
//!
//! A one-byte XOR catches every single-bit flip but misses any pair of flips
//! in the same bit position of two different bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::control::{ControlBody, LeaderBid, StatusReport};
use crate::error::CodecError;
use crate::signal::{Components, SignalWord, Tone, MAX_COMPONENTS};
use crate::vocab::{
    ConsensusType, DecisionTopic, EmotionalState, EnvironmentalContext, FormationType, Health,
    NodeKind, TaskCategory, ToneKind,
};
use crate::{elapsed, Millis, NodeId};

/// Version byte of emergent signal frames.
pub const SIGNAL_VERSION: u8 = 0x02;
/// Version byte of control frames.
pub const CONTROL_VERSION: u8 = 0x03;

/// Encoded size of a [`SignalWord`].
pub const SIGNAL_WORD_LEN: usize = 59;
/// Encoded size of an [`EmergentMessage`].
pub const SIGNAL_FRAME_LEN: usize = 12 + SIGNAL_WORD_LEN + 8;
/// Size of the padded body of a control frame.
pub const CONTROL_BODY_LEN: usize = 32;
/// Encoded size of a [`ControlMessage`].
pub const CONTROL_FRAME_LEN: usize = 13 + CONTROL_BODY_LEN + 1;

/// XOR of every byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// The wire envelope around a signal word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergentMessage {
    pub sender: NodeId,
    pub timestamp: Millis,
    pub seq: u8,
    pub signal: SignalWord,
    /// Sender's context when it sent the frame.
    pub context: EnvironmentalContext,
    pub emotion: EmotionalState,
    /// Derived from the signal's utility.
    pub confidence: u8,
    pub expects_response: bool,
    /// Sequence number of the message this one answers.
    pub response_to: Option<u8>,
    /// Seconds since the signal was coined, saturating at 255.
    pub signal_age: u8,
}

impl EmergentMessage {
    /// Wrap `signal` for broadcast, deriving confidence, age and the
    /// response expectation.
    pub fn compose(
        sender: NodeId,
        seq: u8,
        now: Millis,
        signal: SignalWord,
        context: EnvironmentalContext,
        emotion: EmotionalState,
    ) -> Self {
        let confidence = (signal.utility.clamp(0.0, 1.0) * 255.0) as u8;
        let signal_age = (elapsed(now, signal.created_at) / 1000).min(255) as u8;
        Self {
            sender,
            timestamp: now,
            seq,
            signal,
            context,
            emotion,
            confidence,
            expects_response: context.is_urgent(),
            response_to: None,
            signal_age,
        }
    }

    /// Mark this message as the answer to `seq`.
    #[must_use]
    pub fn in_response_to(mut self, seq: u8) -> Self {
        self.response_to = Some(seq);
        self.expects_response = false;
        self
    }

    pub fn encode(&self) -> [u8; SIGNAL_FRAME_LEN] {
        let mut buf = [0u8; SIGNAL_FRAME_LEN];
        let mut w = Writer::new(&mut buf);
        w.u8(SIGNAL_VERSION);
        w.id(self.sender);
        w.u32(self.timestamp);
        w.u8(self.seq);
        write_signal(&mut w, &self.signal);
        w.u8(self.context.code());
        w.i8(self.emotion.valence());
        w.u8(self.confidence);
        w.bool(self.expects_response);
        w.bool(self.response_to.is_some());
        w.u8(self.response_to.unwrap_or(0));
        w.u8(self.signal_age);
        w.seal();
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::open(bytes, SIGNAL_VERSION, SIGNAL_FRAME_LEN)?;
        let sender = r.id();
        let timestamp = r.u32();
        let seq = r.u8();
        let signal = read_signal(&mut r)?;
        let context = r.context("context")?;
        let emotion = r.emotion("emotion")?;
        let confidence = r.u8();
        let expects_response = r.bool("expects_response")?;
        let is_response = r.bool("is_response")?;
        let responding_to = r.u8();
        let signal_age = r.u8();
        Ok(Self {
            sender,
            timestamp,
            seq,
            signal,
            context,
            emotion,
            confidence,
            expects_response,
            response_to: is_response.then_some(responding_to),
            signal_age,
        })
    }
}

/// Coordination or reputation traffic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub sender: NodeId,
    pub timestamp: Millis,
    pub seq: u8,
    pub body: ControlBody,
}

impl ControlMessage {
    pub fn encode(&self) -> [u8; CONTROL_FRAME_LEN] {
        let mut buf = [0u8; CONTROL_FRAME_LEN];
        let mut w = Writer::new(&mut buf);
        w.u8(CONTROL_VERSION);
        w.u8(self.body.kind());
        w.id(self.sender);
        w.u32(self.timestamp);
        w.u8(self.seq);
        let body_start = w.pos;
        write_body(&mut w, &self.body);
        debug_assert!(w.pos - body_start <= CONTROL_BODY_LEN);
        w.pos = body_start + CONTROL_BODY_LEN;
        w.seal();
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::open(bytes, CONTROL_VERSION, CONTROL_FRAME_LEN)?;
        let kind = r.u8();
        let sender = r.id();
        let timestamp = r.u32();
        let seq = r.u8();
        let body = read_body(&mut r, kind)?;
        Ok(Self {
            sender,
            timestamp,
            seq,
            body,
        })
    }
}

/// Any frame seen on the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Signal(EmergentMessage),
    Control(ControlMessage),
}

impl Frame {
    /// Decode by dispatching on the version byte. Never allocates.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        match bytes.first() {
            None => Err(CodecError::WrongLength {
                expected: SIGNAL_FRAME_LEN,
                actual: 0,
            }),
            Some(&SIGNAL_VERSION) => EmergentMessage::decode(bytes).map(Frame::Signal),
            Some(&CONTROL_VERSION) => ControlMessage::decode(bytes).map(Frame::Control),
            Some(&other) => Err(CodecError::UnknownVersion(other)),
        }
    }

    /// Encode into a shareable buffer ready for broadcast.
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Signal(m) => Bytes::copy_from_slice(&m.encode()),
            Frame::Control(m) => Bytes::copy_from_slice(&m.encode()),
        }
    }

    pub fn sender(&self) -> NodeId {
        match self {
            Frame::Signal(m) => m.sender,
            Frame::Control(m) => m.sender,
        }
    }

    pub fn seq(&self) -> u8 {
        match self {
            Frame::Signal(m) => m.seq,
            Frame::Control(m) => m.seq,
        }
    }

    pub fn timestamp(&self) -> Millis {
        match self {
            Frame::Signal(m) => m.timestamp,
            Frame::Control(m) => m.timestamp,
        }
    }
}

impl From<EmergentMessage> for Frame {
    fn from(m: EmergentMessage) -> Self {
        Frame::Signal(m)
    }
}

impl From<ControlMessage> for Frame {
    fn from(m: ControlMessage) -> Self {
        Frame::Control(m)
    }
}

fn write_signal(w: &mut Writer<'_>, s: &SignalWord) {
    let start = w.pos;
    w.u8(s.context.code());
    w.i8(s.valence.valence());
    w.u16(s.generation);
    w.u8(s.components.len() as u8);
    for slot in 0..MAX_COMPONENTS {
        w.u8(s.components.get(slot).map_or(0, |t| t.kind.code()));
    }
    for slot in 0..MAX_COMPONENTS {
        w.u16(s.components.get(slot).map_or(0, |t| t.duration_ms));
    }
    for slot in 0..MAX_COMPONENTS {
        w.u8(s.components.get(slot).map_or(0, |t| t.intensity));
    }
    w.f32(s.utility);
    w.u32(s.times_used);
    w.u32(s.times_understood);
    w.u32(s.last_used);
    w.u32(s.created_at);
    w.u8(s.personality_signature);
    w.u8(s.complexity_preference);
    debug_assert_eq!(w.pos - start, SIGNAL_WORD_LEN);
}

fn read_signal(r: &mut Reader<'_>) -> Result<SignalWord, CodecError> {
    let context = r.context("signal.context")?;
    let valence = r.emotion("signal.valence")?;
    let generation = r.u16();
    let count = r.u8();
    if count == 0 || usize::from(count) > MAX_COMPONENTS {
        return Err(CodecError::InvalidField {
            field: "signal.component_count",
            value: u32::from(count),
        });
    }
    let count = usize::from(count);

    let mut kinds = [ToneKind::Silence; MAX_COMPONENTS];
    for (slot, kind) in kinds.iter_mut().enumerate() {
        let code = r.u8();
        if slot < count {
            *kind = ToneKind::from_code(code).ok_or(CodecError::InvalidField {
                field: "signal.component_kind",
                value: u32::from(code),
            })?;
        }
    }
    let mut durations = [0u16; MAX_COMPONENTS];
    for d in durations.iter_mut() {
        *d = r.u16();
    }
    let mut intensities = [0u8; MAX_COMPONENTS];
    for i in intensities.iter_mut() {
        *i = r.u8();
    }
    let mut components = Components::new();
    for slot in 0..count {
        components.push(Tone::new(kinds[slot], durations[slot], intensities[slot]));
    }

    let utility = r.f32("signal.utility")?;
    if !(0.0..=1.0).contains(&utility) {
        return Err(CodecError::InvalidField {
            field: "signal.utility",
            value: utility.to_bits(),
        });
    }
    Ok(SignalWord {
        context,
        valence,
        generation,
        components,
        utility,
        times_used: r.u32(),
        times_understood: r.u32(),
        last_used: r.u32(),
        created_at: r.u32(),
        personality_signature: r.u8(),
        complexity_preference: r.u8(),
    })
}

fn write_body(w: &mut Writer<'_>, body: &ControlBody) {
    match *body {
        ControlBody::LeaderBid(bid) => {
            w.u8(bid.kind.code());
            w.u16(bid.generation);
            w.f32(bid.fitness);
            w.u8(bid.battery);
            w.u16(bid.strategies_learned);
        }
        ControlBody::TaskAssignment {
            task_id,
            category,
            priority,
            assignee,
            deadline,
        } => {
            w.u16(task_id);
            w.u8(category.code());
            w.u8(priority);
            w.id(assignee);
            w.u32(deadline);
        }
        ControlBody::TaskProgress {
            requester,
            task_id,
            progress,
        } => {
            w.id(requester);
            w.u16(task_id);
            w.u8(progress);
        }
        ControlBody::Proposal {
            proposal_id,
            topic,
            consensus,
            deadline,
            expected_voters,
        } => {
            w.u16(proposal_id);
            w.u8(topic.code());
            w.u8(consensus.code());
            w.id(match consensus {
                ConsensusType::Expert(expert) => expert,
                _ => NodeId::NONE,
            });
            w.u32(deadline);
            w.u8(expected_voters);
        }
        ControlBody::Vote {
            proposer,
            proposal_id,
            choice,
            confidence,
        } => {
            w.id(proposer);
            w.u16(proposal_id);
            w.u8(choice);
            w.f32(confidence);
        }
        ControlBody::Formation { formation, scale } => {
            w.u8(formation.code());
            w.f32(scale);
        }
        ControlBody::Status(status) => {
            w.u8(status.kind.code());
            w.u16(status.generation);
            w.f32(status.fitness);
            w.u8(status.health.code());
        }
        ControlBody::Verification {
            subject,
            data_hash,
            correct,
            confidence,
        } => {
            w.id(subject);
            w.u32(data_hash);
            w.bool(correct);
            w.f32(confidence);
        }
    }
}

fn read_body(r: &mut Reader<'_>, kind: u8) -> Result<ControlBody, CodecError> {
    let body = match kind {
        0x01 => ControlBody::LeaderBid(LeaderBid {
            kind: r.code("bid.kind", NodeKind::from_code)?,
            generation: r.u16(),
            fitness: r.f32("bid.fitness")?,
            battery: r.u8(),
            strategies_learned: r.u16(),
        }),
        0x02 => ControlBody::TaskAssignment {
            task_id: r.u16(),
            category: r.code("task.category", TaskCategory::from_code)?,
            priority: r.u8(),
            assignee: r.id(),
            deadline: r.u32(),
        },
        0x03 => ControlBody::TaskProgress {
            requester: r.id(),
            task_id: r.u16(),
            progress: r.u8(),
        },
        0x04 => {
            let proposal_id = r.u16();
            let topic = r.code("proposal.topic", DecisionTopic::from_code)?;
            let code = r.u8();
            let expert = r.id();
            let consensus =
                ConsensusType::from_code(code, expert).ok_or(CodecError::InvalidField {
                    field: "proposal.consensus",
                    value: u32::from(code),
                })?;
            ControlBody::Proposal {
                proposal_id,
                topic,
                consensus,
                deadline: r.u32(),
                expected_voters: r.u8(),
            }
        }
        0x05 => ControlBody::Vote {
            proposer: r.id(),
            proposal_id: r.u16(),
            choice: r.u8(),
            confidence: r.f32("vote.confidence")?,
        },
        0x06 => ControlBody::Formation {
            formation: r.code("formation.type", FormationType::from_code)?,
            scale: r.f32("formation.scale")?,
        },
        0x07 => ControlBody::Status(StatusReport {
            kind: r.code("status.kind", NodeKind::from_code)?,
            generation: r.u16(),
            fitness: r.f32("status.fitness")?,
            health: r.code("status.health", Health::from_code)?,
        }),
        0x08 => ControlBody::Verification {
            subject: r.id(),
            data_hash: r.u32(),
            correct: r.bool("verification.correct")?,
            confidence: r.f32("verification.confidence")?,
        },
        other => {
            return Err(CodecError::InvalidField {
                field: "control.kind",
                value: u32::from(other),
            })
        }
    };
    Ok(body)
}

/// Cursor over a fixed-size output buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }

    fn i8(&mut self, v: i8) {
        self.bytes(&v.to_le_bytes());
    }

    fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    fn id(&mut self, id: NodeId) {
        self.bytes(id.as_bytes());
    }

    /// Write the checksum into the last byte.
    fn seal(self) {
        let last = self.buf.len() - 1;
        debug_assert_eq!(self.pos, last);
        self.buf[last] = checksum(&self.buf[..last]);
    }
}

/// Cursor over a frame whose length, version and checksum were verified.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Check length and checksum, then position after the version byte.
    fn open(buf: &'a [u8], version: u8, len: usize) -> Result<Self, CodecError> {
        match buf.first() {
            Some(&v) if v == version => {}
            Some(&v) => return Err(CodecError::UnknownVersion(v)),
            None => {
                return Err(CodecError::WrongLength {
                    expected: len,
                    actual: 0,
                })
            }
        }
        if buf.len() != len {
            return Err(CodecError::WrongLength {
                expected: len,
                actual: buf.len(),
            });
        }
        let computed = checksum(&buf[..len - 1]);
        let carried = buf[len - 1];
        if computed != carried {
            return Err(CodecError::Corrupt { computed, carried });
        }
        Ok(Self { buf, pos: 1 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self, field: &'static str) -> Result<f32, CodecError> {
        let v = f32::from_le_bytes(self.take());
        if v.is_finite() {
            Ok(v)
        } else {
            Err(CodecError::InvalidField {
                field,
                value: v.to_bits(),
            })
        }
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidField {
                field,
                value: u32::from(other),
            }),
        }
    }

    fn id(&mut self) -> NodeId {
        NodeId(self.take())
    }

    fn code<T>(&mut self, field: &'static str, parse: fn(u8) -> Option<T>) -> Result<T, CodecError> {
        let code = self.u8();
        parse(code).ok_or(CodecError::InvalidField {
            field,
            value: u32::from(code),
        })
    }

    fn context(&mut self, field: &'static str) -> Result<EnvironmentalContext, CodecError> {
        self.code(field, EnvironmentalContext::from_code)
    }

    fn emotion(&mut self, field: &'static str) -> Result<EmotionalState, CodecError> {
        let raw = i8::from_le_bytes(self.take());
        EmotionalState::from_valence(raw).ok_or(CodecError::InvalidField {
            field,
            value: u32::from(raw as u8),
        })
    }
}
