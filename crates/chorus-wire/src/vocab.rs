//! Closed vocabularies shared by every layer of the swarm protocol.
//!
//! Each enum has a stable one-byte wire code. Unknown codes are a decode
//! error, never a silent default.

use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in wire-code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// One-byte wire code.
            pub const fn code(self) -> u8 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Inverse of [`Self::code`].
            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    /// Situation reported by the external context classifier.
    pub enum EnvironmentalContext {
        ObstacleNear = 0x01,
        OpenSpace = 0x02,
        PeerDetected = 0x03,
        TaskSuccess = 0x04,
        TaskFailure = 0x05,
        ResourceFound = 0x06,
        DangerSensed = 0x07,
        Exploring = 0x08,
        Waiting = 0x09,
        Following = 0x0A,
        Leading = 0x0B,
        Unknown = 0xFF,
    }
}

impl EnvironmentalContext {
    /// Contexts that call for short, harsh signals and a reply from peers.
    pub const fn is_urgent(self) -> bool {
        matches!(self, Self::DangerSensed | Self::TaskFailure)
    }

    /// Contexts that call for smooth, rising signals.
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::TaskSuccess | Self::ResourceFound)
    }

    /// Contexts where long, drawn-out tokens fit.
    pub const fn is_calm(self) -> bool {
        matches!(self, Self::Waiting | Self::Exploring)
    }
}

impl Default for EnvironmentalContext {
    fn default() -> Self {
        Self::Unknown
    }
}

wire_enum! {
    /// Primitive acoustic/visual token type.
    pub enum ToneKind {
        ToneLow = 0x01,
        ToneMid = 0x02,
        ToneHigh = 0x03,
        PulseFast = 0x04,
        PulseSlow = 0x05,
        SweepUp = 0x06,
        SweepDown = 0x07,
        Silence = 0x08,
    }
}

impl ToneKind {
    /// Token types used when the emitter feels good.
    pub const BRIGHT: [ToneKind; 3] = [Self::ToneHigh, Self::SweepUp, Self::PulseFast];

    /// Token types used when the emitter feels bad.
    pub const DARK: [ToneKind; 3] = [Self::ToneLow, Self::SweepDown, Self::PulseSlow];
}

/// Affect estimate from the external emotion source.
///
/// Encoded on the wire as a signed byte in `-2..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmotionalState {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl EmotionalState {
    /// Every state, from most negative to most positive.
    pub const ALL: [EmotionalState; 5] = [
        Self::VeryNegative,
        Self::Negative,
        Self::Neutral,
        Self::Positive,
        Self::VeryPositive,
    ];

    /// Signed charge in `-2..=2`.
    pub const fn valence(self) -> i8 {
        match self {
            Self::VeryNegative => -2,
            Self::Negative => -1,
            Self::Neutral => 0,
            Self::Positive => 1,
            Self::VeryPositive => 2,
        }
    }

    pub const fn from_valence(valence: i8) -> Option<Self> {
        match valence {
            -2 => Some(Self::VeryNegative),
            -1 => Some(Self::Negative),
            0 => Some(Self::Neutral),
            1 => Some(Self::Positive),
            2 => Some(Self::VeryPositive),
            _ => None,
        }
    }

    pub const fn is_positive(self) -> bool {
        self.valence() > 0
    }

    pub const fn is_negative(self) -> bool {
        self.valence() < 0
    }
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self::Neutral
    }
}

/// Result of one interaction with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Partial,
    Failure,
    /// Data the peer reported was proven wrong by someone else.
    Contradicted,
}

impl Outcome {
    /// Signed trust adjustment. False data costs more than a plain failure.
    pub const fn trust_delta(self) -> f32 {
        match self {
            Self::Success => 0.05,
            Self::Partial => 0.01,
            Self::Failure => -0.03,
            Self::Contradicted => -0.10,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

wire_enum! {
    /// Declared hardware role of a node.
    pub enum NodeKind {
        Wheelie = 0x01,
        Speedie = 0x02,
        Scout = 0x03,
        Manipulator = 0x04,
        Heavy = 0x05,
        Aerial = 0x06,
        Unknown = 0xFF,
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        Self::Unknown
    }
}

wire_enum! {
    /// Coarse health grade. Ordered: `Critical < Failing < ... < Excellent`.
    pub enum Health {
        Critical = 1,
        Failing = 2,
        Degraded = 3,
        Good = 4,
        Excellent = 5,
    }
}

impl Health {
    /// Grade in `0.2..=1.0`, used as the health term of the reputation sum.
    pub fn factor(self) -> f32 {
        f32::from(self.code()) / 5.0
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::Good
    }
}

impl PartialOrd for Health {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Health {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.code().cmp(&other.code())
    }
}

wire_enum! {
    pub enum TaskCategory {
        Exploration = 0x01,
        Surveillance = 0x02,
        Rescue = 0x03,
        Maintenance = 0x04,
        Learning = 0x05,
        Emergency = 0x06,
    }
}

wire_enum! {
    /// What a consensus round decides.
    pub enum DecisionTopic {
        ExplorationArea = 0x01,
        FormationChange = 0x02,
        LeaderSelection = 0x03,
        TaskPriority = 0x04,
        ResourceAllocation = 0x05,
        EmergencyResponse = 0x06,
        LearningStrategy = 0x07,
    }
}

wire_enum! {
    pub enum FormationType {
        Dispersed = 0x01,
        Line = 0x02,
        Wedge = 0x03,
        Circle = 0x04,
        Grid = 0x05,
        FollowLeader = 0x06,
        Parallel = 0x07,
        Adaptive = 0x08,
    }
}

/// Quorum rule of a consensus proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusType {
    /// More than half of the expected voters agree.
    Majority,
    /// More than two thirds of the expected voters agree.
    Supermajority,
    /// Every expected voter votes the same choice.
    Unanimous,
    /// Confidence-weighted support above half of the expected weight.
    Weighted,
    /// The named node's vote decides.
    Expert(crate::NodeId),
}

impl ConsensusType {
    pub const fn code(self) -> u8 {
        match self {
            Self::Majority => 0x01,
            Self::Supermajority => 0x02,
            Self::Unanimous => 0x03,
            Self::Weighted => 0x04,
            Self::Expert(_) => 0x05,
        }
    }

    /// Rebuild from the wire code and the expert slot (ignored unless the
    /// code is `Expert`).
    pub const fn from_code(code: u8, expert: crate::NodeId) -> Option<Self> {
        match code {
            0x01 => Some(Self::Majority),
            0x02 => Some(Self::Supermajority),
            0x03 => Some(Self::Unanimous),
            0x04 => Some(Self::Weighted),
            0x05 => Some(Self::Expert(expert)),
            _ => None,
        }
    }
}
