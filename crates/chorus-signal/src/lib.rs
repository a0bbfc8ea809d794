//! # Chorus Signal
//!
//! Emergent communication for the chorus swarm.
//!
//! Nodes share no dictionary. Each one coins short tone/light patterns for
//! the situations it finds itself in, keeps the ones that get answered and
//! reworks the ones that do not:
//!
//! - [`SignalEngine`]: context-keyed word selection, synthesis, mutation,
//!   utility tracking and pruning over a bounded [`Vocabulary`]
//! - [`PeerModel`]: what each peer sounds like and how far we trust it
//! - [`acoustic_similarity`]: position-wise comparison of two words
//!
//! All randomness comes from the caller's RNG so runs are reproducible.

pub mod config;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod peers;
pub mod personality;
pub mod ring;
pub mod similarity;
pub mod synthesis;
pub mod vocabulary;

pub use config::{PeerLearningConfig, VocabularyConfig};
pub use engine::{Generated, Maintenance, Origin, SignalEngine, SignalMemory};
pub use error::{Error, Result};
pub use mutation::{mutate, Mutation};
pub use peers::{PeerModel, PeerSignalProfile, Recognition};
pub use personality::Personality;
pub use ring::Ring;
pub use similarity::acoustic_similarity;
pub use synthesis::synthesize;
pub use vocabulary::{match_score, SignalKey, Vocabulary, VocabularyEntry, VocabularyStats};
