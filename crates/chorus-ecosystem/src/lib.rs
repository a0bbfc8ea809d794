//! # Chorus Ecosystem
//!
//! Swarm-wide bookkeeping of who is reliable.
//!
//! Every node keeps its own view: a bounded registry of [`BotProfile`]s with
//! a composite reputation in `[0, 100]`, undirected pairwise trust between
//! nodes, a log of data-report verifications, and a periodic analysis that
//! spots weak nodes and missing capabilities. Blacklisting is a local
//! decision and is never synchronised.

pub mod analysis;
pub mod config;
pub mod error;
pub mod manager;
pub mod profile;
pub mod relationship;
pub mod verification;

pub use analysis::{CapabilityGap, EcosystemReport, Recommendation, SwarmHealth, UpgradeAdvice, WeakNode, Weakness};
pub use config::EcosystemConfig;
pub use error::{Error, Result};
pub use manager::{EcosystemManager, EcosystemSnapshot, EcosystemUpdate};
pub use profile::{BotProfile, BLACKLIST_CAP, DEFAULT_ACCURACY, NEUTRAL_REPUTATION};
pub use relationship::{BotRelationship, Interaction, InteractionKind, RelationshipTable, NEUTRAL_TRUST};
pub use verification::{VerificationEntry, VerificationLog};
