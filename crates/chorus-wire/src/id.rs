//! Node identities.

use serde::{Deserialize, Serialize};

/// MAC-equivalent node identity (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 6]);

impl NodeId {
    /// All-zero identity, used on the wire for "nobody".
    pub const NONE: NodeId = NodeId([0; 6]);

    /// Broadcast address.
    pub const BROADCAST: NodeId = NodeId([0xFF; 6]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Derive a stable, locally administered unicast identity from a seed.
    pub fn from_seed(seed: u64) -> Self {
        let hash = blake3::hash(&seed.to_le_bytes());
        let mut id = [0u8; 6];
        id.copy_from_slice(&hash.as_bytes()[..6]);
        // locally administered, unicast
        id[0] = (id[0] | 0x02) & !0x01;
        Self(id)
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// True for the all-zero placeholder.
    pub fn is_none(&self) -> bool {
        self.0 == [0; 6]
    }

    /// Lowercase hex without separators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse `aabbccddeeff` or `AA:BB:CC:DD:EE:FF`.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let compact: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(compact)?;
        if bytes.len() != 6 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut id = [0u8; 6];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Short digest of a data report, used to match verifications to reports.
pub fn data_hash(data: &[u8]) -> u32 {
    let hash = blake3::hash(data);
    let b = hash.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
