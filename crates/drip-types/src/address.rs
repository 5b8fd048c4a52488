use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

const ADDRESS_LEN: usize = 20;

/// Identity of a party to the ledger: a sender, a recipient, the ledger
/// itself, or its owner.
///
/// The hosting environment authenticates callers; the ledger only compares
/// addresses for equality. Addresses can be derived deterministically from a
/// human label, which is how scenarios and tests name their parties.
///
/// Serialized as its `0x`-prefixed hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    bytes: [u8; ADDRESS_LEN],
}

impl Address {
    /// Derive an address from a label. The same label always yields the
    /// same address.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"drip-address-v1:");
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LEN]);
        Self { bytes }
    }

    /// Create a random address for tests and demos.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes.
    pub const fn from_raw(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.bytes
    }

    /// Full hex encoding without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Short identifier (`0x` plus the first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes[..4]))
    }

    /// Parse from 40 hex characters, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if decoded.len() != ADDRESS_LEN {
            return Err(TypeError::InvalidLength {
                expected: ADDRESS_LEN,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short_id())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
