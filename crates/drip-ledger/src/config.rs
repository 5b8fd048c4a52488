use serde::{Deserialize, Serialize};

use drip_types::Address;

/// Whether a stream may be scheduled to start before the current instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Any start time is accepted; a past start simply means part of the
    /// deposit is already earned when the stream is created.
    #[default]
    Unrestricted,
    /// `start_time` must be at or after the creation instant.
    NotInPast,
}

/// What happens to `total_deposit mod duration` at stream creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Collect the whole deposit and keep the remainder in custody, outside
    /// any stream's accounting. It is tracked in the custody totals and no
    /// operation ever releases it.
    #[default]
    Retain,
    /// Collect only the streamed portion; the remainder never leaves the
    /// sender.
    Refund,
}

/// Configuration for a [`StreamingLedger`](crate::StreamingLedger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// The ledger's own identity. Streams to it are refused.
    pub identity: Address,
    /// Owner recorded at construction. Not consulted by any operation.
    pub owner: Address,
    pub start_policy: StartPolicy,
    pub remainder_policy: RemainderPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            identity: Address::from_label("drip-ledger"),
            owner: Address::from_label("drip-owner"),
            start_policy: StartPolicy::default(),
            remainder_policy: RemainderPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Default configuration with the given identity and owner.
    pub fn new(identity: Address, owner: Address) -> Self {
        Self {
            identity,
            owner,
            ..Default::default()
        }
    }

    pub fn with_start_policy(mut self, policy: StartPolicy) -> Self {
        self.start_policy = policy;
        self
    }

    pub fn with_remainder_policy(mut self, policy: RemainderPolicy) -> Self {
        self.remainder_policy = policy;
        self
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

/// Errors loading or saving a [`LedgerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid ledger config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode ledger config: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = LedgerConfig::default();
        assert_eq!(c.identity, Address::from_label("drip-ledger"));
        assert_eq!(c.owner, Address::from_label("drip-owner"));
        assert_eq!(c.start_policy, StartPolicy::Unrestricted);
        assert_eq!(c.remainder_policy, RemainderPolicy::Retain);
    }

    #[test]
    fn builder_overrides_policies() {
        let c = LedgerConfig::new(Address::from_label("l"), Address::from_label("o"))
            .with_start_policy(StartPolicy::NotInPast)
            .with_remainder_policy(RemainderPolicy::Refund);
        assert_eq!(c.start_policy, StartPolicy::NotInPast);
        assert_eq!(c.remainder_policy, RemainderPolicy::Refund);
        assert_eq!(c.identity, Address::from_label("l"));
    }

    #[test]
    fn parses_partial_toml() {
        let c = LedgerConfig::from_toml_str(r#"start_policy = "not_in_past""#).unwrap();
        assert_eq!(c.start_policy, StartPolicy::NotInPast);
        assert_eq!(c.remainder_policy, RemainderPolicy::Retain);
        assert_eq!(c.identity, LedgerConfig::default().identity);
    }

    #[test]
    fn toml_roundtrip() {
        let c = LedgerConfig::default().with_remainder_policy(RemainderPolicy::Refund);
        let text = c.to_toml_string().unwrap();
        assert_eq!(LedgerConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = LedgerConfig::from_toml_str(r#"remainder_policy = "burn""#).unwrap_err();
        assert!(err.to_string().starts_with("invalid ledger config"));
    }
}
