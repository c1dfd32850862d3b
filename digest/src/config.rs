//! Configuration for digest runs

use convey_ledger::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Digest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger to read from
    pub ledger: convey_ledger::Config,

    /// Length of the digest window in days, ending at the run time
    pub period_days: i64,

    /// Prize fund shared among eligible authors, in currency units
    pub fund: Decimal,

    /// Users who may top the ranking but never receive a share
    /// (members and partners)
    pub ineligible: BTreeSet<UserId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: convey_ledger::Config::default(),
            period_days: 7,
            fund: Decimal::new(12500, 2),
            ineligible: BTreeSet::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no digest can run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.period_days <= 0 {
            return Err(crate::Error::Config(format!(
                "period_days must be positive, got {}",
                self.period_days
            )));
        }
        if self.fund.is_sign_negative() {
            return Err(crate::Error::Config(format!(
                "fund must not be negative, got {}",
                self.fund
            )));
        }
        Ok(())
    }
}
