use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::state::DEFAULT_HAMT_BIT_WIDTH;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("hamt bit width must be between 1 and 8, got {0}")]
    InvalidBitWidth(u32),
}

/// Parameters a ledger is created with
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Human-readable token name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Initial supply in whole tokens, credited to the creator
    pub initial_supply: u64,
    #[serde(default = "default_hamt_bit_width")]
    pub hamt_bit_width: u32,
}

fn default_hamt_bit_width() -> u32 {
    DEFAULT_HAMT_BIT_WIDTH
}

impl LedgerConfig {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, initial_supply: u64) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            initial_supply,
            hamt_bit_width: DEFAULT_HAMT_BIT_WIDTH,
        }
    }

    pub fn with_hamt_bit_width(mut self, hamt_bit_width: u32) -> Self {
        self.hamt_bit_width = hamt_bit_width;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.hamt_bit_width) {
            return Err(ConfigError::InvalidBitWidth(self.hamt_bit_width));
        }
        Ok(())
    }
}
