//! Engine configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use stockops_core::StockroomId;

pub const DEFAULT_STOCKROOM_VAR: &str = "STOCKOPS_DEFAULT_STOCKROOM";
pub const DISPENSE_PREFIX_VAR: &str = "STOCKOPS_DISPENSE_PREFIX";

/// Engine-wide settings used by the dispense façade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stockroom used when the caller's location resolves to none.
    pub default_stockroom: Option<StockroomId>,
    /// Prefix of generated dispense operation numbers.
    pub dispense_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_stockroom: None,
            dispense_prefix: "DISP".to_string(),
        }
    }
}

impl EngineConfig {
    /// Read `STOCKOPS_DEFAULT_STOCKROOM` and `STOCKOPS_DISPENSE_PREFIX`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(DEFAULT_STOCKROOM_VAR) {
            let stockroom = raw
                .trim()
                .parse::<StockroomId>()
                .with_context(|| format!("{DEFAULT_STOCKROOM_VAR} is not a valid stockroom id: {raw:?}"))?;
            config.default_stockroom = Some(stockroom);
        }

        if let Some(raw) = lookup(DISPENSE_PREFIX_VAR) {
            let prefix = raw.trim();
            anyhow::ensure!(!prefix.is_empty(), "{DISPENSE_PREFIX_VAR} must not be empty");
            config.dispense_prefix = prefix.to_string();
        }

        Ok(config)
    }

    pub fn with_default_stockroom(mut self, stockroom: StockroomId) -> Self {
        self.default_stockroom = Some(stockroom);
        self
    }
}
