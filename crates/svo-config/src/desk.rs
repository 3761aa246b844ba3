use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use svo_pricing::{PricingRules, BPS_SCALE, DEFAULT_ROUNDING_INCREMENT, DEFAULT_VAT_BPS};
use svo_reconcile::MatchPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_vat_bps")]
    pub default_vat_bps: u32,
    #[serde(default = "default_rounding_increment")]
    pub rounding_increment_minor: i64,
}

fn default_vat_bps() -> u32 {
    DEFAULT_VAT_BPS
}

fn default_rounding_increment() -> i64 {
    DEFAULT_ROUNDING_INCREMENT
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_vat_bps: default_vat_bps(),
            rounding_increment_minor: default_rounding_increment(),
        }
    }
}

impl PricingConfig {
    pub fn rules(&self) -> PricingRules {
        PricingRules {
            default_vat_bps: self.default_vat_bps,
            rounding_increment: self.rounding_increment_minor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub hash_chain: bool,
}

fn default_journal_path() -> String {
    "var/svo_journal.jsonl".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            hash_chain: true,
        }
    }
}

/// Typed desk configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskConfig {
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub reconcile: MatchPolicy,
    #[serde(default)]
    pub journal: JournalConfig,
}

impl DeskConfig {
    /// Extract from a merged config document. Unknown keys are ignored here;
    /// see `report_unused_keys`.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: DeskConfig =
            serde_json::from_value(config_json.clone()).context("invalid desk config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pricing.rounding_increment_minor <= 0 {
            bail!(
                "pricing.rounding_increment_minor must be positive, got {}",
                self.pricing.rounding_increment_minor
            );
        }
        if i64::from(self.pricing.default_vat_bps) > BPS_SCALE {
            bail!(
                "pricing.default_vat_bps must be at most {BPS_SCALE}, got {}",
                self.pricing.default_vat_bps
            );
        }
        let max = self.reconcile.weights.max_score();
        if self.reconcile.threshold == 0 || self.reconcile.threshold > max {
            bail!(
                "reconcile.threshold must be in 1..={max}, got {}",
                self.reconcile.threshold
            );
        }
        if self.journal.path.trim().is_empty() {
            bail!("journal.path must not be empty");
        }
        Ok(())
    }

    pub fn pricing_rules(&self) -> PricingRules {
        self.pricing.rules()
    }

    pub fn match_policy(&self) -> MatchPolicy {
        self.reconcile
    }
}
