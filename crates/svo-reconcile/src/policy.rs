use serde::{Deserialize, Serialize};

/// Points awarded per agreeing attribute once name and quantity agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub total: u32,
    pub catalog_ref: u32,
    pub unit_price: u32,
    pub vat: u32,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            total: 40,
            catalog_ref: 35,
            unit_price: 15,
            vat: 10,
        }
    }
}

impl MatchWeights {
    pub fn max_score(&self) -> u32 {
        self.total + self.catalog_ref + self.unit_price + self.vat
    }
}

/// Content-matching policy for rows that carry no amendment link.
///
/// The default threshold of 75 is reachable only when stored total and
/// catalog reference both agree (40 + 35).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPolicy {
    #[serde(default)]
    pub weights: MatchWeights,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

fn default_threshold() -> u32 {
    75
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            weights: MatchWeights::default(),
            threshold: default_threshold(),
        }
    }
}

impl MatchPolicy {
    /// `true` if `score` is confident enough to claim a row.
    pub fn clears(&self, score: u32) -> bool {
        score >= self.threshold
    }
}
