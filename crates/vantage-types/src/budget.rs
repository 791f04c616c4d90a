use serde::{Deserialize, Serialize};

/// Recognized budget presets (`spec.md` §4.1). Stable strings usable across
/// the host boundary, per `spec.md` §6's "Wire/CLI surface" note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPreset {
    Low,
    Medium,
    High,
    Unlimited,
}

impl BudgetPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetPreset::Low => "low",
            BudgetPreset::Medium => "medium",
            BudgetPreset::High => "high",
            BudgetPreset::Unlimited => "unlimited",
        }
    }

    /// Fixed preset table per `spec.md` §4.1. `Unlimited` disables
    /// enforcement (see `BudgetLimits::enforced`) but the ceilings below are
    /// still recorded so `getUsage` can report a percentage if a caller asks.
    pub fn limits(self) -> BudgetLimits {
        match self {
            BudgetPreset::Low => BudgetLimits {
                max_tokens: 20_000,
                max_tool_calls: 15,
                max_escalations: 1,
                max_latency_ms: 60_000,
                cost_ceiling_usd: 0.25,
                max_energy_wh: 0.5,
                enforced: true,
            },
            BudgetPreset::Medium => BudgetLimits {
                max_tokens: 100_000,
                max_tool_calls: 60,
                max_escalations: 4,
                max_latency_ms: 5 * 60_000,
                cost_ceiling_usd: 2.0,
                max_energy_wh: 3.0,
                enforced: true,
            },
            BudgetPreset::High => BudgetLimits {
                max_tokens: 500_000,
                max_tool_calls: 250,
                max_escalations: 12,
                max_latency_ms: 20 * 60_000,
                cost_ceiling_usd: 10.0,
                max_energy_wh: 15.0,
                enforced: true,
            },
            BudgetPreset::Unlimited => BudgetLimits {
                max_tokens: u64::MAX,
                max_tool_calls: u64::MAX,
                max_escalations: u64::MAX,
                max_latency_ms: u64::MAX,
                cost_ceiling_usd: f64::MAX,
                max_energy_wh: f64::MAX,
                enforced: false,
            },
        }
    }
}

/// Allocated ceilings for a `BudgetEnvelope` (`spec.md` §3). `enforced=false`
/// (only reachable via `BudgetPreset::Unlimited` or an explicit opt-out)
/// disables `checkBudget` failures while usage is still tracked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLimits {
    pub max_tokens: u64,
    pub max_tool_calls: u64,
    pub max_escalations: u64,
    pub max_latency_ms: u64,
    pub cost_ceiling_usd: f64,
    pub max_energy_wh: f64,
    #[serde(default = "default_true")]
    pub enforced: bool,
}

fn default_true() -> bool {
    true
}

/// Live consumption counters for a `BudgetEnvelope` (`spec.md` §3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetState {
    pub tokens_used: u64,
    pub tool_calls_used: u64,
    pub escalations_used: u64,
    pub elapsed_ms: u64,
    pub cost_usd: f64,
    pub energy_wh: f64,
    /// Sticky-exhausted flag: once any ceiling is exceeded this remains
    /// `true` even if a later snapshot would not itself exceed a ceiling
    /// (`spec.md` §4.1: "an exhausted envelope is sticky").
    pub exceeded: bool,
}

/// The `getUsage` projection (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUsage {
    pub tokens_used: u64,
    pub tokens_remaining: u64,
    pub tool_calls_used: u64,
    pub tool_calls_remaining: u64,
    pub escalations_used: u64,
    pub escalations_remaining: u64,
    pub cost_usd: f64,
    pub cost_remaining: f64,
    pub elapsed_ms: u64,
    pub latency_remaining_ms: u64,
    pub energy_wh: f64,
    pub exceeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_preset_disables_enforcement() {
        let limits = BudgetPreset::Unlimited.limits();
        assert!(!limits.enforced);
        assert_eq!(limits.max_tokens, u64::MAX);
    }

    #[test]
    fn low_preset_is_tighter_than_high() {
        let low = BudgetPreset::Low.limits();
        let high = BudgetPreset::High.limits();
        assert!(low.max_tokens < high.max_tokens);
        assert!(low.cost_ceiling_usd < high.cost_ceiling_usd);
    }
}
