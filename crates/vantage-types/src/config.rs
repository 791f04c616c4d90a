use serde::{Deserialize, Serialize};

/// Router tuning (`spec.md` §4.4; thresholds not pinned by the spec, chosen
/// as conventional midpoints and recorded in `DESIGN.md`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    pub complexity_threshold: f64,
    pub slm_confidence_threshold: f64,
    pub prefer_efficient_models: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 0.6,
            slm_confidence_threshold: 0.5,
            prefer_efficient_models: true,
        }
    }
}

/// Energy-aware routing (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyConfig {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_weight: Option<f64>,
    pub critical_wh: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            energy_weight: Some(0.3),
            critical_wh: 0.01,
        }
    }
}

/// Executor tuning (`spec.md` §4.7, §4.8 — every default below is a number
/// the spec itself states).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    pub max_iterations: u32,
    pub max_replan_depth: u32,
    pub direct_max_iterations: u32,
    pub direct_wall_timeout_ms: u64,
    pub direct_window_size: usize,
    pub tool_timeout_default_ms: u64,
    pub direct_circuit_breaker_threshold: u32,
    pub direct_max_arg_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_replan_depth: 2,
            direct_max_iterations: 10,
            direct_wall_timeout_ms: 5 * 60_000,
            direct_window_size: 20,
            tool_timeout_default_ms: 30_000,
            direct_circuit_breaker_threshold: 3,
            direct_max_arg_chars: 50_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_numbers() {
        let executor = ExecutorConfig::default();
        assert_eq!(executor.max_replan_depth, 2);
        assert_eq!(executor.direct_max_iterations, 10);
        assert_eq!(executor.direct_window_size, 20);
        assert_eq!(executor.tool_timeout_default_ms, 30_000);

        let energy = EnergyConfig::default();
        assert_eq!(energy.critical_wh, 0.01);
    }
}
