use thiserror::Error;

/// The closed set of error kinds a host can observe from the kernel boundary
/// (`execute_task`, `execute_task_stream`, `execute_crew`,
/// `execute_crew_stream`). Every terminal path of those operations resolves
/// into a `TaskResult`/`CrewResult` whose `status`/`error` fields are filled
/// from one of these variants; none of them ever escape as a raw panic or an
/// uncaught `Result::Err`.
#[derive(Debug, Error, Clone)]
pub enum VantageError {
    #[error("tool not found: {tool_name}")]
    ToolNotFound { tool_name: String },

    #[error("plan validation failed: {reason}")]
    PlanValidation { reason: String },

    #[error("budget exhausted: {ceiling} ({used}/{limit})")]
    BudgetExhausted {
        ceiling: String,
        used: f64,
        limit: f64,
    },

    #[error("no available provider for tier {tier} (purpose {purpose})")]
    NoAvailableProvider { tier: String, purpose: String },

    #[error("constitution violation: {rule_id}: {description}")]
    ConstitutionViolation {
        rule_id: String,
        description: String,
    },

    #[error("tool '{tool_name}' timed out after {elapsed_ms}ms")]
    ToolTimeout { tool_name: String, elapsed_ms: u64 },

    #[error("tool '{tool_name}' execution error: {message}")]
    ToolExecutionError { tool_name: String, message: String },

    #[error("provider '{provider_id}' error: {message}")]
    ProviderError {
        provider_id: String,
        message: String,
    },

    #[error("cycle detected in crew graph: {detail}")]
    CycleDetected { detail: String },

    #[error("invalid definition: {detail}")]
    ValidationError { detail: String },
}

impl VantageError {
    /// One-line, human-readable message suitable for `TaskResult.error`.
    pub fn one_line(&self) -> String {
        self.to_string()
    }

    /// Stable machine-readable error code, matching the kind names used
    /// throughout `spec.md` §7 (`ToolNotFound`, `BudgetExhausted`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            VantageError::ToolNotFound { .. } => "ToolNotFound",
            VantageError::PlanValidation { .. } => "PlanValidation",
            VantageError::BudgetExhausted { .. } => "BudgetExhausted",
            VantageError::NoAvailableProvider { .. } => "NoAvailableProvider",
            VantageError::ConstitutionViolation { .. } => "ConstitutionViolation",
            VantageError::ToolTimeout { .. } => "ToolTimeout",
            VantageError::ToolExecutionError { .. } => "ToolExecutionError",
            VantageError::ProviderError { .. } => "ProviderError",
            VantageError::CycleDetected { .. } => "CycleDetected",
            VantageError::ValidationError { .. } => "ValidationError",
        }
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, VantageError::BudgetExhausted { .. })
    }
}

pub type VantageResult<T> = Result<T, VantageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_spec_error_kind_names() {
        let err = VantageError::ToolNotFound {
            tool_name: "bash".into(),
        };
        assert_eq!(err.code(), "ToolNotFound");
        assert!(err.one_line().contains("bash"));
    }

    #[test]
    fn budget_exhausted_is_distinguishable() {
        let err = VantageError::BudgetExhausted {
            ceiling: "maxTokens".into(),
            used: 100.0,
            limit: 100.0,
        };
        assert!(err.is_budget_exhausted());
        assert!(!VantageError::CycleDetected {
            detail: "a -> b -> a".into()
        }
        .is_budget_exhausted());
    }
}
