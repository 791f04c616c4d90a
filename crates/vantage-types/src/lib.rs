//! Shared data model for the Vantage agent runtime kernel: the entities of
//! `spec.md` §3, rendered as typed, serde-tagged Rust values instead of
//! free-form JSON, per the "typed sum types over stringly-typed JSON" design
//! note.

pub mod budget;
pub mod config;
pub mod crew;
pub mod error;
pub mod plan;
pub mod result;
pub mod routing;
pub mod task;
pub mod trace;

pub use budget::{BudgetLimits, BudgetPreset, BudgetState, BudgetUsage};
pub use config::{EnergyConfig, ExecutorConfig, RoutingConfig};
pub use crew::{
    AgentDefinition, AgentResult, AgentResultStatus, Aggregation, BlackboardEntry, CrewDefinition,
    CrewResult, CrewStatus, CrewStrategy, CrewStreamEvent, EdgeCondition, ExecutionMode,
    GraphEdge, StreamEvent,
};
pub use error::{VantageError, VantageResult};
pub use plan::{
    CritiqueResult, EstimatedBudget, ExecutionPlan, IssueKind, IssueSeverity, PlanStep,
    SimulationIssue, SimulationResult, StepStrategy, StrategyKind,
};
pub use result::{CriteriaResult, StepResult, TaskResult, TaskStatus};
pub use routing::{
    MessageRole, ModelInfo, ModelMessage, ModelMessageImage, ModelRequest, ModelResponse,
    ModelStreamChunk, Purpose, RoutingDecision, Tier, TokenUsage,
};
pub use task::{CriterionCheck, CriterionType, SuccessCriterion, Task, TaskSpec};
pub use trace::{ExecutionTrace, Span, TraceEvent};
