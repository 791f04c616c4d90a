use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::BudgetUsage;

/// `spec.md` §3: execution mode for an agent inside a crew — whether it runs
/// through the full state-machine Task Executor (C7) or the tight Direct
/// Executor react-loop (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Full,
    Direct,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Direct
    }
}

/// `spec.md` §3 `AgentDefinition`. `role` is left as a free-form string: the
/// spec never closes it over an enum (unlike crew-topology concepts such as
/// `CrewStrategy`), so pinning one here would be guessing a detail the spec
/// deliberately leaves to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub role: String,
    pub instructions: String,
    pub budget_share: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, role: impl Into<String>, instructions: impl Into<String>, budget_share: f64) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            instructions: instructions.into(),
            budget_share,
            allowed_tools: None,
            output_schema: None,
            execution_mode: ExecutionMode::default(),
            max_iterations: None,
            max_retries: None,
            retry_delay_ms: None,
        }
    }
}

/// Crew composition strategy (`spec.md` §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewStrategy {
    Sequential,
    Parallel,
    Graph,
    Hierarchical,
}

/// Aggregation of agent outputs into one crew answer (`spec.md` §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Concat,
    Last,
}

/// Blackboard-entry status an edge condition can compare against (`spec.md`
/// §3 Blackboard status). Mirrors `AgentResultStatus` below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentResultStatus {
    Completed,
    Failed,
}

/// Graph-edge condition grammar (`SPEC_FULL.md` §11: the spec gives only the
/// example `a.status === "failed"`; this covers exactly that shape plus the
/// unconditional default).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeCondition {
    Always,
    StatusEquals { status: AgentResultStatus },
}

impl Default for EdgeCondition {
    fn default() -> Self {
        EdgeCondition::Always
    }
}

/// A directed edge in a `graph` crew (`spec.md` §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
}

/// `spec.md` §3 `CrewDefinition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewDefinition {
    pub name: String,
    pub strategy: CrewStrategy,
    pub agents: Vec<AgentDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Vec<GraphEdge>>,
    pub aggregation: Aggregation,
}

/// `spec.md` §3 Blackboard entry. Written only once an agent terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackboardEntry {
    pub agent_id: String,
    pub result: Option<String>,
    pub status: AgentResultStatus,
    pub written_at: DateTime<Utc>,
}

/// One agent's result inside a crew run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub agent_id: String,
    pub status: AgentResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub budget_used: BudgetUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewStatus {
    Completed,
    Failed,
}

/// `executeCrew` return value (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewResult {
    pub crew_name: String,
    pub trace_id: String,
    pub status: CrewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub agent_results: Vec<AgentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_result: Option<String>,
    pub budget_used: BudgetUsage,
}

/// Streaming event shapes for `executeTaskStream`/`executeCrewStream`
/// (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    Progress {
        phase: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_steps: Option<usize>,
        usage: BudgetUsage,
    },
    Chunk {
        content: String,
    },
    Result {
        result: Box<crate::result::TaskResult>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CrewStreamEvent {
    AgentStart {
        agent_id: String,
    },
    AgentComplete {
        agent_result: AgentResult,
    },
    CrewComplete {
        crew_result: CrewResult,
    },
}
