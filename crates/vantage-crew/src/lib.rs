//! Crew Orchestrator (C9, `spec.md` §4.9): validates a `CrewDefinition` and
//! runs it under one of four composition strategies, dispatching each agent
//! to either the Task Executor (C7) or Direct Executor (C8) depending on its
//! `executionMode`. Grounded in `tandem_orchestrator::agent_team`'s
//! policy-then-execute shape for validation, and in
//! `other_examples/b3e6ac5e_..._hierarchical.rs`'s planner/worker split for
//! the hierarchical strategy (that file is an unimplemented sketch in its
//! source repo; the concurrency and aggregation here are original).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use vantage_budget::BudgetEnvelope;
use vantage_executor::{DirectExecutor, TaskExecutor};
use vantage_planner::{parse_json_response, Planner};
use vantage_providers::ModelRouter;
use vantage_tools::ToolRegistry;
use vantage_trace::TraceLogger;
use vantage_types::{
    Aggregation, AgentDefinition, AgentResult, AgentResultStatus, BlackboardEntry, CrewDefinition,
    CrewResult, CrewStatus, CrewStrategy, CrewStreamEvent, EdgeCondition, ExecutionMode,
    ExecutorConfig, GraphEdge, Task, TaskStatus, VantageError, VantageResult,
};

/// Tolerance for `spec.md` §4.9's "budgetShare sum ≤ 1 + ε".
const BUDGET_SHARE_EPSILON: f64 = 1e-6;

/// `validateCrew(definition)` (`spec.md` §4.9): agent ids must be unique,
/// a `graph` crew needs an edge list over known agents with no cycle, a
/// `hierarchical` crew needs a manager plus at least one worker.
pub fn validate_crew(def: &CrewDefinition) -> VantageResult<()> {
    if def.agents.is_empty() {
        return Err(VantageError::ValidationError {
            detail: "crew must have at least one agent".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for agent in &def.agents {
        if !seen.insert(agent.id.as_str()) {
            return Err(VantageError::ValidationError {
                detail: format!("duplicate agent id '{}'", agent.id),
            });
        }
    }

    let total_share: f64 = def.agents.iter().map(|a| a.budget_share).sum();
    if total_share > 1.0 + BUDGET_SHARE_EPSILON {
        return Err(VantageError::ValidationError {
            detail: format!("budgetShare sum {total_share} exceeds 1.0"),
        });
    }

    match def.strategy {
        CrewStrategy::Graph => {
            let edges = def.graph.as_ref().ok_or_else(|| VantageError::ValidationError {
                detail: "graph strategy requires a graph edge list".to_string(),
            })?;
            for edge in edges {
                if !seen.contains(edge.from.as_str()) || !seen.contains(edge.to.as_str()) {
                    return Err(VantageError::ValidationError {
                        detail: format!("graph edge references an unknown agent ({} -> {})", edge.from, edge.to),
                    });
                }
            }
            detect_cycle(&def.agents, edges)?;
        }
        CrewStrategy::Hierarchical => {
            if def.agents.len() < 2 {
                return Err(VantageError::ValidationError {
                    detail: "hierarchical strategy requires a manager and at least one worker".to_string(),
                });
            }
        }
        CrewStrategy::Sequential | CrewStrategy::Parallel => {
            if let Some(order) = &def.agent_order {
                for id in order {
                    if !seen.contains(id.as_str()) {
                        return Err(VantageError::ValidationError {
                            detail: format!("agentOrder references an unknown agent '{id}'"),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn detect_cycle(agents: &[AgentDefinition], edges: &[GraphEdge]) -> VantageResult<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        InStack,
        Done,
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }
    let mut marks: HashMap<&str, Mark> = agents.iter().map(|a| (a.id.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> VantageResult<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InStack) => {
                path.push(node);
                return Err(VantageError::CycleDetected {
                    detail: path.join(" -> "),
                });
            }
            _ => {}
        }
        marks.insert(node, Mark::InStack);
        path.push(node);
        if let Some(children) = adjacency.get(node) {
            for &child in children {
                visit(child, adjacency, marks, path)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for agent in agents {
        let mut path = Vec::new();
        visit(&agent.id, &adjacency, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Renders the current blackboard as task-description context (`spec.md`
/// §4.9: "each agent reads the current blackboard snapshot as part of its
/// task description").
fn blackboard_snapshot(entries: &[BlackboardEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let rendered: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "- {} ({}): {}",
                e.agent_id,
                match e.status {
                    AgentResultStatus::Completed => "completed",
                    AgentResultStatus::Failed => "failed",
                },
                e.result.as_deref().unwrap_or("<no result>")
            )
        })
        .collect();
    Some(format!("Current blackboard:\n{}", rendered.join("\n")))
}

fn blackboard_entry(result: &AgentResult) -> BlackboardEntry {
    BlackboardEntry {
        agent_id: result.agent_id.clone(),
        result: result.result.clone(),
        status: result.status,
        written_at: Utc::now(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Delegation {
    agent_id: String,
    instructions: String,
}

/// Tolerant extraction of a manager's delegation list (`spec.md` §4.9:
/// "emit delegations `{agentId, instructions}`"). Accepts either a bare JSON
/// array or `{"delegations": [...]}`, mirroring the Planner's own
/// tolerant-JSON philosophy; an unparseable manager turn yields no
/// delegations rather than failing the crew.
fn extract_delegations(manager_output: &str) -> Vec<Delegation> {
    let Some(value) = parse_json_response(manager_output) else {
        return Vec::new();
    };
    let array = match value.get("delegations") {
        Some(v) => v.clone(),
        None => value,
    };
    serde_json::from_value(array).unwrap_or_default()
}

fn aggregate(mode: Aggregation, results: &[AgentResult]) -> Option<String> {
    match mode {
        Aggregation::Concat => {
            let parts: Vec<String> = results.iter().filter_map(|r| r.result.clone()).collect();
            (!parts.is_empty()).then(|| parts.join("\n\n"))
        }
        Aggregation::Last => results.iter().rev().find_map(|r| r.result.clone()),
    }
}

pub struct CrewOrchestrator {
    router: std::sync::Arc<ModelRouter>,
    tools: ToolRegistry,
    trace: TraceLogger,
    base_config: ExecutorConfig,
}

impl CrewOrchestrator {
    pub fn new(router: std::sync::Arc<ModelRouter>, tools: ToolRegistry, trace: TraceLogger, base_config: ExecutorConfig) -> Self {
        Self {
            router,
            tools,
            trace,
            base_config,
        }
    }

    /// `executeCrew(definition, env) -> CrewResult` (`spec.md` §4.9, §6).
    pub async fn execute_crew(
        &self,
        def: &CrewDefinition,
        envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<CrewStreamEvent>>,
    ) -> CrewResult {
        let trace_id = format!("trace-{}", Uuid::new_v4());
        if let Err(e) = validate_crew(def) {
            return CrewResult {
                crew_name: def.name.clone(),
                trace_id,
                status: CrewStatus::Failed,
                error: Some(e.one_line()),
                agent_results: Vec::new(),
                aggregated_result: None,
                budget_used: envelope.get_usage(),
            };
        }

        let agent_results = match def.strategy {
            CrewStrategy::Sequential => self.execute_sequential(def, envelope, progress).await,
            CrewStrategy::Parallel => self.execute_parallel(def, envelope, progress).await,
            CrewStrategy::Graph => self.execute_graph(def, envelope, progress).await,
            CrewStrategy::Hierarchical => self.execute_hierarchical(def, envelope, progress).await,
        };

        let status = if agent_results.iter().all(|r| r.status == AgentResultStatus::Completed) {
            CrewStatus::Completed
        } else {
            CrewStatus::Failed
        };
        let aggregated_result = aggregate(def.aggregation, &agent_results);

        let crew_result = CrewResult {
            crew_name: def.name.clone(),
            trace_id,
            status,
            error: None,
            agent_results,
            aggregated_result,
            budget_used: envelope.get_usage(),
        };
        if let Some(tx) = progress {
            let _ = tx.send(CrewStreamEvent::CrewComplete {
                crew_result: crew_result.clone(),
            });
        }
        crew_result
    }

    fn resolve_order<'a>(&self, def: &'a CrewDefinition) -> Vec<&'a AgentDefinition> {
        match &def.agent_order {
            Some(order) => order
                .iter()
                .filter_map(|id| def.agents.iter().find(|a| &a.id == id))
                .collect(),
            None => def.agents.iter().collect(),
        }
    }

    async fn execute_sequential(
        &self,
        def: &CrewDefinition,
        envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<CrewStreamEvent>>,
    ) -> Vec<AgentResult> {
        let mut blackboard: Vec<BlackboardEntry> = Vec::with_capacity(def.agents.len());
        let mut results = Vec::with_capacity(def.agents.len());
        for agent in self.resolve_order(def) {
            let context = blackboard_snapshot(&blackboard);
            let result = self.run_agent(&def.name, agent, context.as_deref(), envelope, progress).await;
            blackboard.push(blackboard_entry(&result));
            results.push(result);
        }
        results
    }

    async fn execute_parallel(
        &self,
        def: &CrewDefinition,
        envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<CrewStreamEvent>>,
    ) -> Vec<AgentResult> {
        let futs = def.agents.iter().map(|agent| self.run_agent(&def.name, agent, None, envelope, progress));
        futures::future::join_all(futs).await
    }

    /// `spec.md` §4.9 hierarchical strategy: the manager (the first agent)
    /// runs first and emits delegations `{agentId, instructions}`; each
    /// delegated worker then runs in delegation-list order; finally the
    /// manager runs a second synthesis pass over the worker outputs. A
    /// delegation naming an unknown agent id is skipped rather than failing
    /// the crew, matching the Planner's tolerant-JSON stance elsewhere.
    async fn execute_hierarchical(
        &self,
        def: &CrewDefinition,
        envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<CrewStreamEvent>>,
    ) -> Vec<AgentResult> {
        let (manager, workers) = def.agents.split_first().expect("validated: at least 2 agents");
        let delegation_pass = self.run_agent(&def.name, manager, None, envelope, progress).await;
        if delegation_pass.status != AgentResultStatus::Completed {
            return vec![delegation_pass];
        }

        let delegations = extract_delegations(delegation_pass.result.as_deref().unwrap_or_default());
        let mut results = vec![delegation_pass];
        let mut worker_blackboard: Vec<BlackboardEntry> = Vec::new();
        for delegation in &delegations {
            let Some(worker) = workers.iter().find(|w| w.id == delegation.agent_id) else {
                continue;
            };
            let result = self
                .run_agent(&def.name, worker, Some(delegation.instructions.as_str()), envelope, progress)
                .await;
            worker_blackboard.push(blackboard_entry(&result));
            results.push(result);
        }

        let synthesis_context = blackboard_snapshot(&worker_blackboard)
            .unwrap_or_else(|| "No worker produced a result.".to_string());
        let synthesis_instructions = format!("Synthesize the following worker outputs into a final result.\n\n{synthesis_context}");
        let synthesis_pass = self
            .run_agent(&def.name, manager, Some(&synthesis_instructions), envelope, progress)
            .await;
        results.push(synthesis_pass);
        results
    }

    /// `spec.md` §4.9 graph strategy: runs agents in topological waves. A
    /// node with at least one incoming edge only runs if one of those edges'
    /// conditions is satisfied (OR semantics); otherwise it is recorded as
    /// skipped so its own dependents can still become ready.
    async fn execute_graph(
        &self,
        def: &CrewDefinition,
        envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<CrewStreamEvent>>,
    ) -> Vec<AgentResult> {
        let edges = def.graph.clone().unwrap_or_default();
        let mut completed: HashMap<String, AgentResult> = HashMap::new();
        let mut blackboard: Vec<BlackboardEntry> = Vec::new();
        let mut pending: Vec<&AgentDefinition> = def.agents.iter().collect();

        while !pending.is_empty() {
            let ready: Vec<&AgentDefinition> = pending
                .iter()
                .filter(|a| {
                    edges
                        .iter()
                        .filter(|e| e.to == a.id)
                        .all(|e| completed.contains_key(&e.from))
                })
                .copied()
                .collect();
            if ready.is_empty() {
                break;
            }

            let mut to_run = Vec::new();
            for agent in ready {
                let incoming: Vec<&GraphEdge> = edges.iter().filter(|e| e.to == agent.id).collect();
                let satisfied = incoming.is_empty()
                    || incoming.iter().any(|e| match e.condition.clone().unwrap_or_default() {
                        EdgeCondition::Always => true,
                        EdgeCondition::StatusEquals { status } => {
                            completed.get(&e.from).map(|r| r.status == status).unwrap_or(false)
                        }
                    });
                if satisfied {
                    to_run.push(agent);
                } else {
                    let skipped = AgentResult {
                        agent_id: agent.id.clone(),
                        status: AgentResultStatus::Failed,
                        result: None,
                        error: Some("skipped: no incoming edge condition was satisfied".to_string()),
                        budget_used: envelope.get_usage(),
                    };
                    blackboard.push(blackboard_entry(&skipped));
                    completed.insert(agent.id.clone(), skipped);
                }
            }

            let context = blackboard_snapshot(&blackboard);
            let futs = to_run
                .iter()
                .map(|agent| self.run_agent(&def.name, agent, context.as_deref(), envelope, progress));
            let ran_results = futures::future::join_all(futs).await;
            for (agent, result) in to_run.into_iter().zip(ran_results) {
                blackboard.push(blackboard_entry(&result));
                completed.insert(agent.id.clone(), result);
            }

            pending.retain(|a| !completed.contains_key(&a.id));
        }

        def.agents.iter().filter_map(|a| completed.remove(&a.id)).collect()
    }

    fn agent_config(&self, agent: &AgentDefinition) -> ExecutorConfig {
        let mut config = self.base_config;
        if let Some(max_iterations) = agent.max_iterations {
            match agent.execution_mode {
                ExecutionMode::Full => config.max_iterations = max_iterations,
                ExecutionMode::Direct => config.direct_max_iterations = max_iterations,
            }
        }
        config
    }

    async fn run_agent(
        &self,
        crew_name: &str,
        agent: &AgentDefinition,
        instructions_prefix: Option<&str>,
        parent_envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<CrewStreamEvent>>,
    ) -> AgentResult {
        if let Some(tx) = progress {
            let _ = tx.send(CrewStreamEvent::AgentStart {
                agent_id: agent.id.clone(),
            });
        }

        let sub_envelope = match parent_envelope.create_sub_envelope(agent.budget_share) {
            Ok(e) => e,
            Err(e) => {
                return AgentResult {
                    agent_id: agent.id.clone(),
                    status: AgentResultStatus::Failed,
                    result: None,
                    error: Some(e.one_line()),
                    budget_used: parent_envelope.get_usage(),
                }
            }
        };

        let tools = self.tools.create_filtered(agent.allowed_tools.as_deref()).await;
        let config = self.agent_config(agent);
        let description = match instructions_prefix {
            Some(prefix) => format!("{prefix}\n\n{}", agent.instructions),
            None => agent.instructions.clone(),
        };
        let task = Task::new(format!("{crew_name}-{}", agent.id), description);

        let max_retries = agent.max_retries.unwrap_or(0);
        let mut attempt = 0;
        let task_result = loop {
            let result = match agent.execution_mode {
                ExecutionMode::Full => {
                    let planner = Planner::new(self.router.clone(), self.trace.clone());
                    let executor = TaskExecutor::new(planner, self.router.clone(), tools.clone(), self.trace.clone(), config);
                    executor.execute_task(&task, &sub_envelope, None).await
                }
                ExecutionMode::Direct => {
                    let executor = DirectExecutor::new(self.router.clone(), tools.clone(), self.trace.clone(), config);
                    executor.execute_task(&task, &sub_envelope, None).await
                }
            };
            // spec.md §4.9: only retry failures that are not budget exhaustion.
            if result.status != TaskStatus::Failed || attempt >= max_retries {
                break result;
            }
            attempt += 1;
            if let Some(delay_ms) = agent.retry_delay_ms {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        };

        parent_envelope.mirror_from(&sub_envelope);
        let agent_result = AgentResult {
            agent_id: agent.id.clone(),
            status: if task_result.status == TaskStatus::Completed {
                AgentResultStatus::Completed
            } else {
                AgentResultStatus::Failed
            },
            result: task_result.result,
            error: task_result.error,
            budget_used: sub_envelope.get_usage(),
        };
        if let Some(tx) = progress {
            let _ = tx.send(CrewStreamEvent::AgentComplete {
                agent_result: agent_result.clone(),
            });
        }
        agent_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_types::{BudgetPreset, GraphEdge};

    fn agent(id: &str) -> AgentDefinition {
        AgentDefinition::new(id, "worker", "do the thing", 0.5)
    }

    #[test]
    fn validate_rejects_duplicate_agent_ids() {
        let def = CrewDefinition {
            name: "c".into(),
            strategy: CrewStrategy::Sequential,
            agents: vec![agent("a"), agent("a")],
            agent_order: None,
            graph: None,
            aggregation: Aggregation::Last,
        };
        assert!(validate_crew(&def).is_err());
    }

    #[test]
    fn validate_requires_graph_edges_for_graph_strategy() {
        let def = CrewDefinition {
            name: "c".into(),
            strategy: CrewStrategy::Graph,
            agents: vec![agent("a"), agent("b")],
            agent_order: None,
            graph: None,
            aggregation: Aggregation::Concat,
        };
        assert!(validate_crew(&def).is_err());
    }

    #[test]
    fn validate_detects_a_cycle() {
        let def = CrewDefinition {
            name: "c".into(),
            strategy: CrewStrategy::Graph,
            agents: vec![agent("a"), agent("b")],
            agent_order: None,
            graph: Some(vec![
                GraphEdge {
                    from: "a".into(),
                    to: "b".into(),
                    condition: None,
                },
                GraphEdge {
                    from: "b".into(),
                    to: "a".into(),
                    condition: None,
                },
            ]),
            aggregation: Aggregation::Concat,
        };
        let err = validate_crew(&def).unwrap_err();
        assert_eq!(err.code(), "CycleDetected");
    }

    #[test]
    fn validate_rejects_budget_share_sum_over_one() {
        let mut a = agent("a");
        a.budget_share = 0.7;
        let mut b = agent("b");
        b.budget_share = 0.7;
        let def = CrewDefinition {
            name: "c".into(),
            strategy: CrewStrategy::Parallel,
            agents: vec![a, b],
            agent_order: None,
            graph: None,
            aggregation: Aggregation::Concat,
        };
        assert!(validate_crew(&def).is_err());
    }

    #[test]
    fn extract_delegations_reads_a_bare_array_or_a_wrapped_object() {
        let bare = extract_delegations(r#"[{"agentId":"w1","instructions":"do x"}]"#);
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].agent_id, "w1");

        let wrapped = extract_delegations(r#"{"delegations":[{"agentId":"w2","instructions":"do y"}]}"#);
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].agent_id, "w2");

        assert!(extract_delegations("not json at all").is_empty());
    }

    #[test]
    fn validate_rejects_hierarchical_with_one_agent() {
        let def = CrewDefinition {
            name: "c".into(),
            strategy: CrewStrategy::Hierarchical,
            agents: vec![agent("manager")],
            agent_order: None,
            graph: None,
            aggregation: Aggregation::Last,
        };
        assert!(validate_crew(&def).is_err());
    }

    #[test]
    fn aggregate_concat_joins_every_result() {
        let results = vec![
            AgentResult {
                agent_id: "a".into(),
                status: AgentResultStatus::Completed,
                result: Some("one".into()),
                error: None,
                budget_used: BudgetEnvelope::from_preset(BudgetPreset::Low).get_usage(),
            },
            AgentResult {
                agent_id: "b".into(),
                status: AgentResultStatus::Completed,
                result: Some("two".into()),
                error: None,
                budget_used: BudgetEnvelope::from_preset(BudgetPreset::Low).get_usage(),
            },
        ];
        assert_eq!(aggregate(Aggregation::Concat, &results).unwrap(), "one\n\ntwo");
        assert_eq!(aggregate(Aggregation::Last, &results).unwrap(), "two");
    }
}
