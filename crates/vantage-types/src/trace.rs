use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed trace-event kinds (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    StateTransition {
        timestamp: DateTime<Utc>,
        from: String,
        to: String,
    },
    RoutingDecision {
        timestamp: DateTime<Utc>,
        data: Value,
    },
    ToolInvocation {
        timestamp: DateTime<Utc>,
        data: Value,
    },
    Escalation {
        timestamp: DateTime<Utc>,
        reason: String,
    },
    Replan {
        timestamp: DateTime<Utc>,
        reason: String,
        depth: u32,
    },
    ConfidenceUpdate {
        timestamp: DateTime<Utc>,
        step_index: usize,
        confidence: f64,
    },
    StrategySelected {
        timestamp: DateTime<Utc>,
        step_index: usize,
        data: Value,
    },
    SpecGenerated {
        timestamp: DateTime<Utc>,
        data: Value,
    },
    PlanCritique {
        timestamp: DateTime<Utc>,
        data: Value,
    },
    SimulationResult {
        timestamp: DateTime<Utc>,
        data: Value,
    },
    GoalCheckpoint {
        timestamp: DateTime<Utc>,
        on_track: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drift: Option<String>,
    },
    BudgetExhausted {
        timestamp: DateTime<Utc>,
        ceiling: String,
    },
    Error {
        timestamp: DateTime<Utc>,
        message: String,
    },
    Info {
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl TraceEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TraceEvent::StateTransition { timestamp, .. }
            | TraceEvent::RoutingDecision { timestamp, .. }
            | TraceEvent::ToolInvocation { timestamp, .. }
            | TraceEvent::Escalation { timestamp, .. }
            | TraceEvent::Replan { timestamp, .. }
            | TraceEvent::ConfidenceUpdate { timestamp, .. }
            | TraceEvent::StrategySelected { timestamp, .. }
            | TraceEvent::SpecGenerated { timestamp, .. }
            | TraceEvent::PlanCritique { timestamp, .. }
            | TraceEvent::SimulationResult { timestamp, .. }
            | TraceEvent::GoalCheckpoint { timestamp, .. }
            | TraceEvent::BudgetExhausted { timestamp, .. }
            | TraceEvent::Error { timestamp, .. }
            | TraceEvent::Info { timestamp, .. } => *timestamp,
        }
    }
}

/// A span in the hierarchical span tree (`spec.md` §3, §4.2). Spans are
/// opened LIFO and must be closed on every exit path; `end_time` is `None`
/// while open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
    #[serde(default)]
    pub children: Vec<Span>,
}

impl Span {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            events: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// The serializable execution trace produced by `getTrace` (`spec.md` §3,
/// §4.2). A deep-copy snapshot: mutating the live span tree afterward never
/// affects an already-returned `ExecutionTrace`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    pub trace_id: String,
    pub task_id: String,
    pub root: Span,
}

impl ExecutionTrace {
    pub fn new(trace_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        Self {
            root: Span::new(format!("{trace_id}-root"), "root"),
            trace_id,
            task_id: task_id.into(),
        }
    }

    /// Flattens the span tree's events in depth-first, document order —
    /// used by the round-trip property in `spec.md` §8 ("the flat event list
    /// equals the sequence of `logEvent` calls made while spans were open").
    pub fn flat_events(&self) -> Vec<&TraceEvent> {
        fn walk<'a>(span: &'a Span, out: &mut Vec<&'a TraceEvent>) {
            out.extend(span.events.iter());
            for child in &span.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trace_has_an_open_root_span() {
        let trace = ExecutionTrace::new("tr-1", "t-1");
        assert!(trace.root.is_open());
        assert!(trace.flat_events().is_empty());
    }
}
