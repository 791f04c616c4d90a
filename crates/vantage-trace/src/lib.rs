//! Trace Logger (C2): a hierarchical span tree keyed by `traceId`, with
//! concurrent appends and deep-copy read snapshots (`spec.md` §4.2, §5:
//! "readers never block writers").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use vantage_types::{BudgetLimits, ExecutionTrace, Span, TraceEvent, VantageError, VantageResult};

struct TraceState {
    trace: ExecutionTrace,
    /// Path of child indices from the root to the innermost currently-open
    /// span. Empty means the root itself is the innermost open span.
    open_path: Vec<usize>,
}

fn navigate_mut<'a>(root: &'a mut Span, path: &[usize]) -> &'a mut Span {
    let mut node = root;
    for &i in path {
        node = &mut node.children[i];
    }
    node
}

/// Owns the in-memory span tree for every live trace. `spec.md` §5: Trace
/// Logger state is keyed by `traceId` and must permit concurrent appends and
/// a read snapshot.
#[derive(Clone, Default)]
pub struct TraceLogger {
    traces: Arc<RwLock<HashMap<String, TraceState>>>,
}

impl TraceLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_trace(&self, trace_id: &str, task_id: &str, _allocated: BudgetLimits) {
        let mut traces = self.traces.write().await;
        traces.insert(
            trace_id.to_string(),
            TraceState {
                trace: ExecutionTrace::new(trace_id, task_id),
                open_path: Vec::new(),
            },
        );
    }

    pub async fn has_trace(&self, trace_id: &str) -> bool {
        self.traces.read().await.contains_key(trace_id)
    }

    /// `startSpan(traceId, name) -> spanId` (`spec.md` §4.2): opens a span as
    /// a child of the innermost currently-open span (LIFO nesting).
    pub async fn start_span(&self, trace_id: &str, name: &str) -> VantageResult<String> {
        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(trace_id)
            .ok_or_else(|| no_such_trace(trace_id))?;
        let span_id = uuid::Uuid::new_v4().to_string();
        let span = Span::new(span_id.clone(), name.to_string());
        let parent = navigate_mut(&mut state.trace.root, &state.open_path);
        let new_index = parent.children.len();
        parent.children.push(span);
        state.open_path.push(new_index);
        Ok(span_id)
    }

    /// `endSpan(traceId, spanId)` (`spec.md` §4.2): closes the innermost open
    /// span. Spans are a LIFO stack relative to the calling component, so
    /// `span_id` is used only to assert the caller is closing what it thinks
    /// it is closing.
    pub async fn end_span(&self, trace_id: &str, span_id: &str) -> VantageResult<()> {
        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(trace_id)
            .ok_or_else(|| no_such_trace(trace_id))?;
        if state.open_path.is_empty() {
            return Err(VantageError::ValidationError {
                detail: format!("no open span to close for trace {trace_id}"),
            });
        }
        {
            let span = navigate_mut(&mut state.trace.root, &state.open_path);
            if span.id != span_id {
                return Err(VantageError::ValidationError {
                    detail: format!(
                        "span close out of order: expected '{}', got '{span_id}'",
                        span.id
                    ),
                });
            }
            span.end_time = Some(chrono::Utc::now());
        }
        state.open_path.pop();
        Ok(())
    }

    /// `logEvent(traceId, type, data)` (`spec.md` §4.2): attaches to the
    /// innermost open span, or the synthetic root if none is open.
    pub async fn log_event(&self, trace_id: &str, event: TraceEvent) -> VantageResult<()> {
        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(trace_id)
            .ok_or_else(|| no_such_trace(trace_id))?;
        let span = navigate_mut(&mut state.trace.root, &state.open_path);
        span.events.push(event);
        Ok(())
    }

    /// `getTrace(traceId, currentUsage) -> ExecutionTrace` (`spec.md`
    /// §4.2): a deep-copy snapshot callers may serialize without
    /// coordinating with writers.
    pub async fn get_trace(&self, trace_id: &str) -> VantageResult<ExecutionTrace> {
        let traces = self.traces.read().await;
        traces
            .get(trace_id)
            .map(|s| s.trace.clone())
            .ok_or_else(|| no_such_trace(trace_id))
    }
}

fn no_such_trace(trace_id: &str) -> VantageError {
    VantageError::ValidationError {
        detail: format!("no such trace: {trace_id}"),
    }
}
