//! Top-level kernel entry points (`spec.md` §6): `executeTask`,
//! `executeTaskStream`, `executeCrew`, `executeCrewStream`. Wires together
//! the Model Router (C4), Tool Registry (C3), Trace Logger (C2), Task/Direct
//! Executors (C7/C8) and Crew Orchestrator (C9) behind the one construction
//! point a host needs, mirroring the teacher's own `AppState`/`EngineLoop`
//! composition in `engine/src/main.rs`'s `build_state`.

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use vantage_budget::BudgetEnvelope;
use vantage_crew::CrewOrchestrator;
use vantage_executor::{DirectExecutor, TaskExecutor};
use vantage_observability::{emit_event, ObservabilityEvent};
use vantage_planner::Planner;
use vantage_providers::ModelRouter;
use vantage_tools::ToolRegistry;
use vantage_trace::TraceLogger;
use vantage_types::{
    CrewDefinition, CrewResult, CrewStreamEvent, ExecutionMode, ExecutorConfig, StreamEvent, Task,
    TaskResult, TaskStatus,
};

/// Per-call options for `execute_task`/`execute_task_stream` (`spec.md` §6's
/// `options` parameter; `spec.md` §9's builder-style-construction note keeps
/// the heavier wiring — router, tools, tracer — at `Kernel::new` time, so
/// this only carries what varies per call).
pub struct ExecuteOptions {
    pub envelope: BudgetEnvelope,
    pub mode: ExecutionMode,
}

impl ExecuteOptions {
    pub fn new(envelope: BudgetEnvelope, mode: ExecutionMode) -> Self {
        Self { envelope, mode }
    }
}

/// Composition root for the kernel's four public operations. Construction is
/// by composition, never mutual references (`spec.md` §9's cyclic-reference
/// note): `Kernel` owns the router/tools/tracer once and builds a fresh
/// `Planner`/`TaskExecutor`/`DirectExecutor`/`CrewOrchestrator` per call,
/// since those are cheap `Arc`/`Clone`-backed handles over the same state.
pub struct Kernel {
    router: Arc<ModelRouter>,
    tools: ToolRegistry,
    trace: TraceLogger,
    config: ExecutorConfig,
}

impl Kernel {
    pub fn new(router: Arc<ModelRouter>, tools: ToolRegistry, trace: TraceLogger, config: ExecutorConfig) -> Self {
        Self {
            router,
            tools,
            trace,
            config,
        }
    }

    /// `executeTask(task, options) -> TaskResult` (`spec.md` §6, blocking).
    pub async fn execute_task(&self, task: &Task, options: &ExecuteOptions) -> TaskResult {
        self.execute_task_with_progress(task, options, None).await
    }

    /// `executeTaskStream(task, options) -> AsyncSequence<StreamEvent>`
    /// (`spec.md` §6). The returned channel yields every `progress`/`chunk`
    /// event the executor emits, followed by exactly one terminal `result`
    /// (or `error`) event, then closes.
    pub fn execute_task_stream(&self, task: Task, options: ExecuteOptions) -> UnboundedReceiver<StreamEvent> {
        let (tx, rx) = unbounded_channel();
        let router = self.router.clone();
        let tools = self.tools.clone();
        let trace = self.trace.clone();
        let config = self.config;

        tokio::spawn(async move {
            let kernel = Kernel {
                router,
                tools,
                trace,
                config,
            };
            let result = kernel.execute_task_with_progress(&task, &options, Some(&tx)).await;
            let _ = tx.send(StreamEvent::Result {
                result: Box::new(result),
            });
        });
        rx
    }

    async fn execute_task_with_progress(
        &self,
        task: &Task,
        options: &ExecuteOptions,
        progress: Option<&tokio::sync::mpsc::UnboundedSender<StreamEvent>>,
    ) -> TaskResult {
        emit_event(
            tracing::Level::INFO,
            ObservabilityEvent::new("execute_task", "kernel")
                .with_task_id(&task.id)
                .with_status(match options.mode {
                    ExecutionMode::Full => "full",
                    ExecutionMode::Direct => "direct",
                }),
        );
        match options.mode {
            ExecutionMode::Full => {
                let planner = Planner::new(self.router.clone(), self.trace.clone());
                let executor = TaskExecutor::new(planner, self.router.clone(), self.tools.clone(), self.trace.clone(), self.config);
                executor.execute_task(task, &options.envelope, progress).await
            }
            ExecutionMode::Direct => {
                let executor = DirectExecutor::new(self.router.clone(), self.tools.clone(), self.trace.clone(), self.config);
                executor.execute_task(task, &options.envelope, progress).await
            }
        }
    }

    /// `executeCrew(crew, envelope) -> CrewResult` (`spec.md` §6).
    pub async fn execute_crew(&self, def: &CrewDefinition, envelope: &BudgetEnvelope) -> CrewResult {
        emit_event(
            tracing::Level::INFO,
            ObservabilityEvent::new("execute_crew", "kernel").with_detail(&def.name),
        );
        let orchestrator = CrewOrchestrator::new(self.router.clone(), self.tools.clone(), self.trace.clone(), self.config);
        orchestrator.execute_crew(def, envelope, None).await
    }

    /// `executeCrewStream(crew, envelope) -> AsyncSequence<CrewStreamEvent>`
    /// (`spec.md` §6): yields `agent-start`/`agent-complete` as each agent
    /// terminates, followed by exactly one `crew-complete`, then closes.
    pub fn execute_crew_stream(&self, def: CrewDefinition, envelope: BudgetEnvelope) -> UnboundedReceiver<CrewStreamEvent> {
        let (tx, rx) = unbounded_channel();
        let router = self.router.clone();
        let tools = self.tools.clone();
        let trace = self.trace.clone();
        let config = self.config;

        tokio::spawn(async move {
            let orchestrator = CrewOrchestrator::new(router, tools, trace, config);
            // `CrewComplete` is sent by the orchestrator itself, so the
            // channel needs no extra terminal send here.
            orchestrator.execute_crew(&def, &envelope, Some(&tx)).await;
        });
        rx
    }
}
