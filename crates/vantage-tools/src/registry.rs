//! Tool Registry and Invoker (C3, `spec.md` §4.3), grounded in
//! `tandem-tools::ToolRegistry`'s `Arc<RwLock<HashMap<..>>>` shape, widened
//! with schema-validated invocation, deadline racing, and a constitution
//! gate hook the teacher's registry does not have.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::gate::{ConstitutionGate, GateVerdict, PermissiveGate};
use crate::schema::{validate_schema_node, validate_value};

/// Where a tool definition originated (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSource {
    Builtin,
    Plugin,
    Mcp,
    Programmatic,
}

/// `spec.md` §4.3: `{toolName, input, timeoutMs?}`.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub input: Value,
    pub timeout_ms: Option<u64>,
}

/// `spec.md` §4.3: `{toolName, success, output?, error?, durationMs}`.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    fn failure(tool_name: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// `spec.md` §4.3: `{name, description, inputSchema, outputSchema, execute,
/// tags?, timeoutMs?, source, requiresConfirmation?}`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn output_schema(&self) -> Option<Value> {
        None
    }
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }
    fn timeout_ms(&self) -> Option<u64> {
        None
    }
    fn source(&self) -> ToolSource {
        ToolSource::Programmatic
    }
    fn requires_confirmation(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, cancel: CancellationToken) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// `createFiltered`/registration errors surfaced as validation problems
/// rather than the kernel-wide `VantageError`, since this crate has no
/// dependency on `vantage-types` other than what is re-exported for
/// convenience by downstream crates.
#[derive(Debug, Clone)]
pub struct SchemaError(pub String);

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SchemaError {}

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// `spec.md` §4.3 `ToolRegistry`. Clone is a shallow, shared-state clone
/// (same `Arc`s) — use `create_filtered` to get an independent *view* that
/// still shares tool definitions and the gate.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
    gate: Arc<dyn ConstitutionGate>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            gate: Arc::new(PermissiveGate),
        }
    }

    pub fn with_gate(gate: Arc<dyn ConstitutionGate>) -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            gate,
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<(), SchemaError> {
        validate_schema_node(&tool.input_schema(), "$input").map_err(SchemaError)?;
        if let Some(output_schema) = tool.output_schema() {
            validate_schema_node(&output_schema, "$output").map_err(SchemaError)?;
        }
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> bool {
        self.tools.write().await.remove(name).is_some()
    }

    pub async fn clear(&self) {
        self.tools.write().await.clear();
    }

    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        let mut list: Vec<_> = tools.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    pub async fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// `getToolDescriptions` (`spec.md` §4.3): a prompt-friendly projection.
    pub async fn get_tool_descriptions(&self) -> Vec<ToolDescription> {
        self.list()
            .await
            .into_iter()
            .map(|t| ToolDescription {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// `createFiltered(allowedTools?)` (`spec.md` §4.3): a shallow copy
    /// sharing tool definitions and the same gate. `None`/empty allowlist
    /// copies everything.
    pub async fn create_filtered(&self, allowed: Option<&[String]>) -> ToolRegistry {
        let source = self.tools.read().await;
        let filtered: HashMap<String, Arc<dyn Tool>> = match allowed {
            None => source.clone(),
            Some(names) if names.is_empty() => source.clone(),
            Some(names) => source
                .iter()
                .filter(|(name, _)| names.iter().any(|n| n == *name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        ToolRegistry {
            tools: Arc::new(RwLock::new(filtered)),
            gate: self.gate.clone(),
        }
    }

    /// `invoke(...)` (`spec.md` §4.3): the full schema-validated,
    /// deadline-raced, gate-checked invocation pipeline.
    pub async fn invoke(
        &self,
        invocation: ToolInvocation,
        cancel: CancellationToken,
    ) -> ToolResult {
        let started = Instant::now();
        let tool = match self.get(&invocation.tool_name).await {
            Some(t) => t,
            None => {
                return ToolResult::failure(
                    &invocation.tool_name,
                    format!("tool not found: {}", invocation.tool_name),
                    elapsed_ms(started),
                )
            }
        };

        match self
            .gate
            .evaluate(&tool.name().to_string(), &tool.tags(), &invocation.input)
        {
            GateVerdict::Critical {
                rule_id,
                description,
            } => {
                return ToolResult::failure(
                    &invocation.tool_name,
                    format!("constitution violation ({rule_id}): {description}"),
                    elapsed_ms(started),
                )
            }
            GateVerdict::Reportable {
                rule_id,
                description,
            } => {
                return ToolResult::failure(
                    &invocation.tool_name,
                    format!("policy warning ({rule_id}): {description}"),
                    elapsed_ms(started),
                )
            }
            GateVerdict::Allowed => {}
        }

        if let Err(reason) = validate_value(&tool.input_schema(), &invocation.input, "$input") {
            return ToolResult::failure(&invocation.tool_name, reason, elapsed_ms(started));
        }

        let deadline_ms = [
            invocation.timeout_ms,
            tool.timeout_ms(),
            Some(DEFAULT_TIMEOUT_MS),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(DEFAULT_TIMEOUT_MS);

        let child_cancel = cancel.child_token();
        let exec = tool.execute(invocation.input.clone(), child_cancel.clone());
        let outcome = tokio::select! {
            result = tokio::time::timeout(Duration::from_millis(deadline_ms), exec) => result,
            _ = cancel.cancelled() => {
                child_cancel.cancel();
                return ToolResult::failure(
                    &invocation.tool_name,
                    "tool invocation cancelled",
                    elapsed_ms(started),
                );
            }
        };

        let output = match outcome {
            Err(_elapsed) => {
                return ToolResult::failure(
                    &invocation.tool_name,
                    format!("Tool timed out after {deadline_ms}ms"),
                    elapsed_ms(started),
                )
            }
            Ok(Err(e)) => {
                return ToolResult::failure(&invocation.tool_name, e.to_string(), elapsed_ms(started))
            }
            Ok(Ok(v)) => v,
        };

        if let Some(output_schema) = tool.output_schema() {
            if let Err(reason) = validate_value(&output_schema, &output, "$output") {
                return ToolResult::failure(
                    &invocation.tool_name,
                    format!("output did not match schema: {reason}"),
                    elapsed_ms(started),
                );
            }
        }

        ToolResult {
            tool_name: invocation.tool_name,
            success: true,
            output: Some(output),
            error: None,
            duration_ms: elapsed_ms(started),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "test_tool"
        }
        fn description(&self) -> &str {
            "echoes its input back, prefixed"
        }
        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"input": {"type": "string"}},
                "required": ["input"],
            })
        }
        async fn execute(&self, input: Value, _cancel: CancellationToken) -> anyhow::Result<Value> {
            let text = input["input"].as_str().unwrap_or_default();
            Ok(json!({"result": format!("processed: {text}")}))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow_tool"
        }
        fn description(&self) -> &str {
            "never returns within the default deadline"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn timeout_ms(&self) -> Option<u64> {
            Some(20)
        }
        async fn execute(&self, _input: Value, _cancel: CancellationToken) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Value::Null)
        }
    }

    struct CountingTool(Arc<AtomicU32>);

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counting_tool"
        }
        fn description(&self) -> &str {
            "counts invocations"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, _cancel: CancellationToken) -> anyhow::Result<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn register_has_unregister_round_trip() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await.unwrap();
        assert!(registry.has("test_tool").await);
        assert!(registry.unregister("test_tool").await);
        assert!(!registry.has("test_tool").await);
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_tool_not_found() {
        let registry = ToolRegistry::new();
        let result = registry
            .invoke(
                ToolInvocation {
                    tool_name: "nope".into(),
                    input: Value::Null,
                    timeout_ms: None,
                },
                CancellationToken::new(),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn invoke_happy_path_returns_output() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await.unwrap();
        let result = registry
            .invoke(
                ToolInvocation {
                    tool_name: "test_tool".into(),
                    input: json!({"input": "hello"}),
                    timeout_ms: None,
                },
                CancellationToken::new(),
            )
            .await;
        assert!(result.success);
        assert_eq!(
            result.output.unwrap(),
            json!({"result": "processed: hello"})
        );
    }

    #[tokio::test]
    async fn invoke_rejects_input_not_matching_schema() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await.unwrap();
        let result = registry
            .invoke(
                ToolInvocation {
                    tool_name: "test_tool".into(),
                    input: json!({}),
                    timeout_ms: None,
                },
                CancellationToken::new(),
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn invoke_honors_tool_timeout() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).await.unwrap();
        let result = registry
            .invoke(
                ToolInvocation {
                    tool_name: "slow_tool".into(),
                    input: Value::Null,
                    timeout_ms: None,
                },
                CancellationToken::new(),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn create_filtered_with_identical_allowlist_has_identical_names() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await.unwrap();
        registry
            .register(Arc::new(CountingTool(Arc::new(AtomicU32::new(0)))))
            .await
            .unwrap();
        let allow = vec!["test_tool".to_string()];
        let a = registry.create_filtered(Some(&allow)).await;
        let b = registry.create_filtered(Some(&allow)).await;
        assert_eq!(a.list_names().await, b.list_names().await);
        assert_eq!(a.list_names().await, vec!["test_tool".to_string()]);
    }

    #[tokio::test]
    async fn registering_array_schema_without_items_is_rejected() {
        struct BadTool;
        #[async_trait]
        impl Tool for BadTool {
            fn name(&self) -> &str {
                "bad_tool"
            }
            fn description(&self) -> &str {
                "has a malformed schema"
            }
            fn input_schema(&self) -> Value {
                json!({"type": "array"})
            }
            async fn execute(&self, _input: Value, _cancel: CancellationToken) -> anyhow::Result<Value> {
                Ok(Value::Null)
            }
        }
        let registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(BadTool)).await.is_err());
    }
}
