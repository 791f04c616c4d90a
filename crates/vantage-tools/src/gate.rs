//! Constitution Gate (C10): a pluggable policy object attached to the Tool
//! Registry (`spec.md` §4.10). Evaluated before every invocation against an
//! ordered rule set, the way `SpawnPolicy::evaluate` walks its rules in
//! `tandem-orchestrator::agent_team` and `PermissionManager::evaluate` walks
//! its wildcard rules in `tandem-core::permissions`.

use serde_json::Value;
use std::collections::HashSet;

/// Outcome of evaluating one tool invocation against the gate's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// No rule objected.
    Allowed,
    /// Non-fatal: becomes a tool failure, but is not treated as a policy
    /// breach severe enough to abort the caller's plan.
    Reportable { rule_id: String, description: String },
    /// Fatal for this invocation: the tool never executes.
    Critical { rule_id: String, description: String },
}

/// Capability interface the Tool Registry holds an optional slot for
/// (`SPEC_FULL.md` §9 design note: "The Constitution Gate is an optional
/// slot on the Tool Registry — use a capability interface").
pub trait ConstitutionGate: Send + Sync {
    fn evaluate(&self, tool_name: &str, tags: &[String], args: &Value) -> GateVerdict;
}

/// Tool names treated as high-risk regardless of tags, mirroring the
/// risky-name list `spec.md` §4.6 calls out for the Plan Simulator
/// (`file_write`, `shell_exec`).
const HIGH_RISK_TOOL_NAMES: &[&str] = &["shell_exec", "file_write", "bash", "write"];

/// Default policy (`SPEC_FULL.md` §11): denies shell/filesystem-write tools
/// outside an explicit allowlist as critical, and flags network egress to
/// non-allowlisted hosts as reportable.
pub struct DefaultConstitutionGate {
    pub dangerous_tool_allowlist: HashSet<String>,
    pub allowed_hosts: HashSet<String>,
}

impl Default for DefaultConstitutionGate {
    fn default() -> Self {
        Self {
            dangerous_tool_allowlist: HashSet::new(),
            allowed_hosts: HashSet::new(),
        }
    }
}

impl DefaultConstitutionGate {
    pub fn with_dangerous_allowlist(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.dangerous_tool_allowlist.extend(names);
        self
    }

    pub fn with_allowed_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.allowed_hosts.extend(hosts);
        self
    }

    fn is_dangerous(&self, tool_name: &str, tags: &[String]) -> bool {
        HIGH_RISK_TOOL_NAMES.contains(&tool_name) || tags.iter().any(|t| t == "dangerous")
    }

    fn extract_host(args: &Value) -> Option<String> {
        let raw = args.get("url").or_else(|| args.get("host"))?.as_str()?;
        let without_scheme = raw.split("://").last().unwrap_or(raw);
        without_scheme
            .split('/')
            .next()
            .map(|h| h.split(':').next().unwrap_or(h).to_string())
    }
}

impl ConstitutionGate for DefaultConstitutionGate {
    fn evaluate(&self, tool_name: &str, tags: &[String], args: &Value) -> GateVerdict {
        if self.is_dangerous(tool_name, tags) && !self.dangerous_tool_allowlist.contains(tool_name)
        {
            return GateVerdict::Critical {
                rule_id: "dangerous-tool-requires-allowlist".to_string(),
                description: format!(
                    "tool '{tool_name}' performs shell/filesystem writes and is not allowlisted"
                ),
            };
        }

        if tags.iter().any(|t| t == "network") && !self.allowed_hosts.is_empty() {
            if let Some(host) = Self::extract_host(args) {
                if !self.allowed_hosts.contains(&host) {
                    return GateVerdict::Reportable {
                        rule_id: "network-egress-not-allowlisted".to_string(),
                        description: format!("host '{host}' is not in the network allowlist"),
                    };
                }
            }
        }

        GateVerdict::Allowed
    }
}

/// A gate that allows everything — the registry's default when no policy is
/// configured, so construction never requires a policy decision up front.
pub struct PermissiveGate;

impl ConstitutionGate for PermissiveGate {
    fn evaluate(&self, _tool_name: &str, _tags: &[String], _args: &Value) -> GateVerdict {
        GateVerdict::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dangerous_tool_without_allowlist_is_critical() {
        let gate = DefaultConstitutionGate::default();
        let verdict = gate.evaluate("shell_exec", &[], &json!({}));
        assert!(matches!(verdict, GateVerdict::Critical { .. }));
    }

    #[test]
    fn allowlisted_dangerous_tool_passes() {
        let gate = DefaultConstitutionGate::default()
            .with_dangerous_allowlist(["shell_exec".to_string()]);
        let verdict = gate.evaluate("shell_exec", &[], &json!({}));
        assert_eq!(verdict, GateVerdict::Allowed);
    }

    #[test]
    fn network_tool_to_unlisted_host_is_reportable() {
        let gate = DefaultConstitutionGate::default()
            .with_allowed_hosts(["api.example.com".to_string()]);
        let verdict = gate.evaluate(
            "web_fetch",
            &["network".to_string()],
            &json!({"url": "https://evil.example.org/path"}),
        );
        assert!(matches!(verdict, GateVerdict::Reportable { .. }));
    }

    #[test]
    fn network_tool_to_allowlisted_host_passes() {
        let gate = DefaultConstitutionGate::default()
            .with_allowed_hosts(["api.example.com".to_string()]);
        let verdict = gate.evaluate(
            "web_fetch",
            &["network".to_string()],
            &json!({"url": "https://api.example.com/path"}),
        );
        assert_eq!(verdict, GateVerdict::Allowed);
    }

    #[test]
    fn permissive_gate_allows_everything() {
        let verdict = PermissiveGate.evaluate("shell_exec", &["dangerous".to_string()], &json!({}));
        assert_eq!(verdict, GateVerdict::Allowed);
    }
}
