//! Model Router (C4, `spec.md` §4.4): tier decision, candidate collection,
//! weighted ranking, failover/cooldown, and escalation. Grounded in
//! `tandem_providers::ProviderRegistry`'s `Arc<RwLock<..>>`-backed provider
//! list and `select_provider` fallback chain, widened with the scoring and
//! cooldown machinery the teacher's registry does not need (it has exactly
//! one caller-chosen provider, not a priority-ranked tier).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vantage_budget::BudgetEnvelope;
use vantage_types::{EnergyConfig, ModelInfo, Purpose, RoutingConfig, RoutingDecision, Tier, VantageError, VantageResult};

use crate::provider::Provider;

const FAILURE_THRESHOLD: u32 = 3;
const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Default)]
struct FailureState {
    count: u32,
    last_failure: Option<Instant>,
}

/// Optional routing context (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingContext {
    pub complexity: Option<f64>,
    pub previous_confidence: Option<f64>,
    pub energy_budget_remaining_wh: Option<f64>,
}

struct Candidate {
    provider_id: String,
    model: ModelInfo,
    priority_index: usize,
    estimated_cost: f64,
    estimated_energy_wh: f64,
}

/// A representative token count used to estimate per-call cost/energy
/// before a request is actually sent. `spec.md` does not pin a figure; 1000
/// prompt + 500 completion tokens is a conventional estimation unit, noted
/// as an implementer default in `DESIGN.md`.
const ESTIMATE_PROMPT_TOKENS: f64 = 1000.0;
const ESTIMATE_COMPLETION_TOKENS: f64 = 500.0;

pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    provider_priority: HashMap<Tier, Vec<String>>,
    failures: Mutex<HashMap<String, FailureState>>,
    routing_config: RoutingConfig,
    energy_config: EnergyConfig,
}

impl ModelRouter {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        provider_priority: HashMap<Tier, Vec<String>>,
        routing_config: RoutingConfig,
        energy_config: EnergyConfig,
    ) -> Self {
        let providers = providers.into_iter().map(|p| (p.id().to_string(), p)).collect();
        Self {
            providers,
            provider_priority,
            failures: Mutex::new(HashMap::new()),
            routing_config,
            energy_config,
        }
    }

    /// Resolves a provider previously returned in a `RoutingDecision`, for
    /// callers (Planner, Task Executor, Direct Executor) that need to issue
    /// the actual `chat` call the decision was made for.
    pub fn get_provider(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Tier decision rules (`spec.md` §4.4), checked in priority order.
    fn decide_tier(&self, purpose: Purpose, envelope: &BudgetEnvelope, context: RoutingContext) -> Tier {
        if matches!(purpose, Purpose::Classify | Purpose::Verify) {
            return Tier::Slm;
        }
        if !envelope.can_afford_escalation() {
            return Tier::Slm;
        }
        if self.energy_config.enabled {
            if let Some(remaining) = context.energy_budget_remaining_wh {
                if remaining < self.energy_config.critical_wh {
                    return Tier::Slm;
                }
            }
        }
        if let Some(complexity) = context.complexity {
            if complexity > self.routing_config.complexity_threshold {
                return Tier::Llm;
            }
        }
        if let Some(confidence) = context.previous_confidence {
            if confidence < self.routing_config.slm_confidence_threshold {
                return Tier::Llm;
            }
        }
        Tier::Slm
    }

    async fn collect_candidates(&self, tier: Tier) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let Some(priority) = self.provider_priority.get(&tier) else {
            return candidates;
        };
        for (index, provider_id) in priority.iter().enumerate() {
            if self.in_cooldown(provider_id) {
                continue;
            }
            let Some(provider) = self.providers.get(provider_id) else {
                continue;
            };
            if !provider.is_available().await {
                continue;
            }
            let models = provider.list_models().await;
            let Some(model) = models.into_iter().find(|m| m.tier == tier) else {
                continue;
            };
            let estimated_cost = ESTIMATE_PROMPT_TOKENS * model.cost_per_input_token.unwrap_or(0.0)
                + ESTIMATE_COMPLETION_TOKENS * model.cost_per_output_token.unwrap_or(0.0);
            let estimated_energy_wh = ESTIMATE_PROMPT_TOKENS
                * model.energy_per_input_token_wh.unwrap_or(0.0)
                + ESTIMATE_COMPLETION_TOKENS * model.energy_per_output_token_wh.unwrap_or(0.0);
            candidates.push(Candidate {
                provider_id: provider_id.clone(),
                model,
                priority_index: index,
                estimated_cost,
                estimated_energy_wh,
            });
        }
        candidates
    }

    /// Weighted ranking (`spec.md` §4.4). Falls back to highest priority when
    /// `preferEfficientModels` is off or there is only one candidate.
    fn rank<'a>(&self, candidates: &'a [Candidate], envelope: &BudgetEnvelope) -> &'a Candidate {
        if !self.routing_config.prefer_efficient_models || candidates.len() == 1 {
            return candidates
                .iter()
                .min_by_key(|c| c.priority_index)
                .expect("candidates is non-empty");
        }

        let usage = envelope.get_usage();
        let total_cost_span = usage.cost_usd + usage.cost_remaining;
        let budget_tightness = if total_cost_span > 0.0 {
            1.0 - usage.cost_remaining / total_cost_span
        } else {
            0.0
        };
        let cost_weight = 0.5 + 0.3 * budget_tightness;
        let energy_weight = if self.energy_config.enabled {
            self.energy_config.energy_weight.unwrap_or(0.3)
        } else {
            0.0
        };
        let priority_weight = (1.0 - cost_weight - energy_weight).max(0.0);

        let max_cost = candidates
            .iter()
            .map(|c| c.estimated_cost)
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON);
        let max_energy = candidates
            .iter()
            .map(|c| c.estimated_energy_wh)
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON);
        let n = candidates.len() as f64;

        let mut best: Option<(&Candidate, f64)> = None;
        for candidate in candidates {
            let cost_score = 1.0 - candidate.estimated_cost / max_cost;
            let energy_score = 1.0 - candidate.estimated_energy_wh / max_energy;
            let priority_score = 1.0 - candidate.priority_index as f64 / n;
            let total = cost_weight * cost_score + energy_weight * energy_score + priority_weight * priority_score;
            // Candidates are visited in priority order, so keeping the
            // first candidate on a tie already breaks ties by lowest index.
            match &best {
                Some((_, best_total)) if *best_total >= total => {}
                _ => best = Some((candidate, total)),
            }
        }
        best.expect("candidates is non-empty").0
    }

    /// `route(purpose, envelope, context)` (`spec.md` §4.4).
    pub async fn route(
        &self,
        purpose: Purpose,
        envelope: &BudgetEnvelope,
        context: RoutingContext,
    ) -> VantageResult<RoutingDecision> {
        let tier = self.decide_tier(purpose, envelope, context);
        let candidates = self.collect_candidates(tier).await;
        if candidates.is_empty() {
            return Err(VantageError::NoAvailableProvider {
                tier: tier.as_str().to_string(),
                purpose: purpose.as_str().to_string(),
            });
        }
        let winner = self.rank(&candidates, envelope);
        Ok(RoutingDecision {
            tier,
            provider: winner.provider_id.clone(),
            model: winner.model.id.clone(),
            reason: format!(
                "purpose={} tier={} complexity={:.2} candidates={}",
                purpose.as_str(),
                tier.as_str(),
                context.complexity.unwrap_or(0.0),
                candidates.len()
            ),
            estimated_cost: winner.estimated_cost,
            estimated_energy_wh: winner.estimated_energy_wh,
        })
    }

    fn in_cooldown(&self, provider_id: &str) -> bool {
        let failures = self.failures.lock().unwrap();
        match failures.get(provider_id) {
            Some(state) if state.count >= FAILURE_THRESHOLD => state
                .last_failure
                .is_some_and(|at| at.elapsed() < COOLDOWN),
            _ => false,
        }
    }

    /// `reportFailure(provider)` (`spec.md` §4.4).
    pub fn report_failure(&self, provider_id: &str) {
        let mut failures = self.failures.lock().unwrap();
        let state = failures.entry(provider_id.to_string()).or_default();
        state.count += 1;
        state.last_failure = Some(Instant::now());
    }

    /// `reportSuccess(provider)` (`spec.md` §4.4).
    pub fn report_success(&self, provider_id: &str) {
        self.failures.lock().unwrap().remove(provider_id);
    }

    /// `escalate(env, reason)` (`spec.md` §4.4): consumes one escalation and
    /// re-routes `execute` at forced maximum complexity to obtain an LLM.
    pub async fn escalate(
        &self,
        envelope: &BudgetEnvelope,
        _reason: &str,
    ) -> VantageResult<RoutingDecision> {
        if !envelope.can_afford_escalation() {
            return Err(VantageError::BudgetExhausted {
                ceiling: "maxEscalations".to_string(),
                used: 0.0,
                limit: 0.0,
            });
        }
        envelope.deduct_escalation();
        self.route(
            Purpose::Execute,
            envelope,
            RoutingContext {
                complexity: Some(1.0),
                previous_confidence: None,
                energy_budget_remaining_wh: None,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use vantage_types::{BudgetPreset, ModelRequest, ModelResponse};

    struct StubProvider {
        id: &'static str,
        available: bool,
        models: Vec<ModelInfo>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            self.id
        }
        async fn is_available(&self) -> bool {
            self.available
        }
        async fn list_models(&self) -> Vec<ModelInfo> {
            self.models.clone()
        }
        async fn chat(
            &self,
            _request: ModelRequest,
            _cancel: CancellationToken,
        ) -> anyhow::Result<ModelResponse> {
            anyhow::bail!("stub provider does not execute requests")
        }
    }

    fn model(id: &str, tier: Tier) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            name: id.to_string(),
            tier,
            context_window: 8192,
            cost_per_input_token: Some(0.000001),
            cost_per_output_token: Some(0.000002),
            energy_per_input_token_wh: Some(0.0000001),
            energy_per_output_token_wh: Some(0.0000002),
        }
    }

    fn router_with(providers: Vec<Arc<dyn Provider>>) -> ModelRouter {
        let mut priority = HashMap::new();
        priority.insert(
            Tier::Llm,
            providers.iter().map(|p| p.id().to_string()).collect(),
        );
        priority.insert(Tier::Slm, providers.iter().map(|p| p.id().to_string()).collect());
        ModelRouter::new(providers, priority, RoutingConfig::default(), EnergyConfig::default())
    }

    #[tokio::test]
    async fn classify_purpose_always_routes_to_slm() {
        let router = router_with(vec![Arc::new(StubProvider {
            id: "p1",
            available: true,
            models: vec![model("slm-1", Tier::Slm), model("llm-1", Tier::Llm)],
        })]);
        let envelope = BudgetEnvelope::from_preset(BudgetPreset::Medium);
        let decision = router
            .route(Purpose::Classify, &envelope, RoutingContext::default())
            .await
            .unwrap();
        assert_eq!(decision.tier, Tier::Slm);
    }

    #[tokio::test]
    async fn high_complexity_execute_routes_to_llm() {
        let router = router_with(vec![Arc::new(StubProvider {
            id: "p1",
            available: true,
            models: vec![model("slm-1", Tier::Slm), model("llm-1", Tier::Llm)],
        })]);
        let envelope = BudgetEnvelope::from_preset(BudgetPreset::Medium);
        let decision = router
            .route(
                Purpose::Execute,
                &envelope,
                RoutingContext {
                    complexity: Some(0.9),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(decision.tier, Tier::Llm);
    }

    #[tokio::test]
    async fn no_escalation_budget_forces_slm_even_for_execute() {
        let router = router_with(vec![Arc::new(StubProvider {
            id: "p1",
            available: true,
            models: vec![model("slm-1", Tier::Slm), model("llm-1", Tier::Llm)],
        })]);
        let envelope = BudgetEnvelope::from_preset(BudgetPreset::Low);
        while envelope.can_afford_escalation() {
            envelope.deduct_escalation();
        }
        let decision = router
            .route(
                Purpose::Execute,
                &envelope,
                RoutingContext {
                    complexity: Some(1.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(decision.tier, Tier::Slm);
    }

    #[tokio::test]
    async fn unavailable_provider_yields_no_available_provider() {
        let router = router_with(vec![Arc::new(StubProvider {
            id: "p1",
            available: false,
            models: vec![model("slm-1", Tier::Slm)],
        })]);
        let envelope = BudgetEnvelope::from_preset(BudgetPreset::Medium);
        let result = router
            .route(Purpose::Classify, &envelope, RoutingContext::default())
            .await;
        assert!(matches!(result, Err(VantageError::NoAvailableProvider { .. })));
    }

    #[tokio::test]
    async fn three_failures_put_a_provider_into_cooldown() {
        let router = router_with(vec![
            Arc::new(StubProvider {
                id: "flaky",
                available: true,
                models: vec![model("slm-flaky", Tier::Slm)],
            }),
            Arc::new(StubProvider {
                id: "steady",
                available: true,
                models: vec![model("slm-steady", Tier::Slm)],
            }),
        ]);
        router.report_failure("flaky");
        router.report_failure("flaky");
        router.report_failure("flaky");
        assert!(router.in_cooldown("flaky"));
        router.report_success("flaky");
        assert!(!router.in_cooldown("flaky"));
    }

    /// `spec.md` §8 scenario 6: three consecutive `reportFailure` within the
    /// cooldown window push `ollama` out of candidate collection, so
    /// `anthropic` wins on priority; a later `reportSuccess` un-cools it.
    #[tokio::test]
    async fn router_fails_over_to_the_next_priority_provider_under_cooldown() {
        let router = ModelRouter::new(
            vec![
                Arc::new(StubProvider {
                    id: "ollama",
                    available: true,
                    models: vec![model("ollama-slm", Tier::Slm)],
                }),
                Arc::new(StubProvider {
                    id: "anthropic",
                    available: true,
                    models: vec![model("anthropic-slm", Tier::Slm)],
                }),
            ],
            {
                let mut priority = HashMap::new();
                priority.insert(Tier::Slm, vec!["ollama".to_string(), "anthropic".to_string()]);
                priority
            },
            RoutingConfig::default(),
            EnergyConfig::default(),
        );
        let envelope = BudgetEnvelope::from_preset(BudgetPreset::Medium);

        let decision = router.route(Purpose::Classify, &envelope, RoutingContext::default()).await.unwrap();
        assert_eq!(decision.provider, "ollama");

        router.report_failure("ollama");
        router.report_failure("ollama");
        router.report_failure("ollama");

        let decision = router.route(Purpose::Classify, &envelope, RoutingContext::default()).await.unwrap();
        assert_eq!(decision.provider, "anthropic");

        router.report_success("ollama");
        let decision = router.route(Purpose::Classify, &envelope, RoutingContext::default()).await.unwrap();
        assert_eq!(decision.provider, "ollama");
    }

    #[tokio::test]
    async fn escalate_consumes_one_escalation_and_forces_llm() {
        let router = router_with(vec![Arc::new(StubProvider {
            id: "p1",
            available: true,
            models: vec![model("slm-1", Tier::Slm), model("llm-1", Tier::Llm)],
        })]);
        let envelope = BudgetEnvelope::from_preset(BudgetPreset::Medium);
        let usage_before = envelope.get_usage().escalations_used;
        let decision = router.escalate(&envelope, "low confidence").await.unwrap();
        assert_eq!(decision.tier, Tier::Llm);
        assert_eq!(envelope.get_usage().escalations_used, usage_before + 1);
    }
}
