//! Budget Manager (C1): envelope creation and atomic, sticky-exhausted
//! deduction (`spec.md` §4.1). A `BudgetEnvelope` is a cheap `Arc`-backed
//! handle so it can be shared across every coroutine of a task and mirrored
//! between a crew sub-envelope and its parent (`spec.md` §5).

use std::sync::Mutex;
use std::time::Instant;

use vantage_types::{BudgetLimits, BudgetPreset, BudgetState, BudgetUsage, VantageError, VantageResult};

/// Per-token pricing for a single model, used by `deduct_tokens` to derive
/// cost internally (`SPEC_FULL.md` §9 open-question decision #1: this is
/// the *only* path that touches cost for a token-priced LLM call).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPricing {
    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
    pub energy_per_input_token_wh: f64,
    pub energy_per_output_token_wh: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

struct Inner {
    limits: BudgetLimits,
    state: BudgetState,
    created_at: Instant,
}

/// `spec.md` §3 `BudgetEnvelope`. Clone is cheap (shared handle); all
/// mutators take `&self` and lock a short-lived mutex internally — there is
/// never an await point inside the critical section, so the lock never
/// blocks a scheduler thread for long.
#[derive(Clone)]
pub struct BudgetEnvelope {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl BudgetEnvelope {
    pub fn from_preset(preset: BudgetPreset) -> Self {
        Self::from_limits(preset.limits())
    }

    pub fn from_limits(limits: BudgetLimits) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(Inner {
                limits,
                state: BudgetState::default(),
                created_at: Instant::now(),
            })),
        }
    }

    fn tick_elapsed(inner: &mut Inner) {
        inner.state.elapsed_ms = inner.created_at.elapsed().as_millis() as u64;
        if inner.limits.enforced && inner.state.elapsed_ms >= inner.limits.max_latency_ms {
            inner.state.exceeded = true;
        }
    }

    /// `deductTokens(env, usage, model)` (`spec.md` §4.1). Accumulates
    /// `tokensUsed` and derives `costUsd`/`energyWh` from `pricing`. Always
    /// records usage (clamped at the ceiling when it would overflow) and
    /// marks the envelope sticky-exhausted on overflow, per §4.1's
    /// "deductions that would exceed a limit still record up to the limit".
    pub fn deduct_tokens(&self, usage: TokenUsage, pricing: TokenPricing) {
        let mut inner = self.inner.lock().unwrap();
        let delta = usage.total();
        let limit = inner.limits.max_tokens;
        let would_be = inner.state.tokens_used.saturating_add(delta);
        if inner.limits.enforced && would_be > limit {
            inner.state.tokens_used = limit;
            inner.state.exceeded = true;
        } else {
            inner.state.tokens_used = would_be;
        }
        inner.state.cost_usd += usage.prompt_tokens as f64 * pricing.cost_per_input_token
            + usage.completion_tokens as f64 * pricing.cost_per_output_token;
        if inner.limits.enforced && inner.state.cost_usd > inner.limits.cost_ceiling_usd {
            inner.state.exceeded = true;
        }
        Self::tick_elapsed(&mut inner);
    }

    /// `deductCost(env, usd)` (`spec.md` §4.1) — reserved for spend that is
    /// not derived from token usage (e.g. a flat per-call surcharge). Never
    /// call this for the same unit of work already priced via
    /// `deduct_tokens` (see `SPEC_FULL.md` §9 decision #1).
    pub fn deduct_cost(&self, usd: f64) {
        if cfg!(debug_assertions) && usd <= 0.0 {
            tracing::warn!(usd, "deduct_cost called with a non-positive amount; did deduct_tokens already account for this?");
        }
        let mut inner = self.inner.lock().unwrap();
        inner.state.cost_usd += usd;
        if inner.limits.enforced && inner.state.cost_usd > inner.limits.cost_ceiling_usd {
            inner.state.exceeded = true;
        }
        Self::tick_elapsed(&mut inner);
    }

    /// `deductEnergy(env, model, tokenUsage, energyConfig)` (`spec.md`
    /// §4.1). A no-op when energy routing is disabled upstream — callers
    /// only invoke this when they intend to track energy.
    pub fn deduct_energy(&self, usage: TokenUsage, pricing: TokenPricing) {
        let mut inner = self.inner.lock().unwrap();
        inner.state.energy_wh += usage.prompt_tokens as f64 * pricing.energy_per_input_token_wh
            + usage.completion_tokens as f64 * pricing.energy_per_output_token_wh;
        if inner.limits.enforced && inner.state.energy_wh > inner.limits.max_energy_wh {
            inner.state.exceeded = true;
        }
        Self::tick_elapsed(&mut inner);
    }

    pub fn deduct_tool_call(&self) {
        let mut inner = self.inner.lock().unwrap();
        let limit = inner.limits.max_tool_calls;
        let would_be = inner.state.tool_calls_used.saturating_add(1);
        if inner.limits.enforced && would_be > limit {
            inner.state.tool_calls_used = limit;
            inner.state.exceeded = true;
        } else {
            inner.state.tool_calls_used = would_be;
        }
        Self::tick_elapsed(&mut inner);
    }

    pub fn deduct_escalation(&self) {
        let mut inner = self.inner.lock().unwrap();
        let limit = inner.limits.max_escalations;
        let would_be = inner.state.escalations_used.saturating_add(1);
        if inner.limits.enforced && would_be > limit {
            inner.state.escalations_used = limit;
            inner.state.exceeded = true;
        } else {
            inner.state.escalations_used = would_be;
        }
        Self::tick_elapsed(&mut inner);
    }

    /// `checkBudget(env)` (`spec.md` §4.1): `Err(BudgetExhausted)` iff any
    /// ceiling is exceeded (sticky — once tripped, always tripped).
    pub fn check_budget(&self) -> VantageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::tick_elapsed(&mut inner);
        if !inner.limits.enforced {
            return Ok(());
        }

        let breach = if inner.state.exceeded {
            Some(("envelope".to_string(), 1.0, 1.0))
        } else if inner.state.tokens_used >= inner.limits.max_tokens {
            Some((
                "maxTokens".to_string(),
                inner.state.tokens_used as f64,
                inner.limits.max_tokens as f64,
            ))
        } else if inner.state.tool_calls_used >= inner.limits.max_tool_calls {
            Some((
                "maxToolCalls".to_string(),
                inner.state.tool_calls_used as f64,
                inner.limits.max_tool_calls as f64,
            ))
        } else if inner.state.escalations_used >= inner.limits.max_escalations {
            Some((
                "maxEscalations".to_string(),
                inner.state.escalations_used as f64,
                inner.limits.max_escalations as f64,
            ))
        } else if inner.state.elapsed_ms >= inner.limits.max_latency_ms {
            Some((
                "maxLatencyMs".to_string(),
                inner.state.elapsed_ms as f64,
                inner.limits.max_latency_ms as f64,
            ))
        } else if inner.state.cost_usd >= inner.limits.cost_ceiling_usd {
            Some((
                "costCeilingUsd".to_string(),
                inner.state.cost_usd,
                inner.limits.cost_ceiling_usd,
            ))
        } else if inner.state.energy_wh >= inner.limits.max_energy_wh {
            Some((
                "maxEnergyWh".to_string(),
                inner.state.energy_wh,
                inner.limits.max_energy_wh,
            ))
        } else {
            None
        };

        match breach {
            Some((ceiling, used, limit)) => {
                inner.state.exceeded = true;
                Err(VantageError::BudgetExhausted {
                    ceiling,
                    used,
                    limit,
                })
            }
            None => Ok(()),
        }
    }

    /// `canAffordEscalation(env)` (`spec.md` §4.1).
    pub fn can_afford_escalation(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        !inner.limits.enforced || inner.state.escalations_used < inner.limits.max_escalations
    }

    /// `getUsage(env)` (`spec.md` §4.1).
    pub fn get_usage(&self) -> BudgetUsage {
        let mut inner = self.inner.lock().unwrap();
        Self::tick_elapsed(&mut inner);
        let l = inner.limits;
        let s = inner.state;
        BudgetUsage {
            tokens_used: s.tokens_used,
            tokens_remaining: l.max_tokens.saturating_sub(s.tokens_used),
            tool_calls_used: s.tool_calls_used,
            tool_calls_remaining: l.max_tool_calls.saturating_sub(s.tool_calls_used),
            escalations_used: s.escalations_used,
            escalations_remaining: l.max_escalations.saturating_sub(s.escalations_used),
            cost_usd: s.cost_usd,
            cost_remaining: (l.cost_ceiling_usd - s.cost_usd).max(0.0),
            elapsed_ms: s.elapsed_ms,
            latency_remaining_ms: l.max_latency_ms.saturating_sub(s.elapsed_ms),
            energy_wh: s.energy_wh,
            exceeded: s.exceeded,
        }
    }

    pub fn is_exceeded(&self) -> bool {
        self.check_budget().is_err()
    }

    /// `createSubEnvelope(parent, share)` (`spec.md` §4.1): a fresh envelope
    /// scaled by `share` of the parent's *allocated* ceilings (not its
    /// remaining usage — each sub-envelope gets its own full share to spend
    /// regardless of what the parent has already used).
    pub fn create_sub_envelope(&self, share: f64) -> VantageResult<BudgetEnvelope> {
        if !(0.0 < share && share <= 1.0) {
            return Err(VantageError::ValidationError {
                detail: format!("budgetShare must be in (0,1], got {share}"),
            });
        }
        let inner = self.inner.lock().unwrap();
        let l = inner.limits;
        let scaled = BudgetLimits {
            max_tokens: ((l.max_tokens as f64) * share) as u64,
            max_tool_calls: ((l.max_tool_calls as f64) * share).ceil() as u64,
            max_escalations: ((l.max_escalations as f64) * share).ceil() as u64,
            max_latency_ms: l.max_latency_ms,
            cost_ceiling_usd: l.cost_ceiling_usd * share,
            max_energy_wh: l.max_energy_wh * share,
            enforced: l.enforced,
        };
        Ok(BudgetEnvelope::from_limits(scaled))
    }

    /// `mirror(sub -> parent)` (`spec.md` §4.1): applied once a crew agent
    /// terminates, folding its sub-envelope's consumption into the parent so
    /// the parent's `tokensUsed` always equals the sum of its sub-envelopes'
    /// spends (see `spec.md` §8 scenario 5).
    pub fn mirror_from(&self, sub: &BudgetEnvelope) {
        let sub_state = {
            let sub_inner = sub.inner.lock().unwrap();
            sub_inner.state
        };
        let mut inner = self.inner.lock().unwrap();
        inner.state.tokens_used = inner.state.tokens_used.saturating_add(sub_state.tokens_used);
        inner.state.tool_calls_used = inner
            .state
            .tool_calls_used
            .saturating_add(sub_state.tool_calls_used);
        inner.state.escalations_used = inner
            .state
            .escalations_used
            .saturating_add(sub_state.escalations_used);
        inner.state.cost_usd += sub_state.cost_usd;
        inner.state.energy_wh += sub_state.energy_wh;
        if sub_state.exceeded
            || (inner.limits.enforced && inner.state.tokens_used > inner.limits.max_tokens)
        {
            inner.state.exceeded = true;
        }
        Self::tick_elapsed(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> TokenPricing {
        TokenPricing {
            cost_per_input_token: 0.000001,
            cost_per_output_token: 0.000002,
            energy_per_input_token_wh: 0.0,
            energy_per_output_token_wh: 0.0,
        }
    }

    #[test]
    fn deduction_never_exceeds_allocated_ceiling() {
        let env = BudgetEnvelope::from_limits(BudgetLimits {
            max_tokens: 100,
            max_tool_calls: 10,
            max_escalations: 1,
            max_latency_ms: 60_000,
            cost_ceiling_usd: 10.0,
            max_energy_wh: 10.0,
            enforced: true,
        });
        for _ in 0..5 {
            env.deduct_tokens(
                TokenUsage {
                    prompt_tokens: 30,
                    completion_tokens: 0,
                },
                pricing(),
            );
        }
        let usage = env.get_usage();
        assert!(usage.tokens_used <= 100);
        assert_eq!(usage.tokens_remaining, 100 - usage.tokens_used);
        assert!(usage.exceeded);
        assert!(env.check_budget().is_err());
    }

    #[test]
    fn exhausted_envelope_is_sticky() {
        let env = BudgetEnvelope::from_preset(BudgetPreset::Low);
        env.deduct_escalation();
        assert!(env.check_budget().is_ok());
        // second escalation exceeds Low's max_escalations=1
        env.deduct_escalation();
        assert!(env.check_budget().is_err());
        // a later, individually-affordable deduction does not clear it
        assert!(env.check_budget().is_err());
    }

    #[test]
    fn unlimited_preset_never_fails_check_budget() {
        let env = BudgetEnvelope::from_preset(BudgetPreset::Unlimited);
        for _ in 0..1000 {
            env.deduct_tool_call();
        }
        assert!(env.check_budget().is_ok());
        assert!(!env.is_exceeded());
    }

    #[test]
    fn can_afford_escalation_reflects_remaining_count() {
        let env = BudgetEnvelope::from_preset(BudgetPreset::Low);
        assert!(env.can_afford_escalation());
        env.deduct_escalation();
        assert!(!env.can_afford_escalation());
    }

    #[test]
    fn sub_envelope_mirrors_into_parent() {
        let parent = BudgetEnvelope::from_preset(BudgetPreset::Medium);
        let sub_a = parent.create_sub_envelope(0.5).unwrap();
        let sub_b = parent.create_sub_envelope(0.5).unwrap();
        sub_a.deduct_tokens(
            TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
            },
            pricing(),
        );
        sub_b.deduct_tokens(
            TokenUsage {
                prompt_tokens: 200,
                completion_tokens: 25,
            },
            pricing(),
        );
        parent.mirror_from(&sub_a);
        parent.mirror_from(&sub_b);
        let parent_usage = parent.get_usage();
        let expected = sub_a.get_usage().tokens_used + sub_b.get_usage().tokens_used;
        assert_eq!(parent_usage.tokens_used, expected);
    }

    #[test]
    fn create_sub_envelope_rejects_out_of_range_share() {
        let parent = BudgetEnvelope::from_preset(BudgetPreset::Medium);
        assert!(parent.create_sub_envelope(0.0).is_err());
        assert!(parent.create_sub_envelope(1.5).is_err());
        assert!(parent.create_sub_envelope(1.0).is_ok());
    }
}
