//! Strategy selection and application

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::codec::Payload;
use crate::error::{ControlError, Result};
use crate::models::{AdaptationDecision, Feedback, FeedbackStatus, Strategy};

/// Strategies a critical signal chooses between, uniformly
pub const CRITICAL_STRATEGIES: [Strategy; 2] = [Strategy::Replace, Strategy::Optimize];

/// Outcome of applying a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The adaptation was carried out
    Applied,
    /// This exact decision was applied before
    AlreadyApplied,
    /// A newer decision for the module was applied since
    Superseded,
    /// Nothing to do for `no_action`
    NoOp,
}

/// Maps feedback signals to adaptation strategies
///
/// The random source is injectable; a seeded generator makes the choice
/// for critical signals reproducible.
pub struct AdaptationSelector<R = StdRng> {
    rng: R,
    /// Last applied decision per module
    applied: HashMap<String, AdaptationDecision>,
}

impl AdaptationSelector<StdRng> {
    /// Selector drawing from OS entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Selector with a reproducible sequence of choices
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for AdaptationSelector<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> AdaptationSelector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            applied: HashMap::new(),
        }
    }

    /// Choose a strategy for a feedback signal
    ///
    /// Produces the decision only; see [`apply`](Self::apply) for acting on it.
    pub fn select(&mut self, feedback: &Feedback) -> Result<AdaptationDecision> {
        if feedback.target_module.is_empty() {
            return Err(ControlError::validation("feedback target_module must not be empty"));
        }

        let strategy = match feedback.status {
            FeedbackStatus::Critical => {
                CRITICAL_STRATEGIES[self.rng.gen_range(0..CRITICAL_STRATEGIES.len())]
            }
            FeedbackStatus::Warning => Strategy::Reconfigure,
            FeedbackStatus::Informational => Strategy::NoAction,
        };

        debug!(
            module_id = %feedback.target_module,
            status = %feedback.status,
            strategy = %strategy,
            "Strategy selected"
        );

        Ok(AdaptationDecision {
            strategy,
            target_module: feedback.target_module.clone(),
            decided_at: Utc::now(),
        })
    }

    /// Parse externally supplied feedback and choose a strategy for it
    pub fn select_payload(&mut self, feedback: &Payload) -> Result<AdaptationDecision> {
        let feedback = Feedback::from_payload(feedback)?;
        self.select(&feedback)
    }

    /// Carry out a decision
    ///
    /// Applying the same decision again, a decision older than the last one
    /// applied to its module, or any `no_action` changes nothing.
    pub fn apply(&mut self, decision: &AdaptationDecision) -> ApplyOutcome {
        if !decision.strategy.is_actionable() {
            return ApplyOutcome::NoOp;
        }
        if let Some(last) = self.applied.get(&decision.target_module) {
            if last == decision {
                return ApplyOutcome::AlreadyApplied;
            }
            if decision.decided_at < last.decided_at {
                debug!(
                    module_id = %decision.target_module,
                    strategy = %decision.strategy,
                    "Skipping superseded decision"
                );
                return ApplyOutcome::Superseded;
            }
        }

        let module_id = &decision.target_module;
        match decision.strategy {
            Strategy::Replace => info!(module_id = %module_id, "Replacing underperforming module"),
            Strategy::Reconfigure => info!(module_id = %module_id, "Reconfiguring module"),
            Strategy::Optimize => info!(module_id = %module_id, "Optimizing module"),
            Strategy::NoAction => {}
        }

        self.applied.insert(module_id.clone(), decision.clone());
        ApplyOutcome::Applied
    }

    /// Last decision applied to a module
    pub fn last_applied(&self, module_id: &str) -> Option<&AdaptationDecision> {
        self.applied.get(module_id)
    }

    /// Forget a module's applied history
    pub fn forget(&mut self, module_id: &str) {
        self.applied.remove(module_id);
    }

    /// Keep applied history only for modules matching `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.applied.retain(|module_id, _| keep(module_id));
    }

    /// Modules with applied history
    pub fn tracked_modules(&self) -> usize {
        self.applied.len()
    }
}
