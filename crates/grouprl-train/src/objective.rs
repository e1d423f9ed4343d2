//! The clipped GRPO objective.
//!
//! Per sample:
//!   ratio         = exp(log p_theta - log p_old)
//!   policy_reward = min(ratio * A, clamp(ratio, 1-eps, 1+eps) * A)
//!   kl            = exp(delta) - delta - 1,  delta = log p_ref - log p_theta
//!   loss          = -mean(policy_reward - beta * kl)
//!
//! The clip bounds only the maximized surrogate; the KL estimator always
//! sees the raw ratio. Gradients flow only through log p_theta: the old and
//! reference log-probabilities arrive detached.

use candle_core::{Result, Tensor};

use crate::logprob::{answer_log_probs, answer_log_probs_detached};
use crate::padding::PaddedBatch;
use crate::policy::PolicyModel;

/// Scalar summary of one objective evaluation. `loss` stays a tensor so the
/// caller can backprop it; the diagnostics are detached means.
pub struct GrpoOutcome {
    pub loss: Tensor,
    pub policy_reward: f64,
    pub kl: f64,
}

/// The objective's two hyperparameters, fixed for a run.
#[derive(Debug, Clone, Copy)]
pub struct GrpoObjective {
    pub epsilon: f64,
    pub beta: f64,
}

impl GrpoObjective {
    pub fn new(epsilon: f64, beta: f64) -> Self {
        Self { epsilon, beta }
    }

    /// Run both forward passes and evaluate the objective over a rollout
    /// batch. `old_log_probs` come from the behavior policy at rollout time
    /// and are already detached.
    pub fn evaluate(
        &self,
        trainable: &dyn PolicyModel,
        reference: &dyn PolicyModel,
        batch: &PaddedBatch,
        answer_lengths: &[usize],
        advantages: &Tensor,
        old_log_probs: &Tensor,
    ) -> Result<GrpoOutcome> {
        let log_probs = answer_log_probs(trainable, batch, answer_lengths)?;
        let ref_log_probs = answer_log_probs_detached(reference, batch, answer_lengths)?;
        self.from_log_probs(&log_probs, &ref_log_probs, old_log_probs, advantages)
    }

    /// Evaluate the objective from precomputed per-sample log-probabilities,
    /// all shape `[count]`.
    pub fn from_log_probs(
        &self,
        log_probs: &Tensor,
        ref_log_probs: &Tensor,
        old_log_probs: &Tensor,
        advantages: &Tensor,
    ) -> Result<GrpoOutcome> {
        let ratio = (log_probs - old_log_probs)?.exp()?;
        let clipped = ratio.clamp(1.0 - self.epsilon, 1.0 + self.epsilon)?;
        let policy_reward = (&ratio * advantages)?.minimum(&(&clipped * advantages)?)?;

        let delta = (ref_log_probs - log_probs)?;
        let kl = (delta.exp()? - &delta)?.affine(1.0, -1.0)?;

        let objective = (&policy_reward - (&kl * self.beta)?)?;
        let loss = objective.mean_all()?.neg()?;

        let mean_policy_reward = policy_reward.detach().mean_all()?.to_scalar::<f32>()? as f64;
        let mean_kl = kl.detach().mean_all()?.to_scalar::<f32>()? as f64;

        Ok(GrpoOutcome {
            loss,
            policy_reward: mean_policy_reward,
            kl: mean_kl,
        })
    }
}
