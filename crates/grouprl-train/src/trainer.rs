//! The GRPO training loop.
//!
//! Per iteration: sample prompts, roll out completion groups from the old
//! policy, normalize rewards into advantages, take one SGD step on the
//! clipped objective, and periodically sync the old policy. The trainable
//! policy mutates only in the optimize step, the old policy only at
//! init/sync, the reference policy never. The adapter is saved once, after
//! the final iteration.

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use grouprl_core::{RlConfig, RlError};

use crate::advantage::group_advantages;
use crate::checkpoint;
use crate::dataset::{sample_prompts, PromptExample};
use crate::logging::log_iteration;
use crate::logprob::answer_log_probs_detached;
use crate::objective::GrpoObjective;
use crate::padding::pad_sequences;
use crate::policy::PolicySet;
use crate::reward::RewardFn;
use crate::rollout::{Generator, RolloutGenerator};
use crate::tokenizer::PromptTokenizer;

/// Metrics for one completed iteration.
#[derive(Debug, Clone)]
pub struct IterationStats {
    pub iteration: usize,
    pub loss: f64,
    /// Mean raw reward over the iteration's rollouts.
    pub mean_reward: f64,
    /// Mean clipped surrogate term.
    pub policy_reward: f64,
    /// Mean k3 KL estimate against the reference policy.
    pub kl: f64,
    pub grad_norm: f64,
    /// Whether the old policy was synced at the end of this iteration.
    pub synced: bool,
}

/// Everything a caller gets back from a finished run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub history: Vec<IterationStats>,
    pub final_loss: f64,
}

/// Coordinates the three policies through the GRPO loop.
pub struct GrpoTrainer<'a> {
    config: RlConfig,
    policies: PolicySet,
    tokenizer: &'a dyn PromptTokenizer,
    generator: &'a dyn Generator,
    reward: &'a dyn RewardFn,
    device: Device,
    rng: StdRng,
}

impl<'a> GrpoTrainer<'a> {
    /// Validate the config and assemble the trainer. A bad config fails
    /// here, before any rollout or forward pass happens.
    pub fn new(
        config: RlConfig,
        policies: PolicySet,
        tokenizer: &'a dyn PromptTokenizer,
        generator: &'a dyn Generator,
        reward: &'a dyn RewardFn,
    ) -> std::result::Result<Self, RlError> {
        let config = config.validated()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let device = policies.trainable.model().device().clone();
        Ok(Self {
            config,
            policies,
            tokenizer,
            generator,
            reward,
            device,
            rng,
        })
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Run the full loop and save the trained adapter into `adapter_dir`.
    pub fn train(&mut self, dataset: &[PromptExample], adapter_dir: &Path) -> Result<TrainReport> {
        let objective = GrpoObjective::new(self.config.epsilon, self.config.beta);
        let mut history = Vec::with_capacity(self.config.iters);

        tracing::info!(
            iters = self.config.iters,
            rollouts_per_iter = self.config.rollouts_per_iter(),
            "starting GRPO run"
        );

        for iteration in 0..self.config.iters {
            let prompts = sample_prompts(dataset, self.config.batch_size, &mut self.rng)?;

            let rollout_gen = RolloutGenerator::new(
                self.tokenizer,
                self.generator,
                self.reward,
                &self.config,
            );
            let rollout = rollout_gen
                .collect(&self.policies.old, &prompts, &mut self.rng)
                .with_context(|| format!("rollout failed at iteration {iteration}"))?;

            let advantages = group_advantages(&rollout.rewards(), self.config.group_size)?;
            let advantages =
                Tensor::from_vec(advantages, rollout.samples.len(), &self.device)?;

            let batch = pad_sequences(
                &rollout.full_sequences(),
                self.tokenizer.pad_token_id(),
                &self.device,
            )?;
            let answer_lengths = rollout.answer_lengths();

            let old_log_probs =
                answer_log_probs_detached(self.policies.old.model(), &batch, &answer_lengths)?;
            let outcome = objective.evaluate(
                self.policies.trainable.model(),
                self.policies.reference.model(),
                &batch,
                &answer_lengths,
                &advantages,
                &old_log_probs,
            )?;

            let loss = outcome.loss.to_scalar::<f32>()? as f64;
            if !loss.is_finite() {
                return Err(RlError::TrainingDiverged { loss, iteration }.into());
            }

            let grad_norm = self.policies.trainable.apply_gradients(
                &outcome.loss,
                self.config.learning_rate,
                self.config.max_grad_norm,
            )?;

            let synced = (iteration + 1) % self.config.update_every == 0;
            if synced {
                self.policies.old.sync_from(&self.policies.trainable)?;
            }

            let stats = IterationStats {
                iteration,
                loss,
                mean_reward: rollout.mean_reward(),
                policy_reward: outcome.policy_reward,
                kl: outcome.kl,
                grad_norm,
                synced,
            };
            log_iteration(&stats);
            history.push(stats);
        }

        let final_loss = history.last().map(|s| s.loss).unwrap_or(0.0);
        checkpoint::save_adapter(
            self.policies.trainable.varmap(),
            &self.config,
            self.config.iters,
            final_loss,
            adapter_dir,
        )
        .context("failed to save trained adapter")?;

        Ok(TrainReport {
            history,
            final_loss,
        })
    }
}
