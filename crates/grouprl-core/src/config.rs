//! Run configuration for GRPO fine-tuning.
//!
//! One immutable struct, built once and validated before the training loop
//! constructs anything. Loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RlError};

/// Hyperparameters for one GRPO fine-tuning run.
///
/// Validation is fail-fast: [`RlConfig::validate`] collects every problem it
/// finds so a bad config file surfaces all mistakes at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlConfig {
    /// Number of training iterations.
    pub iters: usize,

    /// Prompts sampled per iteration.
    pub batch_size: usize,

    /// Completions sampled per prompt. Must be >= 2: advantages are
    /// normalized with the sample standard deviation over the group.
    pub group_size: usize,

    /// PPO clip range for the importance-sampling ratio.
    pub epsilon: f64,

    /// KL penalty coefficient against the frozen reference policy.
    pub beta: f64,

    /// Sync the old policy from the trainable policy every this many
    /// iterations.
    pub update_every: usize,

    /// Maximum tokens generated per completion.
    pub max_ans_len: usize,

    /// SGD learning rate.
    pub learning_rate: f64,

    /// Sampling temperature for rollouts. Must be positive: greedy decoding
    /// collapses every group to one completion and advantages degenerate.
    pub temperature: f64,

    /// Top-k truncation for rollout sampling.
    pub top_k: usize,

    /// Global gradient norm clip. Zero disables clipping.
    pub max_grad_norm: f64,

    /// RNG seed for reproducible runs. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            iters: 200,
            batch_size: 4,
            group_size: 8,
            epsilon: 0.2,
            beta: 0.04,
            update_every: 10,
            max_ans_len: 64,
            learning_rate: 1e-5,
            temperature: 0.8,
            top_k: 50,
            max_grad_norm: 1.0,
            seed: None,
        }
    }
}

impl RlConfig {
    /// Small config for smoke tests and debugging runs.
    pub fn smoke_test() -> Self {
        Self {
            iters: 2,
            batch_size: 2,
            group_size: 2,
            max_ans_len: 8,
            update_every: 1,
            seed: Some(42),
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        Ok(config)
    }

    /// Validate hyperparameters. Returns every error found, not just the
    /// first; non-fatal oddities are logged as warnings.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.iters == 0 {
            errors.push("iters must be > 0".to_string());
        }
        if self.batch_size == 0 {
            errors.push("batch_size must be > 0".to_string());
        }
        if self.group_size < 2 {
            errors.push(format!(
                "group_size must be >= 2 for group-relative advantages, got {}",
                self.group_size
            ));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            errors.push(format!("epsilon must be in (0, 1), got {}", self.epsilon));
        }
        if self.beta < 0.0 || !self.beta.is_finite() {
            errors.push(format!("beta must be finite and >= 0, got {}", self.beta));
        }
        if self.update_every == 0 {
            errors.push("update_every must be > 0".to_string());
        }
        if self.max_ans_len == 0 {
            errors.push("max_ans_len must be > 0".to_string());
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            errors.push(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            ));
        }
        if self.temperature <= 0.0 || !self.temperature.is_finite() {
            errors.push(format!(
                "temperature must be finite and > 0, got {}",
                self.temperature
            ));
        }
        if self.top_k == 0 {
            errors.push("top_k must be > 0".to_string());
        }
        if self.max_grad_norm < 0.0 || !self.max_grad_norm.is_finite() {
            errors.push(format!(
                "max_grad_norm must be finite and >= 0 (0 disables clipping), got {}",
                self.max_grad_norm
            ));
        }

        if errors.is_empty() {
            if self.beta == 0.0 {
                tracing::warn!("beta = 0: KL regularization against the reference is disabled");
            }
            if self.temperature < 0.2 {
                tracing::warn!(
                    temperature = self.temperature,
                    "very low sampling temperature, rollout groups may collapse"
                );
            }
            if self.update_every > self.iters {
                tracing::warn!(
                    update_every = self.update_every,
                    iters = self.iters,
                    "old policy will never sync after initialization"
                );
            }
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert failures into an [`RlError`].
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|errs| RlError::InvalidConfig(errs.join("; ")))?;
        Ok(self)
    }

    /// Total completions sampled per iteration.
    pub fn rollouts_per_iter(&self) -> usize {
        self.batch_size * self.group_size
    }
}
