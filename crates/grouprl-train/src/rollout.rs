//! Rollout generation: sample completion groups from the old policy and
//! score them.

use std::cmp::Ordering;

use anyhow::{Context, Result};
use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::Rng;

use grouprl_core::RlConfig;

use crate::dataset::PromptExample;
use crate::policy::{OldPolicy, PolicyModel};
use crate::reward::RewardFn;
use crate::tokenizer::PromptTokenizer;

/// One sampled completion with its prompt and score. Keeping the three
/// together makes batch order explicit instead of relying on parallel
/// arrays staying aligned.
#[derive(Debug, Clone)]
pub struct RolloutSample {
    pub prompt_tokens: Vec<u32>,
    pub answer_tokens: Vec<u32>,
    pub reward: f64,
}

impl RolloutSample {
    /// Prompt and answer concatenated, as the policies see it.
    pub fn full_sequence(&self) -> Vec<u32> {
        let mut sequence = self.prompt_tokens.clone();
        sequence.extend_from_slice(&self.answer_tokens);
        sequence
    }
}

/// All samples for one iteration, in prompt-major order: `group_size`
/// consecutive samples share a prompt.
#[derive(Debug, Clone)]
pub struct RolloutBatch {
    pub samples: Vec<RolloutSample>,
    pub group_size: usize,
}

impl RolloutBatch {
    pub fn rewards(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.reward).collect()
    }

    pub fn full_sequences(&self) -> Vec<Vec<u32>> {
        self.samples.iter().map(RolloutSample::full_sequence).collect()
    }

    pub fn answer_lengths(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.answer_tokens.len()).collect()
    }

    pub fn mean_reward(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.rewards().iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// A decoding backend: produce one completion for a prompt.
pub trait Generator {
    fn generate(
        &self,
        model: &dyn PolicyModel,
        tokenizer: &dyn PromptTokenizer,
        prompt_tokens: &[u32],
        max_tokens: usize,
        temperature: f64,
        rng: &mut StdRng,
    ) -> Result<Vec<u32>>;
}

/// Ancestral sampling with temperature scaling and top-k truncation.
pub struct AncestralSampler {
    pub top_k: usize,
}

impl Default for AncestralSampler {
    fn default() -> Self {
        Self { top_k: 50 }
    }
}

impl Generator for AncestralSampler {
    fn generate(
        &self,
        model: &dyn PolicyModel,
        tokenizer: &dyn PromptTokenizer,
        prompt_tokens: &[u32],
        max_tokens: usize,
        temperature: f64,
        rng: &mut StdRng,
    ) -> Result<Vec<u32>> {
        let mut tokens = prompt_tokens.to_vec();
        for _ in 0..max_tokens {
            let input = Tensor::new(tokens.as_slice(), model.device())?.unsqueeze(0)?;
            let logits = model.forward(&input)?;
            let last = logits.get(0)?.get(tokens.len() - 1)?;
            let logits_vec = last.to_vec1::<f32>()?;
            let next = sample_token(&logits_vec, temperature, self.top_k, rng);
            if Some(next) == tokenizer.eos_token_id() {
                break;
            }
            tokens.push(next);
        }
        Ok(tokens[prompt_tokens.len()..].to_vec())
    }
}

/// Sample one token from temperature-scaled, top-k truncated logits.
fn sample_token(logits: &[f32], temperature: f64, top_k: usize, rng: &mut StdRng) -> u32 {
    let temperature = temperature.max(0.05);
    let max_logit = logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    let scaled: Vec<f64> = logits
        .iter()
        .map(|&v| ((v as f64 - max_logit) / temperature).exp())
        .collect();

    let k = top_k.max(1).min(scaled.len());
    let mut order: Vec<usize> = (0..scaled.len()).collect();
    order.sort_by(|&a, &b| scaled[b].partial_cmp(&scaled[a]).unwrap_or(Ordering::Equal));

    let mut probs = vec![0f64; scaled.len()];
    let mut mass = 0f64;
    for &i in order.iter().take(k) {
        probs[i] = scaled[i];
        mass += scaled[i];
    }
    if mass <= 0.0 {
        return 0;
    }

    let target = rng.gen::<f64>() * mass;
    let mut cumulative = 0f64;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if target <= cumulative && p > 0.0 {
            return i as u32;
        }
    }
    order[k - 1] as u32
}

/// Drives one iteration's worth of sampling against the old policy.
pub struct RolloutGenerator<'a> {
    tokenizer: &'a dyn PromptTokenizer,
    generator: &'a dyn Generator,
    reward: &'a dyn RewardFn,
    config: &'a RlConfig,
}

impl<'a> RolloutGenerator<'a> {
    pub fn new(
        tokenizer: &'a dyn PromptTokenizer,
        generator: &'a dyn Generator,
        reward: &'a dyn RewardFn,
        config: &'a RlConfig,
    ) -> Self {
        Self {
            tokenizer,
            generator,
            reward,
            config,
        }
    }

    /// Sample `group_size` completions per prompt and score each one.
    /// Output is prompt-major, matching the advantage estimator's grouping.
    pub fn collect(
        &self,
        policy: &OldPolicy,
        prompts: &[&PromptExample],
        rng: &mut StdRng,
    ) -> Result<RolloutBatch> {
        let mut samples = Vec::with_capacity(prompts.len() * self.config.group_size);
        for example in prompts {
            let (visible_prefix, answer) = example.split_answer();
            let mut prompt_tokens = self
                .tokenizer
                .apply_chat_template(&example.instruction)
                .context("failed to encode prompt")?;
            if !visible_prefix.is_empty() {
                prompt_tokens.extend(self.tokenizer.encode(&visible_prefix)?);
            }

            for _ in 0..self.config.group_size {
                let answer_tokens = self
                    .generator
                    .generate(
                        policy.model(),
                        self.tokenizer,
                        &prompt_tokens,
                        self.config.max_ans_len,
                        self.config.temperature,
                        rng,
                    )
                    .context("completion sampling failed")?;
                let completion = self.tokenizer.decode(&answer_tokens)?;
                let reward = self.reward.score(&answer, &completion);
                samples.push(RolloutSample {
                    prompt_tokens: prompt_tokens.clone(),
                    answer_tokens,
                    reward,
                });
            }
        }
        Ok(RolloutBatch {
            samples,
            group_size: self.config.group_size,
        })
    }
}
