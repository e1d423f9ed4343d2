//! GRPO fine-tuning for causal language models.
//!
//! Pipeline per iteration:
//! 1. Sample a batch of prompts from the dataset (`dataset`)
//! 2. Roll out `group_size` completions per prompt from the old policy
//!    (`rollout`), scoring each with a reward function (`reward`)
//! 3. Normalize rewards into group-relative advantages (`advantage`)
//! 4. Pad the full sequences into one batch (`padding`), extract answer
//!    log-probabilities under all three policies (`logprob`), and take one
//!    SGD step on the clipped GRPO objective (`objective`, `policy`)
//! 5. Periodically sync the old policy from the trainable one (`trainer`)
//!
//! The trained adapter parameters are written out once at loop completion
//! (`checkpoint`).

pub mod advantage;
pub mod checkpoint;
pub mod dataset;
pub mod logging;
pub mod logprob;
pub mod objective;
pub mod padding;
pub mod policy;
pub mod reward;
pub mod rollout;
pub mod tokenizer;
pub mod trainer;

#[cfg(test)]
pub(crate) mod test_util;

pub use advantage::group_advantages;
pub use objective::{GrpoObjective, GrpoOutcome};
pub use padding::{pad_sequences, PaddedBatch};
pub use policy::{OldPolicy, PolicyModel, PolicySet, ReferencePolicy, TrainablePolicy};
pub use rollout::{AncestralSampler, Generator, RolloutBatch, RolloutGenerator, RolloutSample};
pub use trainer::{GrpoTrainer, IterationStats, TrainReport};
