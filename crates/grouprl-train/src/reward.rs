//! Reward functions for scoring completions.

/// Scores one completion against the prompt's ground-truth answer.
pub trait RewardFn {
    fn score(&self, ground_truth: &str, completion: &str) -> f64;
}

/// Binary containment check: 1.0 if the trimmed ground-truth answer appears
/// anywhere in the completion, else 0.0. Case-sensitive.
pub struct SubstringReward;

impl RewardFn for SubstringReward {
    fn score(&self, ground_truth: &str, completion: &str) -> f64 {
        let needle = ground_truth.trim();
        if !needle.is_empty() && completion.contains(needle) {
            1.0
        } else {
            0.0
        }
    }
}
