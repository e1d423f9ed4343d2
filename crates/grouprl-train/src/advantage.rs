//! Group-relative advantage estimation.
//!
//! Rewards are normalized within each prompt's group of completions rather
//! than against a learned baseline. Output order matches input order.

use grouprl_core::{Result, RlError};

/// Added to the standard deviation so constant-reward groups normalize to
/// zero advantages instead of dividing by zero.
pub const ADVANTAGE_EPS: f64 = 1e-8;

/// Normalize `rewards` to `(r - mean) / (std + eps)` within each consecutive
/// chunk of `group_size` entries.
///
/// Uses the sample standard deviation (n - 1 denominator), which is why
/// `group_size >= 2` is required. Rewards must be a whole number of groups.
pub fn group_advantages(rewards: &[f64], group_size: usize) -> Result<Vec<f32>> {
    if group_size < 2 {
        return Err(RlError::InvalidConfig(format!(
            "group_size must be >= 2 for group-relative advantages, got {group_size}"
        )));
    }
    if rewards.len() % group_size != 0 {
        return Err(RlError::MalformedBatch(format!(
            "{} rewards do not divide into groups of {group_size}",
            rewards.len()
        )));
    }

    let mut advantages = Vec::with_capacity(rewards.len());
    for group in rewards.chunks(group_size) {
        let n = group.len() as f64;
        let mean = group.iter().sum::<f64>() / n;
        let variance = group.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = variance.sqrt();
        for reward in group {
            advantages.push(((reward - mean) / (std + ADVANTAGE_EPS)) as f32);
        }
    }
    Ok(advantages)
}
