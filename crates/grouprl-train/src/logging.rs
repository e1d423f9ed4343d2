//! Structured logging setup and per-iteration reporting.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::trainer::IterationStats;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,grouprl_train=info,grouprl_core=info"))
}

/// JSON logs for production runs. Respects `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Human-readable logs for local debugging.
pub fn init_console_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

/// Emit one iteration's metrics, escalating anomalies.
pub fn log_iteration(stats: &IterationStats) {
    if !stats.loss.is_finite() {
        tracing::error!(
            iteration = stats.iteration,
            loss = stats.loss,
            "non-finite loss"
        );
        return;
    }

    if stats.kl > 1.0 {
        tracing::warn!(
            iteration = stats.iteration,
            kl = stats.kl,
            "policy drifting far from reference"
        );
    }
    if stats.grad_norm > 10.0 {
        tracing::warn!(
            iteration = stats.iteration,
            grad_norm = stats.grad_norm,
            "large gradient norm"
        );
    }

    tracing::info!(
        iteration = stats.iteration,
        loss = stats.loss,
        mean_reward = stats.mean_reward,
        policy_reward = stats.policy_reward,
        kl = stats.kl,
        grad_norm = stats.grad_norm,
        synced = stats.synced,
        "iteration complete"
    );
}
