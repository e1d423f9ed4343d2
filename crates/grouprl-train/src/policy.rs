//! The three policy handles GRPO coordinates.
//!
//! - [`TrainablePolicy`]: owns the optimized parameters; the only handle
//!   with a gradient-application surface.
//! - [`OldPolicy`]: the rollout/ratio policy, refreshed from the trainable
//!   one via [`OldPolicy::sync_from`].
//! - [`ReferencePolicy`]: the KL anchor. It exposes no parameter handles and
//!   no mutation surface at all.

use std::collections::HashMap;

use candle_core::backprop::GradStore;
use candle_core::{Device, Result, Tensor};
use candle_nn::VarMap;

use grouprl_core::RlError;

/// A causal language model driven by the training loop.
///
/// `forward` maps a `[batch, seq_len]` u32 token tensor to `[batch, seq_len,
/// vocab]` f32 logits.
pub trait PolicyModel {
    fn forward(&self, tokens: &Tensor) -> Result<Tensor>;

    /// Device the model's parameters live on.
    fn device(&self) -> &Device;
}

/// The policy being optimized. Parameters live in the [`VarMap`] so the SGD
/// step and the adapter save can reach them.
pub struct TrainablePolicy {
    model: Box<dyn PolicyModel>,
    varmap: VarMap,
}

impl TrainablePolicy {
    pub fn new(model: Box<dyn PolicyModel>, varmap: VarMap) -> Self {
        Self { model, varmap }
    }

    pub fn model(&self) -> &dyn PolicyModel {
        self.model.as_ref()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Snapshot of the named parameters, for tests and diagnostics.
    pub fn named_parameters(&self) -> HashMap<String, Tensor> {
        self.varmap
            .data()
            .lock()
            .unwrap()
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().copy().unwrap()))
            .collect()
    }

    /// Backprop `loss` and take one SGD step with global-norm clipping.
    /// Returns the pre-clip gradient norm.
    pub fn apply_gradients(
        &mut self,
        loss: &Tensor,
        learning_rate: f64,
        max_grad_norm: f64,
    ) -> Result<f64> {
        let grads = loss.backward()?;
        sgd_step(&self.varmap, &grads, learning_rate, max_grad_norm)
    }
}

/// The behavior policy: generates rollouts and anchors the importance ratio.
/// Mutated only by [`OldPolicy::sync_from`].
pub struct OldPolicy {
    model: Box<dyn PolicyModel>,
    varmap: VarMap,
}

impl OldPolicy {
    pub fn new(model: Box<dyn PolicyModel>, varmap: VarMap) -> Self {
        Self { model, varmap }
    }

    pub fn model(&self) -> &dyn PolicyModel {
        self.model.as_ref()
    }

    /// Snapshot of the named parameters, for tests and diagnostics.
    pub fn named_parameters(&self) -> HashMap<String, Tensor> {
        self.varmap
            .data()
            .lock()
            .unwrap()
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().copy().unwrap()))
            .collect()
    }

    /// Copy every parameter value from the trainable policy. The two varmaps
    /// must hold exactly the same parameter names.
    pub fn sync_from(&mut self, source: &TrainablePolicy) -> std::result::Result<(), RlError> {
        let src = source.varmap.data().lock().unwrap();
        let dst = self.varmap.data().lock().unwrap();
        if src.len() != dst.len() {
            return Err(RlError::PolicyMismatch(format!(
                "trainable policy has {} parameters, old policy has {}",
                src.len(),
                dst.len()
            )));
        }
        for (name, var) in dst.iter() {
            let source_var = src.get(name).ok_or_else(|| {
                RlError::PolicyMismatch(format!("trainable policy has no parameter {name}"))
            })?;
            var.set(source_var.as_tensor())?;
        }
        Ok(())
    }
}

/// The frozen KL anchor. Holds no parameter handles: there is nothing to
/// mutate through this type.
pub struct ReferencePolicy {
    model: Box<dyn PolicyModel>,
}

impl ReferencePolicy {
    pub fn new(model: Box<dyn PolicyModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &dyn PolicyModel {
        self.model.as_ref()
    }
}

/// The three policies a GRPO run coordinates. Construction performs the
/// initial old <- trainable sync so the first iteration starts with
/// identical behavior and target policies.
pub struct PolicySet {
    pub trainable: TrainablePolicy,
    pub old: OldPolicy,
    pub reference: ReferencePolicy,
}

impl PolicySet {
    pub fn new(
        trainable: TrainablePolicy,
        mut old: OldPolicy,
        reference: ReferencePolicy,
    ) -> std::result::Result<Self, RlError> {
        old.sync_from(&trainable)?;
        Ok(Self {
            trainable,
            old,
            reference,
        })
    }
}

/// One SGD step over every var with a gradient, with global gradient-norm
/// clipping. `max_grad_norm == 0` disables clipping. Returns the pre-clip
/// norm.
fn sgd_step(
    varmap: &VarMap,
    grads: &GradStore,
    learning_rate: f64,
    max_grad_norm: f64,
) -> Result<f64> {
    let vars = varmap.all_vars();

    let mut total_norm_sq = 0f64;
    for var in &vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total_norm_sq += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let grad_norm = total_norm_sq.sqrt();

    let clip_scale = if max_grad_norm > 0.0 && grad_norm > max_grad_norm {
        max_grad_norm / grad_norm
    } else {
        1.0
    };

    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            let update = (grad * (learning_rate * clip_scale))?;
            let new_value = var.as_tensor().sub(&update)?;
            var.set(&new_value)?;
        }
    }

    Ok(grad_norm)
}
