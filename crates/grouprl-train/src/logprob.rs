//! Answer-span log-probability extraction.
//!
//! One forward pass over the whole padded batch, log-softmax over the
//! vocabulary, then a causal gather: the logits at position t-1 score the
//! token at position t. Each row's answer span is masked out with its own
//! full and answer lengths, and the per-token log-probabilities are summed
//! to one scalar per row.

use candle_core::{bail, Result, Tensor, D};
use candle_nn::ops::log_softmax;

use crate::padding::PaddedBatch;
use crate::policy::PolicyModel;

/// Sum of answer-token log-probabilities under `model`, one per row, shape
/// `[count]`.
///
/// `answer_lengths[i]` is the number of trailing tokens of row i (within its
/// unpadded length) that form the answer. A token at position t is scored by
/// the logits at t-1; an answer token at position 0 has no conditioning
/// position and contributes nothing.
pub fn answer_log_probs(
    model: &dyn PolicyModel,
    batch: &PaddedBatch,
    answer_lengths: &[usize],
) -> Result<Tensor> {
    let (count, width) = batch.tokens.dims2()?;
    if answer_lengths.len() != count {
        bail!(
            "answer_lengths has {} entries for a batch of {count} rows",
            answer_lengths.len()
        );
    }
    if count == 0 {
        return Tensor::from_vec(Vec::<f32>::new(), 0, batch.tokens.device());
    }
    if width < 2 {
        bail!("batch width {width} is too short to score any token");
    }

    let logits = model.forward(&batch.tokens)?;
    let log_probs = log_softmax(&logits, D::Minus1)?;

    // log_probs[:, t, targets[:, t]] scores the token at position t+1.
    let targets = batch.tokens.narrow(1, 1, width - 1)?.contiguous()?;
    let token_log_probs = log_probs
        .narrow(1, 0, width - 1)?
        .contiguous()?
        .gather(&targets.unsqueeze(2)?, 2)?
        .squeeze(2)?;

    let mut mask = vec![0f32; count * (width - 1)];
    for (row, (&full, &answer)) in batch.lengths.iter().zip(answer_lengths).enumerate() {
        if answer > full {
            bail!("row {row}: answer length {answer} exceeds sequence length {full}");
        }
        if full > width {
            bail!("row {row}: sequence length {full} exceeds batch width {width}");
        }
        let start = (full - answer).max(1);
        for position in start..full {
            mask[row * (width - 1) + (position - 1)] = 1.0;
        }
    }
    let mask = Tensor::from_vec(mask, (count, width - 1), batch.tokens.device())?;

    (token_log_probs * mask)?.sum(1)
}

/// Same as [`answer_log_probs`] but cut from the autodiff graph. Used for
/// the old and reference policies, whose log-probabilities are constants in
/// the objective.
pub fn answer_log_probs_detached(
    model: &dyn PolicyModel,
    batch: &PaddedBatch,
    answer_lengths: &[usize],
) -> Result<Tensor> {
    Ok(answer_log_probs(model, batch, answer_lengths)?.detach())
}
