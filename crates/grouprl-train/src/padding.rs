//! Right-padding of variable-length token sequences into one rectangular
//! batch tensor.

use candle_core::{Device, Result, Tensor};

/// A right-padded `[count, max_len]` u32 token batch.
///
/// Rows keep their own unpadded length; nothing downstream may assume the
/// rows share a padding offset.
#[derive(Debug, Clone)]
pub struct PaddedBatch {
    /// Token ids, shape `[count, max_len]`, dtype u32.
    pub tokens: Tensor,
    /// Unpadded length of each row.
    pub lengths: Vec<usize>,
}

impl PaddedBatch {
    /// Number of rows in the batch.
    pub fn count(&self) -> usize {
        self.lengths.len()
    }

    /// Padded width of the batch (0 for an empty batch).
    pub fn width(&self) -> Result<usize> {
        Ok(self.tokens.dims2()?.1)
    }
}

/// Right-pad `sequences` with `pad_id` to a rectangular batch.
///
/// Sequences are never truncated; the batch width is the longest input. An
/// empty slice yields a `[0, 0]` tensor.
pub fn pad_sequences(sequences: &[Vec<u32>], pad_id: u32, device: &Device) -> Result<PaddedBatch> {
    if sequences.is_empty() {
        return Ok(PaddedBatch {
            tokens: Tensor::from_vec(Vec::<u32>::new(), (0, 0), device)?,
            lengths: Vec::new(),
        });
    }

    let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(sequences.len() * max_len);
    let mut lengths = Vec::with_capacity(sequences.len());
    for seq in sequences {
        flat.extend_from_slice(seq);
        flat.resize(flat.len() + (max_len - seq.len()), pad_id);
        lengths.push(seq.len());
    }

    Ok(PaddedBatch {
        tokens: Tensor::from_vec(flat, (sequences.len(), max_len), device)?,
        lengths,
    })
}
