//! Shared test fixtures: a tiny differentiable language model and a
//! deterministic word-level tokenizer.

use std::collections::HashMap;

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};

use crate::policy::PolicyModel;
use crate::tokenizer::PromptTokenizer;

/// Bigram-style toy LM: logits for the next token are one learned row per
/// current token. Differentiable through `index_select`, so gradient steps
/// work end to end.
pub(crate) struct TinyLm {
    weight: Tensor,
    device: Device,
}

impl TinyLm {
    /// `init_std == 0.0` gives all-zero logits (a uniform distribution).
    pub(crate) fn new(
        vocab: usize,
        varmap: &VarMap,
        device: &Device,
        init_std: f64,
    ) -> Result<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let init = if init_std > 0.0 {
            Init::Randn {
                mean: 0.0,
                stdev: init_std,
            }
        } else {
            Init::Const(0.0)
        };
        let weight = vb.get_with_hints((vocab, vocab), "lm.weight", init)?;
        Ok(Self {
            weight,
            device: device.clone(),
        })
    }
}

impl PolicyModel for TinyLm {
    fn forward(&self, tokens: &Tensor) -> Result<Tensor> {
        let (batch, seq_len) = tokens.dims2()?;
        let flat = tokens.flatten_all()?;
        let rows = self.weight.index_select(&flat, 0)?;
        rows.reshape((batch, seq_len, ()))
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Build a TinyLm policy bundle (model + varmap) in one call.
pub(crate) fn tiny_lm(vocab: usize, init_std: f64) -> (TinyLm, VarMap) {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let model = TinyLm::new(vocab, &varmap, &device, init_std).unwrap();
    (model, varmap)
}

/// Compare two named-parameter snapshots elementwise.
pub(crate) fn params_close(
    a: &HashMap<String, Tensor>,
    b: &HashMap<String, Tensor>,
    tolerance: f64,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    for (name, tensor) in a {
        let Some(other) = b.get(name) else {
            return false;
        };
        let max_diff = tensor
            .sub(other)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        if max_diff as f64 > tolerance {
            return false;
        }
    }
    true
}

/// Word-level tokenizer over the synthetic vocabulary `w0..w{vocab-1}`.
/// Deterministic both ways, which keeps reward checks in tests exact.
pub(crate) struct WordTokenizer {
    vocab: u32,
    eos: Option<u32>,
}

impl WordTokenizer {
    pub(crate) fn new(vocab: u32) -> Self {
        Self { vocab, eos: None }
    }

    pub(crate) fn with_eos(vocab: u32, eos: u32) -> Self {
        Self {
            vocab,
            eos: Some(eos),
        }
    }

    fn word_to_id(&self, word: &str) -> u32 {
        let id = word
            .strip_prefix('w')
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(word.len() as u32);
        id % self.vocab
    }
}

impl PromptTokenizer for WordTokenizer {
    fn apply_chat_template(&self, instruction: &str) -> anyhow::Result<Vec<u32>> {
        let mut ids = vec![1 % self.vocab];
        ids.extend(self.encode(instruction)?);
        Ok(ids)
    }

    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        Ok(text.split_whitespace().map(|w| self.word_to_id(w)).collect())
    }

    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        Ok(ids
            .iter()
            .map(|id| format!("w{id}"))
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn pad_token_id(&self) -> u32 {
        0
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos
    }
}
