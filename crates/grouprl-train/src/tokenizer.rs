//! Tokenizer abstraction and the default HuggingFace-backed implementation.

use std::path::Path;

use anyhow::{anyhow, Result};

/// Everything the training loop needs from a tokenizer.
pub trait PromptTokenizer {
    /// Wrap an instruction in the chat template and encode it.
    fn apply_chat_template(&self, instruction: &str) -> Result<Vec<u32>>;

    /// Encode raw text without the template.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token ids back to text, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    fn pad_token_id(&self) -> u32;

    /// End-of-sequence id, if the vocabulary defines one. Generation stops
    /// when the policy emits it.
    fn eos_token_id(&self) -> Option<u32>;
}

/// Wraps a HuggingFace `tokenizer.json` with a minimal user/assistant chat
/// template.
#[derive(Debug)]
pub struct ChatTokenizer {
    inner: tokenizers::Tokenizer,
    pad_id: u32,
    eos_id: Option<u32>,
}

impl ChatTokenizer {
    /// Load from a local tokenizer.json file. The EOS id is resolved from
    /// the usual special-token spellings; the pad id falls back to EOS.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("failed to load tokenizer from {}: {e}", path.display()))?;
        let eos_id = ["<|endoftext|>", "</s>", "<|im_end|>"]
            .iter()
            .find_map(|token| inner.token_to_id(token));
        let pad_id = inner
            .token_to_id("<pad>")
            .or(eos_id)
            .unwrap_or(0);
        Ok(Self {
            inner,
            pad_id,
            eos_id,
        })
    }

    /// Override the pad id (for vocabularies with a dedicated pad token
    /// under a non-standard spelling).
    pub fn with_pad_id(mut self, pad_id: u32) -> Self {
        self.pad_id = pad_id;
        self
    }
}

impl PromptTokenizer for ChatTokenizer {
    fn apply_chat_template(&self, instruction: &str) -> Result<Vec<u32>> {
        self.encode(&format!("<|user|>\n{instruction}\n<|assistant|>\n"))
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow!("encoding error: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| anyhow!("decoding error: {e}"))
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_id
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos_id
    }
}
