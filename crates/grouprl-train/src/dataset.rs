//! Prompt dataset: JSONL loading, answer splitting, and with-replacement
//! batch sampling.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One supervised example: an instruction and its canonical worked output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptExample {
    pub instruction: String,
    pub canonical_output: String,
}

impl PromptExample {
    /// Split the canonical output into a visible prefix and the final
    /// answer: the last whitespace-delimited token is the answer, the rest
    /// is shown to the policy as part of the prompt.
    pub fn split_answer(&self) -> (String, String) {
        let output = self.canonical_output.trim_end();
        match output.rfind(char::is_whitespace) {
            Some(idx) => {
                let (prefix, answer) = output.split_at(idx);
                (prefix.to_string(), answer.trim_start().to_string())
            }
            None => (String::new(), output.to_string()),
        }
    }
}

/// Load a JSONL dataset, one [`PromptExample`] per non-empty line.
pub fn load_jsonl(path: &Path) -> Result<Vec<PromptExample>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let mut examples = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let example: PromptExample = serde_json::from_str(line)
            .with_context(|| format!("bad dataset record at {}:{}", path.display(), line_no + 1))?;
        examples.push(example);
    }
    if examples.is_empty() {
        bail!("dataset {} contains no examples", path.display());
    }
    Ok(examples)
}

/// Sample `count` prompts uniformly with replacement.
pub fn sample_prompts<'a>(
    examples: &'a [PromptExample],
    count: usize,
    rng: &mut StdRng,
) -> Result<Vec<&'a PromptExample>> {
    if examples.is_empty() {
        bail!("cannot sample prompts from an empty dataset");
    }
    Ok((0..count)
        .map(|_| &examples[rng.gen_range(0..examples.len())])
        .collect())
}
