//! End-to-end GRPO run over a toy bigram model and a synthetic word-level
//! vocabulary.

use candle_core::{DType, Device, Result as CandleResult, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};

use grouprl_core::RlConfig;
use grouprl_train::dataset::PromptExample;
use grouprl_train::reward::{RewardFn, SubstringReward};
use grouprl_train::tokenizer::PromptTokenizer;
use grouprl_train::{
    AncestralSampler, GrpoTrainer, OldPolicy, PolicyModel, PolicySet, ReferencePolicy,
    TrainablePolicy,
};

const VOCAB: usize = 12;

/// Bigram toy LM: one learned logit row per current token.
struct TinyLm {
    weight: Tensor,
    device: Device,
}

impl TinyLm {
    fn new(varmap: &VarMap, device: &Device) -> CandleResult<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let weight = vb.get_with_hints(
            (VOCAB, VOCAB),
            "lm.weight",
            Init::Randn {
                mean: 0.0,
                stdev: 0.2,
            },
        )?;
        Ok(Self {
            weight,
            device: device.clone(),
        })
    }
}

impl PolicyModel for TinyLm {
    fn forward(&self, tokens: &Tensor) -> CandleResult<Tensor> {
        let (batch, seq_len) = tokens.dims2()?;
        let flat = tokens.flatten_all()?;
        let rows = self.weight.index_select(&flat, 0)?;
        rows.reshape((batch, seq_len, ()))
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Deterministic word-level tokenizer over `w0..w11`.
struct WordTokenizer;

impl PromptTokenizer for WordTokenizer {
    fn apply_chat_template(&self, instruction: &str) -> anyhow::Result<Vec<u32>> {
        let mut ids = vec![1];
        ids.extend(self.encode(instruction)?);
        Ok(ids)
    }

    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        Ok(text
            .split_whitespace()
            .map(|w| {
                w.strip_prefix('w')
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(w.len() as u32)
                    % VOCAB as u32
            })
            .collect())
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
        None
    }
}

fn policy_set(device: &Device) -> PolicySet {
    let trainable_vars = VarMap::new();
    let trainable = TinyLm::new(&trainable_vars, device).unwrap();
    let old_vars = VarMap::new();
    let old = TinyLm::new(&old_vars, device).unwrap();
    let reference_vars = VarMap::new();
    let reference = TinyLm::new(&reference_vars, device).unwrap();
    PolicySet::new(
        TrainablePolicy::new(Box::new(trainable), trainable_vars),
        OldPolicy::new(Box::new(old), old_vars),
        ReferencePolicy::new(Box::new(reference)),
    )
    .unwrap()
}

fn toy_dataset() -> Vec<PromptExample> {
    vec![
        PromptExample {
            instruction: "w2 w3".to_string(),
            canonical_output: "w2 w3 w5".to_string(),
        },
        PromptExample {
            instruction: "w4 w4".to_string(),
            canonical_output: "w4 w4 w8".to_string(),
        },
        PromptExample {
            instruction: "w7".to_string(),
            canonical_output: "w7 w9".to_string(),
        },
    ]
}

#[test]
fn full_training_run_saves_adapter_and_reports_history() {
    let device = Device::Cpu;
    let config = RlConfig {
        iters: 4,
        batch_size: 2,
        group_size: 3,
        max_ans_len: 3,
        update_every: 2,
        learning_rate: 0.05,
        temperature: 1.0,
        seed: Some(17),
        ..RlConfig::default()
    };

    let tokenizer = WordTokenizer;
    let generator = AncestralSampler::default();
    let reward = SubstringReward;
    let mut trainer = GrpoTrainer::new(
        config,
        policy_set(&device),
        &tokenizer,
        &generator,
        &reward,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let adapter_dir = dir.path().join("run").join("adapter");
    let report = trainer.train(&toy_dataset(), &adapter_dir).unwrap();

    assert_eq!(report.history.len(), 4);
    assert!(report.final_loss.is_finite());
    for stats in &report.history {
        assert!(stats.loss.is_finite());
        assert!(stats.grad_norm >= 0.0);
        assert!((0.0..=1.0).contains(&stats.mean_reward));
        assert!(stats.kl >= -1e-6);
    }
    // Syncs fire at iterations 1 and 3 (update_every = 2).
    let synced: Vec<bool> = report.history.iter().map(|s| s.synced).collect();
    assert_eq!(synced, vec![false, true, false, true]);

    assert!(adapter_dir.join("adapter.safetensors").exists());
    let meta = std::fs::read_to_string(adapter_dir.join("meta.json")).unwrap();
    assert!(meta.contains("\"iterations\": 4"));
}

#[test]
fn reward_shaping_prefers_matching_completions() {
    // Sanity-check the reward plumbing the trainer relies on: decoded
    // completions containing the answer token score 1.0.
    let tokenizer = WordTokenizer;
    let reward = SubstringReward;
    let decoded = tokenizer.decode(&[5, 2]).unwrap();
    assert_eq!(reward.score("w5", &decoded), 1.0);
    assert_eq!(reward.score("w9", &decoded), 0.0);
}
