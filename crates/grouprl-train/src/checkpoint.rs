//! Adapter checkpointing: trained parameters as safetensors plus a JSON
//! sidecar with run metadata.

use std::path::Path;

use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use grouprl_core::{Result, RlConfig, RlError};

/// Metadata written next to the adapter weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMeta {
    pub config: RlConfig,
    pub iterations: usize,
    pub final_loss: f64,
}

/// Write `adapter.safetensors` and `meta.json` into `dir`, creating it if
/// needed.
pub fn save_adapter(
    varmap: &VarMap,
    config: &RlConfig,
    iterations: usize,
    final_loss: f64,
    dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| RlError::AdapterSaveFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let weights_path = dir.join("adapter.safetensors");
    varmap
        .save(&weights_path)
        .map_err(|e| RlError::AdapterSaveFailed {
            path: weights_path.display().to_string(),
            reason: e.to_string(),
        })?;

    let meta = AdapterMeta {
        config: config.clone(),
        iterations,
        final_loss,
    };
    let meta_path = dir.join("meta.json");
    std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).map_err(|e| {
        RlError::AdapterSaveFailed {
            path: meta_path.display().to_string(),
            reason: e.to_string(),
        }
    })?;

    tracing::info!(dir = %dir.display(), iterations, final_loss, "saved adapter");
    Ok(())
}

/// Load saved adapter weights into an already-built varmap (the model must
/// be constructed first so the parameter names exist) and return the run
/// metadata.
pub fn load_adapter(varmap: &mut VarMap, dir: &Path) -> Result<AdapterMeta> {
    let meta_path = dir.join("meta.json");
    let meta_text = std::fs::read_to_string(&meta_path).map_err(|e| RlError::AdapterLoadFailed {
        path: meta_path.display().to_string(),
        reason: e.to_string(),
    })?;
    let meta: AdapterMeta = serde_json::from_str(&meta_text)?;

    let weights_path = dir.join("adapter.safetensors");
    varmap
        .load(&weights_path)
        .map_err(|e| RlError::AdapterLoadFailed {
            path: weights_path.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::tiny_lm;
    use candle_core::Device;

    #[test]
    fn test_save_creates_weights_and_meta() {
        let (_model, varmap) = tiny_lm(6, 0.5);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("adapter");

        save_adapter(&varmap, &RlConfig::smoke_test(), 2, -0.25, &out).unwrap();

        assert!(out.join("adapter.safetensors").exists());
        let meta: AdapterMeta =
            serde_json::from_str(&std::fs::read_to_string(out.join("meta.json")).unwrap())
                .unwrap();
        assert_eq!(meta.iterations, 2);
        assert_eq!(meta.config.seed, Some(42));
        assert!((meta.final_loss + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (model_a, varmap_a) = tiny_lm(6, 0.5);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("adapter");
        save_adapter(&varmap_a, &RlConfig::smoke_test(), 1, 0.0, &out).unwrap();

        let (model_b, mut varmap_b) = tiny_lm(6, 1.0);
        let meta = load_adapter(&mut varmap_b, &out).unwrap();
        assert_eq!(meta.iterations, 1);

        // After loading, both models produce identical logits.
        use crate::policy::PolicyModel;
        let tokens =
            candle_core::Tensor::from_vec(vec![1u32, 2, 3], (1, 3), &Device::Cpu).unwrap();
        let a = model_a.forward(&tokens).unwrap().flatten_all().unwrap();
        let b = model_b.forward(&tokens).unwrap().flatten_all().unwrap();
        let max_diff = a
            .sub(&b)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(max_diff < 1e-7);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let (_model, mut varmap) = tiny_lm(6, 0.5);
        let err = load_adapter(&mut varmap, Path::new("/nonexistent/adapter")).unwrap_err();
        assert!(matches!(err, RlError::AdapterLoadFailed { .. }));
    }
}
