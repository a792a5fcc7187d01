//! Run configuration: loss selection, training hyper-parameters, the
//! manifest stored beside every checkpoint, and checkpoint naming.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use seqtag_core::{Architecture, ModelConfig, Vocab};

/// Training objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFn {
    /// Token-level cross entropy over non-padding positions.
    #[default]
    CrossEntropy,
}

impl LossFn {
    pub fn name(&self) -> &'static str {
        match self {
            LossFn::CrossEntropy => "cross_entropy",
        }
    }
}

impl fmt::Display for LossFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossFn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "cross_entropy" | "cross-entropy" => Ok(LossFn::CrossEntropy),
            other => anyhow::bail!("unknown loss function {other:?} (expected cross_entropy)"),
        }
    }
}

/// Hyper-parameters of [`RnnClassifier::fit`](crate::RnnClassifier::fit).
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seeds the per-epoch shuffle.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 123,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Everything needed to rebuild a trained classifier, saved as JSON next
/// to its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub model: ModelConfig,
    pub include_manual_features: bool,
    pub max_len: usize,
    pub loss_fn: LossFn,
    pub vocab: Vocab,
}

impl RunManifest {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing manifest {}", path.display()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing manifest {}", path.display()))
    }
}

/// Weights path for one model variant:
/// `dir/rnn_{architecture}_{n_layers}_{manual}_{loss}_{embed_dim}.safetensors`.
pub fn checkpoint_path(
    dir: &Path,
    architecture: Architecture,
    n_layers: usize,
    manual_features: bool,
    loss_fn: LossFn,
    embed_dim: usize,
) -> PathBuf {
    dir.join(format!(
        "rnn_{architecture}_{n_layers}_{manual_features}_{loss_fn}_{embed_dim}.safetensors"
    ))
}

/// Manifest path paired with a weights path.
pub fn manifest_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_naming() {
        let path = checkpoint_path(
            Path::new("checkpoint"),
            Architecture::BiLstm,
            2,
            true,
            LossFn::CrossEntropy,
            100,
        );
        assert_eq!(
            path,
            PathBuf::from("checkpoint/rnn_bilstm_2_true_cross_entropy_100.safetensors")
        );
        assert_eq!(
            manifest_path(&path),
            PathBuf::from("checkpoint/rnn_bilstm_2_true_cross_entropy_100.json")
        );
    }

    #[test]
    fn test_loss_fn_parse() {
        assert_eq!("cross_entropy".parse::<LossFn>().unwrap(), LossFn::CrossEntropy);
        assert!("macro_f1".parse::<LossFn>().is_err());
    }

    #[test]
    fn test_train_config_builder() {
        let cfg = TrainConfig::new().with_epochs(3).with_batch_size(0).with_seed(9);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.learning_rate, 1e-3);
    }
}
