//! # Sequence Taggers
//!
//! `RnnTagger` embeds word indices, concatenates the auxiliary feature
//! channel, runs an LSTM / BiLSTM / CNN encoder and projects every position
//! to label logits. `BertTagger` runs a pretrained BERT encoder with a
//! token-classification head.

pub mod bert;

pub use bert::{BertTagger, load_label_names};

use std::fmt;
use std::str::FromStr;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::rnn::{Direction, LSTMConfig};
use candle_nn::{Conv1d, Conv1dConfig, Embedding, LSTM, Linear, Module, RNN, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqtagError};

/// Encoder family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Lstm,
    BiLstm,
    Cnn,
}

impl Architecture {
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Lstm => "lstm",
            Architecture::BiLstm => "bilstm",
            Architecture::Cnn => "cnn",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = SeqtagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lstm" => Ok(Architecture::Lstm),
            "bilstm" => Ok(Architecture::BiLstm),
            "cnn" => Ok(Architecture::Cnn),
            other => Err(SeqtagError::InvalidConfig(format!(
                "unknown architecture {other:?} (expected lstm, bilstm or cnn)"
            ))),
        }
    }
}

/// Shape of an [`RnnTagger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub architecture: Architecture,
    pub n_layers: usize,
    pub hidden_dim: usize,
    pub kernel_size: usize,
    pub vocab_size: usize,
    pub embed_dim: usize,
    pub additional_feature_dim: usize,
    pub num_labels: usize,
}

impl ModelConfig {
    pub fn new(
        architecture: Architecture,
        vocab_size: usize,
        embed_dim: usize,
        additional_feature_dim: usize,
        num_labels: usize,
    ) -> Self {
        Self {
            architecture,
            n_layers: 1,
            hidden_dim: 128,
            kernel_size: 3,
            vocab_size,
            embed_dim,
            additional_feature_dim,
            num_labels,
        }
    }

    pub fn with_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers.max(1);
        self
    }

    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Convolution width; even values are bumped to the next odd one so
    /// the output keeps the input length.
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size.max(1) | 1;
        self
    }

    fn input_dim(&self) -> usize {
        self.embed_dim + self.additional_feature_dim
    }
}

enum Encoder {
    Lstm(Vec<LSTM>),
    BiLstm(Vec<(LSTM, LSTM)>),
    Cnn(Vec<Conv1d>),
}

/// Embedding + encoder + linear head.
pub struct RnnTagger {
    config: ModelConfig,
    embedding: Embedding,
    encoder: Encoder,
    classifier: Linear,
}

impl RnnTagger {
    /// Create the model's variables in `varmap`, initialising the embedding
    /// table from `embedding_matrix` (`[vocab_size, embed_dim]`).
    pub fn new(config: ModelConfig, embedding_matrix: &Tensor, varmap: &VarMap, device: &Device) -> Result<Self> {
        let (rows, cols) = embedding_matrix.dims2()?;
        if rows != config.vocab_size || cols != config.embed_dim {
            return Err(SeqtagError::ShapeMismatch(format!(
                "embedding matrix is {rows}x{cols}, model expects {}x{}",
                config.vocab_size, config.embed_dim
            )));
        }

        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let embedding = candle_nn::embedding(config.vocab_size, config.embed_dim, vb.pp("embedding"))?;
        set_var(varmap, "embedding.weight", embedding_matrix)?;

        let hidden = config.hidden_dim;
        let (encoder, out_dim) = match config.architecture {
            Architecture::Lstm => {
                let layers = (0..config.n_layers)
                    .map(|i| {
                        let in_dim = if i == 0 { config.input_dim() } else { hidden };
                        candle_nn::lstm(in_dim, hidden, LSTMConfig::default(), vb.pp(format!("lstm.{i}")))
                    })
                    .collect::<candle_core::Result<Vec<_>>>()?;
                (Encoder::Lstm(layers), hidden)
            }
            Architecture::BiLstm => {
                let mut layers = Vec::with_capacity(config.n_layers);
                for i in 0..config.n_layers {
                    let in_dim = if i == 0 { config.input_dim() } else { 2 * hidden };
                    let forward = candle_nn::lstm(in_dim, hidden, LSTMConfig::default(), vb.pp(format!("bilstm.{i}")))?;
                    let backward_cfg = LSTMConfig {
                        direction: Direction::Backward,
                        ..Default::default()
                    };
                    let backward = candle_nn::lstm(in_dim, hidden, backward_cfg, vb.pp(format!("bilstm.{i}")))?;
                    layers.push((forward, backward));
                }
                (Encoder::BiLstm(layers), 2 * hidden)
            }
            Architecture::Cnn => {
                let padding = config.kernel_size / 2;
                let layers = (0..config.n_layers)
                    .map(|i| {
                        let in_dim = if i == 0 { config.input_dim() } else { hidden };
                        let conv_cfg = Conv1dConfig {
                            padding,
                            ..Default::default()
                        };
                        candle_nn::conv1d(in_dim, hidden, config.kernel_size, conv_cfg, vb.pp(format!("cnn.{i}")))
                    })
                    .collect::<candle_core::Result<Vec<_>>>()?;
                (Encoder::Cnn(layers), hidden)
            }
        };

        let classifier = candle_nn::linear(out_dim, config.num_labels, vb.pp("classifier"))?;

        Ok(Self {
            config,
            embedding,
            encoder,
            classifier,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Label logits `[n, max_len, num_labels]`.
    ///
    /// * `token_ids` - `[n, max_len]` u32
    /// * `features` - `[n, max_len, additional_feature_dim]` f32
    /// * `lengths` - true sentence lengths, used to reverse the backward
    ///   LSTM direction within each sentence
    pub fn forward(&self, token_ids: &Tensor, features: &Tensor, lengths: &[usize]) -> Result<Tensor> {
        let embedded = self.embedding.forward(token_ids)?;
        let mut hidden = Tensor::cat(&[&embedded, features], 2)?;

        match &self.encoder {
            Encoder::Lstm(layers) => {
                for lstm in layers {
                    let states = lstm.seq(&hidden)?;
                    hidden = lstm.states_to_tensor(&states)?;
                }
            }
            Encoder::BiLstm(layers) => {
                let reverse = reverse_index(lengths, hidden.dim(1)?, hidden.device())?;
                for (forward, backward) in layers {
                    let fw = forward.states_to_tensor(&forward.seq(&hidden)?)?;
                    let reversed = gather_time(&hidden, &reverse)?;
                    let bw = backward.states_to_tensor(&backward.seq(&reversed)?)?;
                    let bw = gather_time(&bw, &reverse)?;
                    hidden = Tensor::cat(&[&fw, &bw], 2)?;
                }
            }
            Encoder::Cnn(layers) => {
                let mut x = hidden.transpose(1, 2)?.contiguous()?;
                for conv in layers {
                    x = conv.forward(&x)?.relu()?;
                }
                hidden = x.transpose(1, 2)?.contiguous()?;
            }
        }

        Ok(self.classifier.forward(&hidden)?)
    }
}

/// Overwrite a variable created by a `VarBuilder` over `varmap`.
fn set_var(varmap: &VarMap, name: &str, value: &Tensor) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| SeqtagError::InvalidConfig("variable map lock poisoned".into()))?;
    let var = data
        .get(name)
        .ok_or_else(|| SeqtagError::InvalidConfig(format!("no variable named {name:?}")))?;
    var.set(&value.to_dtype(DType::F32)?.to_device(var.device())?)?;
    Ok(())
}

/// `[n, max_len]` u32 time indices reversing the first `len` positions of
/// every row and leaving padding in place.
pub fn reverse_index(lengths: &[usize], max_len: usize, device: &Device) -> Result<Tensor> {
    let idx: Vec<u32> = lengths
        .iter()
        .flat_map(|&len| {
            let len = len.min(max_len);
            (0..max_len).map(move |t| if t < len { (len - 1 - t) as u32 } else { t as u32 })
        })
        .collect();
    Ok(Tensor::from_vec(idx, (lengths.len(), max_len), device)?)
}

/// Permute `x` (`[n, max_len, f]`) along time with a `[n, max_len]` index.
fn gather_time(x: &Tensor, index: &Tensor) -> Result<Tensor> {
    let (n, t, f) = x.dims3()?;
    let index = index.unsqueeze(2)?.broadcast_as((n, t, f))?.contiguous()?;
    Ok(x.contiguous()?.gather(&index, 1)?)
}

/// Mean negative log-likelihood over positions whose label is not -1.
///
/// * `logits` - `[n, max_len, num_labels]`
/// * `labels` - `[n, max_len]` i64
pub fn masked_cross_entropy(logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    let mask = labels.ge(0i64)?.to_dtype(DType::F32)?;
    let targets = labels
        .clamp(0i64, i64::MAX)?
        .to_dtype(DType::U32)?
        .unsqueeze(D::Minus1)?;
    let picked = log_probs.gather(&targets, D::Minus1)?.squeeze(D::Minus1)?;

    let count = mask.sum_all()?.to_scalar::<f32>()?;
    if count == 0.0 {
        return Ok(Tensor::zeros((), DType::F32, logits.device())?);
    }
    let total = (picked * mask)?.sum_all()?.neg()?;
    Ok((total / f64::from(count))?)
}

/// Per-position log-probabilities `[n][max_len][num_labels]` for decoding.
pub fn log_probabilities(logits: &Tensor) -> Result<Vec<Vec<Vec<f32>>>> {
    Ok(candle_nn::ops::log_softmax(logits, D::Minus1)?.to_vec3::<f32>()?)
}
