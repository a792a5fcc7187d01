use std::collections::HashMap;
use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use serde::Deserialize;
use tracing::info;

use crate::error::{Result, SeqtagError};
use crate::features::BertBatch;

/// The part of `config.json` the classification head needs.
#[derive(Deserialize)]
struct HeadConfig {
    hidden_size: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// Label names of a token-classification export, ordered by id, read from
/// the `id2label` table of its `config.json`.
pub fn load_label_names<P: AsRef<Path>>(model_dir: P) -> Result<Vec<String>> {
    let path = model_dir.as_ref().join("config.json");
    let head: HeadConfig = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let mut labels: Vec<(usize, String)> = head
        .id2label
        .into_iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|id| (id, label))
                .map_err(|_| SeqtagError::InvalidConfig(format!("id2label key {id:?} is not an index")))
        })
        .collect::<Result<_>>()?;
    if labels.is_empty() {
        return Err(SeqtagError::InvalidConfig(format!(
            "{} has no id2label table",
            path.display()
        )));
    }
    labels.sort_by_key(|(id, _)| *id);
    if labels.iter().enumerate().any(|(i, (id, _))| i != *id) {
        return Err(SeqtagError::InvalidConfig("id2label ids are not contiguous".into()));
    }
    Ok(labels.into_iter().map(|(_, label)| label).collect())
}

/// A BERT token-classification model (encoder + linear `classifier` head),
/// loaded from a Hugging Face style directory holding `config.json` and
/// `model.safetensors`.
pub struct BertTagger {
    bert: BertModel,
    classifier: Linear,
    num_labels: usize,
}

impl BertTagger {
    pub fn load<P: AsRef<Path>>(model_dir: P, num_labels: usize, device: &Device) -> Result<Self> {
        let dir = model_dir.as_ref();
        let config_path = dir.join("config.json");
        let weights_path = dir.join("model.safetensors");
        for path in [&config_path, &weights_path] {
            if !path.is_file() {
                return Err(SeqtagError::MissingResource {
                    path: path.clone(),
                    hint: "expected a BERT token-classification export".into(),
                });
            }
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_str)?;
        let head: HeadConfig = serde_json::from_str(&config_str)?;

        // SAFETY: the weights file is not modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, device)? };
        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let classifier = candle_nn::linear(head.hidden_size, num_labels, vb.pp("classifier"))?;
        info!(dir = %dir.display(), num_labels, "loaded BERT tagger");

        Ok(Self {
            bert,
            classifier,
            num_labels,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Label logits `[n, max_len, num_labels]` over word pieces.
    pub fn forward(&self, batch: &BertBatch) -> Result<Tensor> {
        let hidden = self.bert.forward(
            &batch.input_ids,
            &batch.token_type_ids,
            Some(&batch.attention_mask),
        )?;
        Ok(self.classifier.forward(&hidden)?)
    }

    /// Word-level label indices, read off each word's first piece. Words
    /// without a piece get `None`.
    pub fn predict(&self, batch: &BertBatch) -> Result<Vec<Vec<Option<usize>>>> {
        let logits = self.forward(batch)?;
        let best = logits.argmax(D::Minus1)?.to_vec2::<u32>()?;
        Ok(word_predictions(&best, &batch.word_starts))
    }
}

/// Pick the prediction at every word's first piece, one entry per word.
pub fn word_predictions(
    piece_labels: &[Vec<u32>],
    word_starts: &[Vec<Option<usize>>],
) -> Vec<Vec<Option<usize>>> {
    piece_labels
        .iter()
        .zip(word_starts)
        .map(|(row, starts)| {
            starts
                .iter()
                .map(|start| start.and_then(|p| row.get(p)).map(|&l| l as usize))
                .collect()
        })
        .collect()
}
