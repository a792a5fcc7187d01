//! Training and inference driver around an [`RnnTagger`].

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use serde::Serialize;
use tracing::{debug, info, warn};

use seqtag_core::data::split::shuffle;
use seqtag_core::embedding::random_embedding_matrix;
use seqtag_core::model::log_probabilities;
use seqtag_core::scheme::is_bio;
use seqtag_core::{
    FeatureExtractor, RnnFeatureExtractor, RnnTagger, Scores, Sentence, ViterbiDecoder,
    evaluate, masked_cross_entropy,
};

use crate::checkpoint::{load_checkpoint, save_checkpoint};
use crate::config::{RunManifest, TrainConfig, manifest_path};

/// Sentences per forward pass at inference time.
const INFERENCE_BATCH: usize = 64;

/// Label used to pad predictions of sentences longer than `max_len`.
const FALLBACK_LABEL: &str = "O";

/// Per-epoch training summary.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub mean_loss: f32,
    pub validation: Option<Scores>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    /// Epoch (1-based) whose weights were kept, if validation ran.
    pub best_epoch: Option<usize>,
    pub best_f1: Option<f64>,
}

/// An RNN/CNN tagger together with its feature extractor and decoder.
pub struct RnnClassifier {
    manifest: RunManifest,
    extractor: RnnFeatureExtractor,
    model: RnnTagger,
    varmap: VarMap,
    decoder: Option<ViterbiDecoder>,
    device: Device,
}

impl RnnClassifier {
    /// Fresh classifier whose embedding table starts from `embedding_matrix`.
    pub fn build(manifest: RunManifest, embedding_matrix: &Tensor, device: &Device) -> Result<Self> {
        let extractor = RnnFeatureExtractor::new(
            manifest.vocab.clone(),
            manifest.include_manual_features,
            Some(manifest.max_len),
        )
        .with_device(device.clone());

        if extractor.additional_feature_dim() != manifest.model.additional_feature_dim {
            anyhow::bail!(
                "model expects {} auxiliary features, extractor produces {}",
                manifest.model.additional_feature_dim,
                extractor.additional_feature_dim()
            );
        }
        if manifest.vocab.num_labels() != manifest.model.num_labels {
            anyhow::bail!(
                "model has {} outputs for {} labels",
                manifest.model.num_labels,
                manifest.vocab.num_labels()
            );
        }

        let varmap = VarMap::new();
        let model = RnnTagger::new(manifest.model.clone(), embedding_matrix, &varmap, device)?;
        info!(
            architecture = %manifest.model.architecture,
            n_layers = manifest.model.n_layers,
            vocab_size = manifest.model.vocab_size,
            num_labels = manifest.model.num_labels,
            manual_features = manifest.include_manual_features,
            "built classifier"
        );

        Ok(Self {
            manifest,
            extractor,
            model,
            varmap,
            decoder: None,
            device: device.clone(),
        })
    }

    /// Rebuild from weights at `path` and the manifest beside them.
    /// `max_len` overrides the padded length used at training time.
    pub fn from_checkpoint(path: &Path, max_len: Option<usize>, device: &Device) -> Result<Self> {
        let mut manifest = RunManifest::load(manifest_path(path))?;
        if let Some(max_len) = max_len {
            manifest.max_len = max_len;
        }
        let matrix = random_embedding_matrix(
            manifest.model.vocab_size,
            manifest.model.embed_dim,
            0,
            device,
        )?;
        let classifier = Self::build(manifest, &matrix, device)?;
        classifier.load_checkpoint(path)?;
        Ok(classifier)
    }

    /// Decode with BIO constraints instead of per-token argmax. Label sets
    /// without BIO prefixes (POS tags) get an unconstrained decoder.
    pub fn with_constrained_decoding(mut self, constrained: bool) -> Self {
        let labels = self.manifest.vocab.labels();
        self.decoder = match (constrained, is_bio(labels)) {
            (false, _) => None,
            (true, true) => Some(ViterbiDecoder::constrained(labels)),
            (true, false) => {
                warn!("label set has no BIO prefixes, decoding without constraints");
                Some(ViterbiDecoder::unconstrained(labels.len()))
            }
        };
        self
    }

    pub fn manifest(&self) -> &RunManifest {
        &self.manifest
    }

    pub fn extractor(&self) -> &RnnFeatureExtractor {
        &self.extractor
    }

    /// Train on `train`, scoring `val` after every epoch. With a checkpoint
    /// path the weights are saved whenever validation F1 improves, or after
    /// every epoch when `val` is empty.
    pub fn fit(
        &mut self,
        train: &[Sentence],
        val: &[Sentence],
        config: &TrainConfig,
        checkpoint: Option<&Path>,
    ) -> Result<FitReport> {
        if train.is_empty() {
            anyhow::bail!("no training sentences");
        }
        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let batch_size = config.batch_size.max(1);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut report = FitReport::default();
        let mut best_f1 = f64::NEG_INFINITY;

        info!(
            train = train.len(),
            val = val.len(),
            epochs = config.epochs,
            batch_size,
            learning_rate = config.learning_rate,
            "starting training"
        );

        for epoch in 1..=config.epochs {
            shuffle(&mut order, config.seed.wrapping_add(epoch as u64));

            let mut total_loss = 0f32;
            let mut steps = 0usize;
            for chunk in order.chunks(batch_size) {
                let sentences: Vec<Sentence> = chunk.iter().map(|&i| train[i].clone()).collect();
                let batch = self.extractor.extract(&sentences)?;
                let labels = batch
                    .labels
                    .as_ref()
                    .ok_or_else(|| anyhow!("training sentences must be labeled"))?;

                let logits = self.model.forward(&batch.token_ids, &batch.features, &batch.lengths)?;
                let loss = masked_cross_entropy(&logits, labels)?;
                optimizer.backward_step(&loss)?;

                total_loss += loss.to_scalar::<f32>()?;
                steps += 1;
                debug!(epoch, step = steps, "batch done");
            }
            let mean_loss = total_loss / steps.max(1) as f32;

            let validation = if val.is_empty() {
                None
            } else {
                Some(self.evaluate(val)?)
            };

            match &validation {
                Some(scores) => {
                    info!(
                        epoch,
                        mean_loss,
                        precision = scores.precision,
                        recall = scores.recall,
                        f1 = scores.f1,
                        "epoch complete"
                    );
                    if scores.f1 > best_f1 {
                        best_f1 = scores.f1;
                        report.best_epoch = Some(epoch);
                        report.best_f1 = Some(scores.f1);
                        if let Some(path) = checkpoint {
                            self.save_checkpoint(path)?;
                        }
                    }
                }
                None => {
                    info!(epoch, mean_loss, "epoch complete");
                    if let Some(path) = checkpoint {
                        self.save_checkpoint(path)?;
                    }
                }
            }

            report.epochs.push(EpochReport {
                epoch,
                mean_loss,
                validation,
            });
        }

        Ok(report)
    }

    /// Label sequences for `sentences`, one label per token. Any gold tags
    /// on the input are ignored.
    pub fn predict(&self, sentences: &[Sentence]) -> Result<Vec<Vec<String>>> {
        let mut out = Vec::with_capacity(sentences.len());
        for chunk in sentences.chunks(INFERENCE_BATCH) {
            let stripped: Vec<Sentence> = chunk.iter().map(Sentence::without_tags).collect();
            let batch = self.extractor.extract(&stripped)?;
            let logits = self.model.forward(&batch.token_ids, &batch.features, &batch.lengths)?;
            let log_probs = log_probabilities(&logits)?;

            for (sentence, scores) in chunk.iter().zip(&log_probs) {
                let kept = sentence.len().min(scores.len());
                let indices = self.decode(&scores[..kept])?;
                out.push(self.to_labels(&indices, sentence.len())?);
            }
        }
        Ok(out)
    }

    /// Chunk-level scores of predictions against the gold tags of
    /// `sentences`.
    pub fn evaluate(&self, sentences: &[Sentence]) -> Result<Scores> {
        let gold = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                s.tags()
                    .ok_or_else(|| anyhow!("sentence {i} has no gold tags"))
            })
            .collect::<Result<Vec<_>>>()?;
        let predicted = self.predict(sentences)?;
        Ok(evaluate(&gold, &predicted)?)
    }

    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        save_checkpoint(&self.varmap, path)?;
        self.manifest.save(manifest_path(path))
    }

    pub fn load_checkpoint(&self, path: &Path) -> Result<()> {
        load_checkpoint(&self.varmap, path, &self.device)
            .with_context(|| format!("restoring classifier from {}", path.display()))
    }

    fn decode(&self, scores: &[Vec<f32>]) -> Result<Vec<usize>> {
        match &self.decoder {
            Some(decoder) => Ok(decoder.decode(scores)?),
            None => Ok(scores.iter().map(|row| argmax(row)).collect()),
        }
    }

    fn to_labels(&self, indices: &[usize], len: usize) -> Result<Vec<String>> {
        let vocab = &self.manifest.vocab;
        let mut labels = indices
            .iter()
            .map(|&i| {
                vocab
                    .label(i)
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("label index {i} out of range"))
            })
            .collect::<Result<Vec<_>>>()?;

        if labels.len() < len {
            let filler = if vocab.label_index(FALLBACK_LABEL).is_ok() {
                FALLBACK_LABEL
            } else {
                vocab.label(0).ok_or_else(|| anyhow!("empty label set"))?
            };
            warn!(
                len,
                max_len = self.extractor.max_len(),
                "sentence truncated, padding predictions with {filler}"
            );
            labels.resize(len, filler.to_string());
        }
        Ok(labels)
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqtag_core::data::parse_sentences;
    use seqtag_core::{Architecture, ModelConfig, Vocab};

    use crate::config::LossFn;

    const CORPUS: &str = "\
John NNP B-PER
lives VBZ O
in IN O
Paris NNP B-LOC
. . O

Mary NNP B-PER
visited VBD O
New NNP B-LOC
York NNP I-LOC

He PRP O
left VBD O
";

    fn classifier(sentences: &[Sentence], max_len: usize) -> RnnClassifier {
        let device = Device::Cpu;
        let vocab = Vocab::build(sentences);
        let extractor = RnnFeatureExtractor::new(vocab.clone(), true, Some(max_len));
        let model = ModelConfig::new(
            Architecture::BiLstm,
            vocab.num_words(),
            8,
            extractor.additional_feature_dim(),
            vocab.num_labels(),
        )
        .with_hidden_dim(16);
        let manifest = RunManifest {
            model,
            include_manual_features: true,
            max_len,
            loss_fn: LossFn::CrossEntropy,
            vocab,
        };
        let matrix = random_embedding_matrix(manifest.model.vocab_size, 8, 7, &device).unwrap();
        RnnClassifier::build(manifest, &matrix, &device).unwrap()
    }

    #[test]
    fn test_predict_matches_sentence_lengths() {
        let sentences = parse_sentences(CORPUS).unwrap();
        let clf = classifier(&sentences, 10);
        let predictions = clf.predict(&sentences).unwrap();
        let lengths: Vec<usize> = predictions.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![5, 4, 2]);
        let labels = clf.manifest().vocab.labels();
        assert!(predictions.iter().flatten().all(|l| labels.contains(l)));
    }

    #[test]
    fn test_truncated_predictions_are_padded_with_o() {
        let sentences = parse_sentences(CORPUS).unwrap();
        let clf = classifier(&sentences, 3);
        let predictions = clf.predict(&sentences).unwrap();
        assert_eq!(predictions[0].len(), 5);
        assert_eq!(predictions[0][3..], ["O", "O"]);
    }

    #[test]
    fn test_fit_learns_training_data() {
        let sentences = parse_sentences(CORPUS).unwrap();
        let mut clf = classifier(&sentences, 8);
        let config = TrainConfig::new()
            .with_epochs(40)
            .with_batch_size(3)
            .with_learning_rate(0.05);
        let report = clf.fit(&sentences, &sentences, &config, None).unwrap();

        assert_eq!(report.epochs.len(), 40);
        let first = report.epochs[0].mean_loss;
        let last = report.epochs[39].mean_loss;
        assert!(last < first, "{last} >= {first}");
        assert!(report.best_epoch.is_some());
        assert!(report.best_f1.unwrap() > 0.0);
    }

    #[test]
    fn test_constrained_decoding_yields_valid_bio() {
        let sentences = parse_sentences(CORPUS).unwrap();
        let clf = classifier(&sentences, 10).with_constrained_decoding(true);
        for labels in clf.predict(&sentences).unwrap() {
            let mut prev = "O".to_string();
            for label in labels {
                assert!(
                    seqtag_core::scheme::is_valid_transition(&prev, &label),
                    "{prev} -> {label}"
                );
                prev = label;
            }
        }
    }

    #[test]
    fn test_constrained_decoding_on_plain_labels_matches_argmax() {
        let sentences =
            parse_sentences("John NNP NNP\nlives VBZ VBZ\n\nMary NNP NNP\nleft VBD VBD\n").unwrap();
        let clf = classifier(&sentences, 6);
        let expected = clf.predict(&sentences).unwrap();
        let clf = clf.with_constrained_decoding(true);
        assert_eq!(clf.predict(&sentences).unwrap(), expected);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rnn.safetensors");
        let sentences = parse_sentences(CORPUS).unwrap();

        let mut clf = classifier(&sentences, 8);
        let config = TrainConfig::new().with_epochs(2).with_batch_size(2);
        clf.fit(&sentences, &[], &config, Some(&path)).unwrap();
        assert!(path.is_file());
        assert!(manifest_path(&path).is_file());

        let restored = RnnClassifier::from_checkpoint(&path, None, &Device::Cpu).unwrap();
        assert_eq!(restored.manifest(), clf.manifest());
        assert_eq!(
            restored.predict(&sentences).unwrap(),
            clf.predict(&sentences).unwrap()
        );
    }

    #[test]
    fn test_evaluate_requires_gold_tags() {
        let sentences = parse_sentences(CORPUS).unwrap();
        let clf = classifier(&sentences, 8);
        let unlabeled = parse_sentences("John NNP\nleft VBD\n").unwrap();
        assert!(clf.evaluate(&unlabeled).is_err());
        assert!(clf.predict(&unlabeled).is_ok());
    }
}
