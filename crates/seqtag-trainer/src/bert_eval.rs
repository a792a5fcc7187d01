//! Scoring of pretrained BERT token classifiers.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use candle_core::Device;
use tracing::info;

use seqtag_core::model::load_label_names;
use seqtag_core::{BertFeatureExtractor, BertTagger, FeatureExtractor, Scores, Sentence, Vocab, evaluate};

const BATCH_SIZE: usize = 32;
const OUTSIDE: &str = "O";

/// Run the token classifier exported in `model_dir` (`config.json`,
/// `model.safetensors`, `tokenizer.json`) over labeled `sentences`.
pub fn evaluate_bert(model_dir: &Path, sentences: &[Sentence], device: &Device) -> Result<Scores> {
    let labels = load_label_names(model_dir)
        .with_context(|| format!("reading label table of {}", model_dir.display()))?;
    let vocab = Vocab::from_labels(labels);
    let extractor = BertFeatureExtractor::from_file(model_dir.join("tokenizer.json"), vocab)?
        .with_device(device.clone());
    let model = BertTagger::load(model_dir, extractor.vocab().num_labels(), device)?;

    let gold = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| s.tags().ok_or_else(|| anyhow!("sentence {i} has no gold tags")))
        .collect::<Result<Vec<_>>>()?;

    let mut predicted = Vec::with_capacity(sentences.len());
    for chunk in sentences.chunks(BATCH_SIZE) {
        let stripped: Vec<Sentence> = chunk.iter().map(Sentence::without_tags).collect();
        let batch = extractor.extract(&stripped)?;
        for (sentence, indices) in chunk.iter().zip(model.predict(&batch)?) {
            predicted.push(word_labels(extractor.vocab(), &indices, sentence.len())?);
        }
    }

    let scores = evaluate(&gold, &predicted)?;
    info!(
        sentences = sentences.len(),
        precision = scores.precision,
        recall = scores.recall,
        f1 = scores.f1,
        "evaluated BERT tagger"
    );
    Ok(scores)
}

/// Label strings for every word of a sentence of `len` words. Words the
/// tokenizer dropped or truncation cut off are labeled `O`.
fn word_labels(vocab: &Vocab, indices: &[Option<usize>], len: usize) -> Result<Vec<String>> {
    (0..len)
        .map(|w| match indices.get(w).copied().flatten() {
            Some(i) => vocab
                .label(i)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("label index {i} out of range")),
            None => Ok(OUTSIDE.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_labels_pads_truncated_words() {
        let vocab = Vocab::from_labels(vec!["O".into(), "B-PER".into()]);
        assert_eq!(
            word_labels(&vocab, &[Some(1), Some(0)], 4).unwrap(),
            vec!["B-PER", "O", "O", "O"]
        );
        assert!(word_labels(&vocab, &[Some(5)], 1).is_err());
    }

    #[test]
    fn test_word_labels_keeps_dropped_word_in_place() {
        let vocab = Vocab::from_labels(vec!["O".into(), "B-PER".into(), "B-LOC".into()]);
        assert_eq!(
            word_labels(&vocab, &[Some(1), None, Some(2)], 3).unwrap(),
            vec!["B-PER", "O", "B-LOC"]
        );
    }

    #[test]
    fn test_missing_export_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sentences = seqtag_core::data::parse_sentences("John NNP B-PER\n").unwrap();
        assert!(evaluate_bert(dir.path(), &sentences, &Device::Cpu).is_err());
    }
}
