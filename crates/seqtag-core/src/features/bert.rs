//! Word-piece features for BERT token classification.

use std::path::Path;

use candle_core::{Device, Tensor};
use tokenizers::Tokenizer as HfTokenizer;

use super::{FeatureExtractor, MAX_LEN, batch_is_labeled};
use crate::data::Sentence;
use crate::error::{Result, SeqtagError};
use crate::vocab::Vocab;

const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";
const PAD_ID: u32 = 0;
const OUTSIDE: &str = "O";

/// Fixed-shape BERT inputs for one batch of `n` sentences.
#[derive(Debug, Clone)]
pub struct BertBatch {
    /// `[n, max_len]` u32 word-piece ids: `[CLS] pieces [SEP]` then 0s.
    pub input_ids: Tensor,
    /// `[n, max_len]` u32 zeros (single-segment input).
    pub token_type_ids: Tensor,
    /// `[n, max_len]` f32, 1.0 where `input_ids > 0`.
    pub attention_mask: Tensor,
    /// `[n, max_len]` i64 label indices on the first piece of every word,
    /// the `O` index everywhere else. Present when labeled.
    pub labels: Option<Tensor>,
    /// `[n, max_len]` f32, 1.0 on the first piece of every word.
    pub label_mask: Tensor,
    /// For each sentence, one entry per input word: the position of its
    /// first piece, or `None` when the tokenizer dropped the word or it was
    /// truncated away.
    pub word_starts: Vec<Vec<Option<usize>>>,
}

/// Tokenizes sentences into word pieces with a Hugging Face tokenizer.
pub struct BertFeatureExtractor {
    tokenizer: HfTokenizer,
    vocab: Vocab,
    max_len: usize,
    cls_id: u32,
    sep_id: u32,
    device: Device,
}

impl BertFeatureExtractor {
    pub fn new(tokenizer: HfTokenizer, vocab: Vocab) -> Result<Self> {
        let special = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| SeqtagError::Tokenizer(format!("vocabulary has no {token} token")))
        };
        let cls_id = special(CLS)?;
        let sep_id = special(SEP)?;
        Ok(Self {
            tokenizer,
            vocab,
            max_len: MAX_LEN,
            cls_id,
            sep_id,
            device: Device::Cpu,
        })
    }

    /// Load a `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P, vocab: Vocab) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SeqtagError::MissingResource {
                path: path.to_path_buf(),
                hint: "expected a Hugging Face tokenizer.json".into(),
            });
        }
        let tokenizer =
            HfTokenizer::from_file(path).map_err(|e| SeqtagError::Tokenizer(e.to_string()))?;
        Self::new(tokenizer, vocab)
    }

    pub fn with_max_len(mut self, max_len: usize) -> Result<Self> {
        if max_len < 3 {
            return Err(SeqtagError::InvalidConfig(format!(
                "BERT max_len must leave room for [CLS], [SEP] and one piece, got {max_len}"
            )));
        }
        self.max_len = max_len;
        Ok(self)
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Word pieces of one sentence, truncated to `max_len - 2`, with the
    /// index of the word each piece came from.
    fn pieces(&self, sentence: &Sentence) -> Result<(Vec<u32>, Vec<Option<u32>>)> {
        let encoding = self
            .tokenizer
            .encode(sentence.words(), false)
            .map_err(|e| SeqtagError::Tokenizer(e.to_string()))?;
        let keep = encoding.get_ids().len().min(self.max_len - 2);
        Ok((
            encoding.get_ids()[..keep].to_vec(),
            encoding.get_word_ids()[..keep].to_vec(),
        ))
    }
}

impl FeatureExtractor for BertFeatureExtractor {
    type Batch = BertBatch;

    fn extract(&self, sentences: &[Sentence]) -> Result<BertBatch> {
        let labeled = batch_is_labeled(sentences)?;
        let outside = if labeled {
            self.vocab.label_index(OUTSIDE)? as i64
        } else {
            0
        };

        let n = sentences.len();
        let max_len = self.max_len;
        let mut input_ids = vec![PAD_ID; n * max_len];
        let mut labels = vec![outside; n * max_len];
        let mut label_mask = vec![0.0f32; n * max_len];
        let mut word_starts = Vec::with_capacity(n);

        for (row, sentence) in sentences.iter().enumerate() {
            let (ids, word_ids) = self.pieces(sentence)?;
            let base = row * max_len;

            input_ids[base] = self.cls_id;
            input_ids[base + 1..base + 1 + ids.len()].copy_from_slice(&ids);
            input_ids[base + 1 + ids.len()] = self.sep_id;

            let mut starts = vec![None; sentence.len()];
            for (piece, word) in word_ids.iter().enumerate() {
                let Some(word) = word.map(|w| w as usize) else {
                    continue;
                };
                let Some(slot) = starts.get_mut(word) else {
                    continue;
                };
                if slot.is_some() {
                    continue;
                }

                let position = piece + 1;
                *slot = Some(position);
                label_mask[base + position] = 1.0;
                if labeled {
                    if let Some(tag) = sentence.tokens[word].tag.as_deref() {
                        labels[base + position] = self.vocab.label_index(tag)? as i64;
                    }
                }
            }
            word_starts.push(starts);
        }

        let attention_mask: Vec<f32> = input_ids
            .iter()
            .map(|&id| if id > PAD_ID { 1.0 } else { 0.0 })
            .collect();

        Ok(BertBatch {
            input_ids: Tensor::from_vec(input_ids, (n, max_len), &self.device)?,
            token_type_ids: Tensor::zeros((n, max_len), candle_core::DType::U32, &self.device)?,
            attention_mask: Tensor::from_vec(attention_mask, (n, max_len), &self.device)?,
            labels: if labeled {
                Some(Tensor::from_vec(labels, (n, max_len), &self.device)?)
            } else {
                None
            },
            label_mask: Tensor::from_vec(label_mask, (n, max_len), &self.device)?,
            word_starts,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{TaggedToken, parse_sentences};

    /// Small uncased word-piece tokenizer: [PAD]=0 [UNK]=1 [CLS]=2 [SEP]=3.
    pub(crate) fn test_tokenizer() -> HfTokenizer {
        let json = r###"{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": true
            },
            "pre_tokenizer": { "type": "BertPreTokenizer" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordPiece",
                "unk_token": "[UNK]",
                "continuing_subword_prefix": "##",
                "max_input_chars_per_word": 100,
                "vocab": {
                    "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
                    "john": 4, "lives": 5, "in": 6, "new": 7, "york": 8,
                    "wash": 9, "##ing": 10, "##ton": 11, "."  : 12
                }
            }
        }"###;
        HfTokenizer::from_bytes(json.as_bytes()).unwrap()
    }

    fn corpus() -> Vec<Sentence> {
        parse_sentences(
            "John NNP B-PER\nlives VBZ O\nin IN O\nWashington NNP B-GPE\n. . O\n",
        )
        .unwrap()
    }

    #[test]
    fn test_requires_special_tokens() {
        let json = r###"{"version":"1.0","truncation":null,"padding":null,"added_tokens":[],
            "normalizer":null,"pre_tokenizer":null,"post_processor":null,"decoder":null,
            "model":{"type":"WordPiece","unk_token":"[UNK]","continuing_subword_prefix":"##",
            "max_input_chars_per_word":100,"vocab":{"[UNK]":0}}}"###;
        let tokenizer = HfTokenizer::from_bytes(json.as_bytes()).unwrap();
        let vocab = Vocab::build(&corpus());
        assert!(matches!(
            BertFeatureExtractor::new(tokenizer, vocab),
            Err(SeqtagError::Tokenizer(_))
        ));
    }

    #[test]
    fn test_word_pieces_and_alignment() {
        let sentences = corpus();
        let vocab = Vocab::build(&sentences);
        let extractor = BertFeatureExtractor::new(test_tokenizer(), vocab.clone())
            .unwrap()
            .with_max_len(10)
            .unwrap();
        let batch = extractor.extract(&sentences).unwrap();

        let ids = batch.input_ids.to_vec2::<u32>().unwrap();
        // [CLS] john lives in wash ##ing ##ton . [SEP] [PAD]
        assert_eq!(ids[0], vec![2, 4, 5, 6, 9, 10, 11, 12, 3, 0]);

        let attention = batch.attention_mask.to_vec2::<f32>().unwrap();
        assert_eq!(attention[0], vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]);

        assert_eq!(batch.word_starts[0], vec![Some(1), Some(2), Some(3), Some(4), Some(7)]);

        let o = vocab.label_index("O").unwrap() as i64;
        let per = vocab.label_index("B-PER").unwrap() as i64;
        let gpe = vocab.label_index("B-GPE").unwrap() as i64;
        let labels = batch.labels.unwrap().to_vec2::<i64>().unwrap();
        assert_eq!(labels[0], vec![o, per, o, o, gpe, o, o, o, o, o]);

        let label_mask = batch.label_mask.to_vec2::<f32>().unwrap();
        assert_eq!(label_mask[0], vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_truncation_keeps_cls_and_sep() {
        let sentences = corpus();
        let extractor = BertFeatureExtractor::new(test_tokenizer(), Vocab::build(&sentences))
            .unwrap()
            .with_max_len(5)
            .unwrap();
        let batch = extractor.extract(&sentences).unwrap();

        let ids = batch.input_ids.to_vec2::<u32>().unwrap();
        assert_eq!(ids[0], vec![2, 4, 5, 6, 3]);
        assert_eq!(batch.word_starts[0], vec![Some(1), Some(2), Some(3), None, None]);
    }

    #[test]
    fn test_dropped_word_keeps_its_slot() {
        let sentences = vec![Sentence::new(vec![
            TaggedToken::labeled("John", "NNP", "B-PER"),
            TaggedToken::labeled("\u{200b}", "SYM", "O"),
            TaggedToken::labeled("lives", "VBZ", "O"),
            TaggedToken::labeled("in", "IN", "O"),
        ])];
        let vocab = Vocab::build(&sentences);
        let extractor = BertFeatureExtractor::new(test_tokenizer(), vocab.clone())
            .unwrap()
            .with_max_len(8)
            .unwrap();
        let batch = extractor.extract(&sentences).unwrap();

        // [CLS] john lives in [SEP]
        let ids = batch.input_ids.to_vec2::<u32>().unwrap();
        assert_eq!(ids[0][..5], [2, 4, 5, 6, 3]);
        assert_eq!(batch.word_starts[0].len(), sentences[0].len());
        assert_eq!(batch.word_starts[0], vec![Some(1), None, Some(2), Some(3)]);

        let per = vocab.label_index("B-PER").unwrap() as i64;
        let labels = batch.labels.unwrap().to_vec2::<i64>().unwrap();
        assert_eq!(labels[0][1], per);
    }

    #[test]
    fn test_rejects_tiny_max_len() {
        let extractor =
            BertFeatureExtractor::new(test_tokenizer(), Vocab::build(&corpus())).unwrap();
        assert!(extractor.with_max_len(2).is_err());
    }
}
