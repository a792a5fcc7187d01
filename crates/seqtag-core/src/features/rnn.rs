//! Word-index features for recurrent and convolutional taggers.

use candle_core::{Device, Tensor};
use unicode_categories::UnicodeCategories;

use super::{FeatureExtractor, LABEL_PAD, MAX_LEN, batch_is_labeled, pad_sequences, to_categorical};
use crate::data::Sentence;
use crate::error::Result;
use crate::vocab::Vocab;

/// Number of hand-crafted boolean channels (upper, title, digit).
pub const MANUAL_FEATURE_DIM: usize = 3;

/// Padding value of the hand-crafted channels.
const MANUAL_PAD: f32 = -1.0;

/// Fixed-shape inputs for one batch of `n` sentences.
#[derive(Debug, Clone)]
pub struct RnnBatch {
    /// `[n, max_len]` u32 word indices, padded with the PAD index.
    pub token_ids: Tensor,
    /// `[n, max_len, additional_feature_dim]` f32 auxiliary features.
    pub features: Tensor,
    /// `[n, max_len]` i64 label indices padded with -1, when labeled.
    pub labels: Option<Tensor>,
    /// `[n, max_len]` f32, 1.0 for real tokens.
    pub mask: Tensor,
    /// Untruncated sentence lengths.
    pub lengths: Vec<usize>,
}

impl RnnBatch {
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }
}

/// Maps sentences to word indices, one-hot POS tags and optional
/// orthographic features.
#[derive(Debug, Clone)]
pub struct RnnFeatureExtractor {
    vocab: Vocab,
    include_manual_features: bool,
    max_len: usize,
    device: Device,
}

impl RnnFeatureExtractor {
    pub fn new(vocab: Vocab, include_manual_features: bool, max_len: Option<usize>) -> Self {
        Self {
            vocab,
            include_manual_features,
            max_len: max_len.filter(|&l| l > 0).unwrap_or(MAX_LEN),
            device: Device::Cpu,
        }
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

    pub fn include_manual_features(&self) -> bool {
        self.include_manual_features
    }

    /// Width of the auxiliary feature channel.
    pub fn additional_feature_dim(&self) -> usize {
        let dim = self.vocab.num_pos();
        if self.include_manual_features {
            dim + MANUAL_FEATURE_DIM
        } else {
            dim
        }
    }

    fn manual_channels(&self, sentences: &[Sentence]) -> Vec<Vec<[f32; MANUAL_FEATURE_DIM]>> {
        let rows: Vec<Vec<[f32; MANUAL_FEATURE_DIM]>> = sentences
            .iter()
            .map(|s| {
                s.tokens
                    .iter()
                    .map(|t| {
                        [
                            flag(is_upper(&t.token)),
                            flag(is_title(&t.token)),
                            flag(is_digit(&t.token)),
                        ]
                    })
                    .collect()
            })
            .collect();
        pad_sequences(&rows, self.max_len, [MANUAL_PAD; MANUAL_FEATURE_DIM])
    }
}

impl FeatureExtractor for RnnFeatureExtractor {
    type Batch = RnnBatch;

    fn extract(&self, sentences: &[Sentence]) -> Result<RnnBatch> {
        let labeled = batch_is_labeled(sentences)?;
        let n = sentences.len();
        let max_len = self.max_len;

        let words: Vec<Vec<u32>> = sentences
            .iter()
            .map(|s| {
                s.tokens
                    .iter()
                    .map(|t| self.vocab.word_index(&t.token) as u32)
                    .collect()
            })
            .collect();
        let words = pad_sequences(&words, max_len, self.vocab.pad_index() as u32);

        let pos: Vec<Vec<usize>> = sentences
            .iter()
            .map(|s| s.tokens.iter().map(|t| self.vocab.pos_index(&t.pos)).collect())
            .collect();
        let pos = pad_sequences(&pos, max_len, self.vocab.pad_index());
        let num_pos = self.vocab.num_pos();
        let pos_one_hot = to_categorical(&pos, num_pos)?;

        let feature_dim = self.additional_feature_dim();
        let features = if self.include_manual_features {
            let manual = self.manual_channels(sentences);
            let mut out = Vec::with_capacity(n * max_len * feature_dim);
            for (step, channels) in manual.iter().flatten().enumerate() {
                out.extend_from_slice(&pos_one_hot[step * num_pos..(step + 1) * num_pos]);
                out.extend_from_slice(channels);
            }
            out
        } else {
            pos_one_hot
        };

        let labels = if labeled {
            let mut rows = Vec::with_capacity(n);
            for s in sentences {
                let row = s
                    .tokens
                    .iter()
                    .filter_map(|t| t.tag.as_deref())
                    .map(|tag| self.vocab.label_index(tag).map(|i| i as i64))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(row);
            }
            let rows = pad_sequences(&rows, max_len, LABEL_PAD);
            Some(Tensor::from_vec(
                rows.into_iter().flatten().collect::<Vec<_>>(),
                (n, max_len),
                &self.device,
            )?)
        } else {
            None
        };

        let lengths: Vec<usize> = sentences.iter().map(Sentence::len).collect();
        let mask: Vec<f32> = lengths
            .iter()
            .flat_map(|&len| (0..max_len).map(move |i| flag(i < len)))
            .collect();

        Ok(RnnBatch {
            token_ids: Tensor::from_vec(
                words.into_iter().flatten().collect::<Vec<_>>(),
                (n, max_len),
                &self.device,
            )?,
            features: Tensor::from_vec(features, (n, max_len, feature_dim), &self.device)?,
            labels,
            mask: Tensor::from_vec(mask, (n, max_len), &self.device)?,
            lengths,
        })
    }
}

fn flag(b: bool) -> f32 {
    if b { 1.0 } else { 0.0 }
}

fn is_cased(c: char) -> bool {
    c.is_uppercase() || c.is_lowercase()
}

/// At least one cased character and no lowercase ones.
pub fn is_upper(s: &str) -> bool {
    s.chars().any(is_cased) && !s.chars().any(char::is_lowercase)
}

/// Uppercase characters only follow uncased ones, lowercase characters only
/// follow cased ones, and there is at least one cased character.
pub fn is_title(s: &str) -> bool {
    let mut prev_cased = false;
    let mut any_cased = false;
    for c in s.chars() {
        if c.is_uppercase() {
            if prev_cased {
                return false;
            }
            prev_cased = true;
            any_cased = true;
        } else if c.is_lowercase() {
            if !prev_cased {
                return false;
            }
            prev_cased = true;
            any_cased = true;
        } else {
            prev_cased = false;
        }
    }
    any_cased
}

/// Digit symbols outside the decimal-digit category that still count as
/// digits: superscripts, subscripts and the circled / parenthesized /
/// dingbat digit series.
const DIGIT_SYMBOLS: &[(char, char)] = &[
    ('\u{00B2}', '\u{00B3}'),
    ('\u{00B9}', '\u{00B9}'),
    ('\u{2070}', '\u{2070}'),
    ('\u{2074}', '\u{2079}'),
    ('\u{2080}', '\u{2089}'),
    ('\u{2460}', '\u{2468}'),
    ('\u{2474}', '\u{247C}'),
    ('\u{2488}', '\u{2490}'),
    ('\u{24EA}', '\u{24EA}'),
    ('\u{24F5}', '\u{24FD}'),
    ('\u{24FF}', '\u{24FF}'),
    ('\u{2776}', '\u{277E}'),
    ('\u{2780}', '\u{2788}'),
    ('\u{278A}', '\u{2792}'),
];

fn is_digit_char(c: char) -> bool {
    c.is_number_decimal_digit() || DIGIT_SYMBOLS.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

/// Non-empty and made of digits only: decimal digits of any script plus
/// superscript, subscript and circled digits. Fractions and numbers such
/// as `½` or `⑩` are not digits.
pub fn is_digit(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_digit_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{TaggedToken, parse_sentences};

    fn corpus() -> Vec<Sentence> {
        parse_sentences(
            "The DT O\nUN NNP B-ORG\nmet VBD O\nin IN O\n1999 CD B-DATE\n\nHi UH O\n",
        )
        .unwrap()
    }

    #[test]
    fn test_string_predicates() {
        assert!(is_upper("UN"));
        assert!(is_upper("U.S."));
        assert!(!is_upper("Un"));
        assert!(!is_upper("1999"));

        assert!(is_title("The"));
        assert!(is_title("New-York"));
        assert!(!is_title("UN"));
        assert!(!is_title("the"));
        assert!(!is_title("123"));

        assert!(is_digit("1999"));
        assert!(!is_digit("19.99"));
        assert!(!is_digit(""));
    }

    #[test]
    fn test_is_digit_accepts_unicode_digits() {
        assert!(is_digit("٣"));
        assert!(is_digit("१२"));
        assert!(is_digit("²"));
        assert!(is_digit("①"));
        assert!(!is_digit("½"));
        assert!(!is_digit("⑩"));
        assert!(!is_digit("Ⅻ"));
        assert!(!is_digit("3a"));
    }

    #[test]
    fn test_shapes_without_manual_features() {
        let sentences = corpus();
        let extractor = RnnFeatureExtractor::new(Vocab::build(&sentences), false, Some(4));
        let batch = extractor.extract(&sentences).unwrap();

        assert_eq!(batch.token_ids.dims(), &[2, 4]);
        assert_eq!(batch.features.dims(), &[2, 4, extractor.additional_feature_dim()]);
        assert_eq!(batch.mask.dims(), &[2, 4]);
        assert_eq!(batch.lengths, vec![5, 1]);
        assert_eq!(extractor.additional_feature_dim(), extractor.vocab().num_pos());
    }

    #[test]
    fn test_padding_and_truncation() {
        let sentences = corpus();
        let vocab = Vocab::build(&sentences);
        let extractor = RnnFeatureExtractor::new(vocab.clone(), false, Some(4));
        let batch = extractor.extract(&sentences).unwrap();

        let ids = batch.token_ids.to_vec2::<u32>().unwrap();
        assert_eq!(ids[0], vec![2, 3, 4, 5]);
        assert_eq!(ids[1], vec![vocab.word_index("Hi") as u32, 0, 0, 0]);

        let labels = batch.labels.unwrap().to_vec2::<i64>().unwrap();
        let o = vocab.label_index("O").unwrap() as i64;
        assert_eq!(labels[1], vec![o, -1, -1, -1]);

        let mask = batch.mask.to_vec2::<f32>().unwrap();
        assert_eq!(mask[0], vec![1.0; 4]);
        assert_eq!(mask[1], vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pos_one_hot_pads_with_pad_class() {
        let sentences = corpus();
        let vocab = Vocab::build(&sentences);
        let extractor = RnnFeatureExtractor::new(vocab.clone(), false, Some(3));
        let batch = extractor.extract(&sentences).unwrap();

        let features = batch.features.to_vec3::<f32>().unwrap();
        let uh = vocab.pos_index("UH");
        assert_eq!(features[1][0][uh], 1.0);
        assert_eq!(features[1][0].iter().sum::<f32>(), 1.0);
        assert_eq!(features[1][2][0], 1.0);
    }

    #[test]
    fn test_manual_features() {
        let sentences = corpus();
        let vocab = Vocab::build(&sentences);
        let num_pos = vocab.num_pos();
        let extractor = RnnFeatureExtractor::new(vocab, true, Some(6));
        assert_eq!(extractor.additional_feature_dim(), num_pos + 3);

        let batch = extractor.extract(&sentences).unwrap();
        let features = batch.features.to_vec3::<f32>().unwrap();
        // "UN": upper, not title, not digit
        assert_eq!(features[0][1][num_pos..], [1.0, 0.0, 0.0]);
        // "The": title
        assert_eq!(features[0][0][num_pos..], [0.0, 1.0, 0.0]);
        // "1999": digit
        assert_eq!(features[0][4][num_pos..], [0.0, 0.0, 1.0]);
        // padding
        assert_eq!(features[0][5][num_pos..], [-1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_unlabeled_batch_has_no_labels() {
        let sentences = corpus();
        let extractor = RnnFeatureExtractor::new(Vocab::build(&sentences), false, None);
        let unlabeled = vec![Sentence::new(vec![TaggedToken::unlabeled("UN", "NNP")])];
        let batch = extractor.extract(&unlabeled).unwrap();
        assert!(batch.labels.is_none());
        assert_eq!(batch.token_ids.dims(), &[1, MAX_LEN]);
    }

    #[test]
    fn test_unknown_label_is_an_error() {
        let sentences = corpus();
        let extractor = RnnFeatureExtractor::new(Vocab::build(&sentences), false, None);
        let other = parse_sentences("Paris NNP B-GPE\n").unwrap();
        assert!(extractor.extract(&other).is_err());
    }
}
