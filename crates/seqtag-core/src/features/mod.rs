//! # Feature Extraction
//!
//! Turns variable-length sentences into fixed-shape tensors. Every
//! extractor pads and truncates at the end of the sequence ("post"), so a
//! sentence's first `max_len` tokens always keep their positions.

pub mod bert;
pub mod rnn;

pub use bert::{BertBatch, BertFeatureExtractor};
pub use rnn::{RnnBatch, RnnFeatureExtractor};

use crate::data::Sentence;
use crate::error::{Result, SeqtagError};

/// Default padded sequence length.
pub const MAX_LEN: usize = 75;

/// Label value used for padded positions in integer label tensors.
pub const LABEL_PAD: i64 = -1;

/// Converts a batch of sentences into model inputs.
pub trait FeatureExtractor {
    type Batch;

    fn extract(&self, sentences: &[Sentence]) -> Result<Self::Batch>;
}

/// Pad or truncate every sequence to exactly `max_len`, at the end.
pub fn pad_sequences<T: Copy>(seqs: &[Vec<T>], max_len: usize, value: T) -> Vec<Vec<T>> {
    seqs.iter()
        .map(|seq| {
            let mut out: Vec<T> = seq.iter().take(max_len).copied().collect();
            out.resize(max_len, value);
            out
        })
        .collect()
}

/// One-hot encode `[n][len]` class indices into a flat `[n, len, num_classes]`
/// buffer.
pub fn to_categorical(indices: &[Vec<usize>], num_classes: usize) -> Result<Vec<f32>> {
    let total: usize = indices.iter().map(Vec::len).sum();
    let mut out = vec![0.0f32; total * num_classes];
    for (pos, &class) in indices.iter().flatten().enumerate() {
        if class >= num_classes {
            return Err(SeqtagError::ShapeMismatch(format!(
                "class index {class} out of range for {num_classes} classes"
            )));
        }
        out[pos * num_classes + class] = 1.0;
    }
    Ok(out)
}

/// Decide whether a batch is labeled from its first token and check that
/// every sentence agrees.
pub(crate) fn batch_is_labeled(sentences: &[Sentence]) -> Result<bool> {
    let first = sentences
        .iter()
        .find(|s| !s.is_empty())
        .ok_or(SeqtagError::EmptyInput)?;
    let labeled = first.is_labeled();
    let consistent = sentences
        .iter()
        .flat_map(|s| &s.tokens)
        .all(|t| t.tag.is_some() == labeled);
    if !consistent {
        return Err(SeqtagError::InconsistentColumns {
            expected: if labeled { "labeled" } else { "unlabeled" },
        });
    }
    Ok(labeled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TaggedToken;

    #[test]
    fn test_pad_sequences_post() {
        let seqs = vec![vec![1, 2, 3], vec![4], vec![5, 6, 7, 8, 9]];
        let padded = pad_sequences(&seqs, 4, 0);
        assert_eq!(padded, vec![vec![1, 2, 3, 0], vec![4, 0, 0, 0], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn test_to_categorical() {
        let one_hot = to_categorical(&[vec![0, 2], vec![1, 0]], 3).unwrap();
        assert_eq!(
            one_hot,
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]
        );
        assert!(to_categorical(&[vec![3]], 3).is_err());
    }

    #[test]
    fn test_batch_is_labeled() {
        let labeled = Sentence::new(vec![TaggedToken::labeled("a", "DT", "O")]);
        let unlabeled = Sentence::new(vec![TaggedToken::unlabeled("a", "DT")]);

        assert!(batch_is_labeled(std::slice::from_ref(&labeled)).unwrap());
        assert!(!batch_is_labeled(std::slice::from_ref(&unlabeled)).unwrap());
        assert!(batch_is_labeled(&[labeled, unlabeled]).is_err());
        assert!(matches!(batch_is_labeled(&[]), Err(SeqtagError::EmptyInput)));
    }
}
