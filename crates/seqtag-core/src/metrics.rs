//! # Chunk-level Evaluation
//!
//! Precision, recall and F1 over labeled chunks, in the manner of the
//! CoNLL shared-task scorer. A predicted chunk counts as correct only when
//! its type, start and end all match a gold chunk.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqtagError};
use crate::scheme::{TagPrefix, parse_tag};

/// A labeled span `[start, end)` of token positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub chunk_type: String,
    pub start: usize,
    pub end: usize,
}

/// Extract chunks from one tag sequence.
///
/// An `I-X` that does not continue a chunk of type `X` opens a new chunk.
pub fn extract_chunks<S: AsRef<str>>(tags: &[S]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut open: Option<(String, usize)> = None;

    for (i, tag) in tags.iter().enumerate() {
        let (prefix, ty) = parse_tag(tag.as_ref());

        let continues = matches!(
            (&open, prefix, ty),
            (Some((open_ty, _)), TagPrefix::Inside, Some(ty)) if open_ty == ty
        );
        if continues {
            continue;
        }

        if let Some((chunk_type, start)) = open.take() {
            chunks.push(Chunk {
                chunk_type,
                start,
                end: i,
            });
        }

        match (prefix, ty) {
            (TagPrefix::Begin | TagPrefix::Inside, Some(ty)) => open = Some((ty.to_string(), i)),
            (TagPrefix::Bare, Some(ty)) => chunks.push(Chunk {
                chunk_type: ty.to_string(),
                start: i,
                end: i + 1,
            }),
            _ => {}
        }
    }

    if let Some((chunk_type, start)) = open {
        chunks.push(Chunk {
            chunk_type,
            start,
            end: tags.len(),
        });
    }

    chunks
}

/// Scores for one chunk type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TypeScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of gold chunks of this type.
    pub support: usize,
}

/// Overall evaluation result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Token-level accuracy.
    pub accuracy: f64,
    pub per_type: BTreeMap<String, TypeScores>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f_score(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[derive(Default)]
struct Counts {
    correct: usize,
    predicted: usize,
    gold: usize,
}

/// Compare predicted tag sequences against gold ones.
pub fn evaluate<G: AsRef<str>, P: AsRef<str>>(gold: &[Vec<G>], pred: &[Vec<P>]) -> Result<Scores> {
    if gold.len() != pred.len() {
        return Err(SeqtagError::ShapeMismatch(format!(
            "{} gold sentences vs {} predicted",
            gold.len(),
            pred.len()
        )));
    }

    let mut totals = Counts::default();
    let mut by_type: BTreeMap<String, Counts> = BTreeMap::new();
    let mut tokens_correct = 0usize;
    let mut tokens_total = 0usize;

    for (i, (g, p)) in gold.iter().zip(pred).enumerate() {
        if g.len() != p.len() {
            return Err(SeqtagError::ShapeMismatch(format!(
                "sentence {i}: {} gold tags vs {} predicted",
                g.len(),
                p.len()
            )));
        }

        tokens_total += g.len();
        tokens_correct += g
            .iter()
            .zip(p)
            .filter(|(a, b)| a.as_ref() == b.as_ref())
            .count();

        let gold_chunks = extract_chunks(g);
        let pred_chunks = extract_chunks(p);
        let gold_set: HashSet<&Chunk> = gold_chunks.iter().collect();

        for chunk in &gold_chunks {
            totals.gold += 1;
            by_type.entry(chunk.chunk_type.clone()).or_default().gold += 1;
        }
        for chunk in &pred_chunks {
            totals.predicted += 1;
            let entry = by_type.entry(chunk.chunk_type.clone()).or_default();
            entry.predicted += 1;
            if gold_set.contains(chunk) {
                totals.correct += 1;
                entry.correct += 1;
            }
        }
    }

    let precision = ratio(totals.correct, totals.predicted);
    let recall = ratio(totals.correct, totals.gold);

    let per_type = by_type
        .into_iter()
        .map(|(ty, c)| {
            let p = ratio(c.correct, c.predicted);
            let r = ratio(c.correct, c.gold);
            (
                ty,
                TypeScores {
                    precision: p,
                    recall: r,
                    f1: f_score(p, r),
                    support: c.gold,
                },
            )
        })
        .collect();

    Ok(Scores {
        precision,
        recall,
        f1: f_score(precision, recall),
        accuracy: ratio(tokens_correct, tokens_total),
        per_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_extract_chunks() {
        let chunks = extract_chunks(&tags("B-PER I-PER O B-LOC B-LOC I-LOC"));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Chunk { chunk_type: "PER".into(), start: 0, end: 2 });
        assert_eq!(chunks[1], Chunk { chunk_type: "LOC".into(), start: 3, end: 4 });
        assert_eq!(chunks[2], Chunk { chunk_type: "LOC".into(), start: 4, end: 6 });
    }

    #[test]
    fn test_orphan_inside_opens_chunk() {
        let chunks = extract_chunks(&tags("O I-ORG I-ORG B-PER I-ORG"));
        let spans: Vec<_> = chunks.iter().map(|c| (c.chunk_type.as_str(), c.start, c.end)).collect();
        assert_eq!(spans, vec![("ORG", 1, 3), ("PER", 3, 4), ("ORG", 4, 5)]);
    }

    #[test]
    fn test_bare_labels_are_single_token_chunks() {
        let chunks = extract_chunks(&tags("NN NN VB"));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_perfect_prediction() {
        let gold = vec![tags("B-PER I-PER O"), tags("B-ORG")];
        let scores = evaluate(&gold, &gold).unwrap();
        assert_eq!(scores.precision, 1.0);
        assert_eq!(scores.recall, 1.0);
        assert_eq!(scores.f1, 1.0);
        assert_eq!(scores.accuracy, 1.0);
        assert_eq!(scores.per_type["PER"].support, 1);
    }

    #[test]
    fn test_partial_prediction() {
        let gold = vec![tags("B-PER I-PER O B-LOC")];
        let pred = vec![tags("B-PER O O B-LOC")];
        let scores = evaluate(&gold, &pred).unwrap();
        // PER span is wrong, LOC is right.
        assert_eq!(scores.precision, 0.5);
        assert_eq!(scores.recall, 0.5);
        assert_eq!(scores.f1, 0.5);
        assert_eq!(scores.accuracy, 0.75);
        assert_eq!(scores.per_type["LOC"].f1, 1.0);
        assert_eq!(scores.per_type["PER"].f1, 0.0);
    }

    #[test]
    fn test_no_chunks_scores_zero() {
        let gold = vec![tags("O O")];
        let scores = evaluate(&gold, &gold).unwrap();
        assert_eq!(scores.f1, 0.0);
        assert_eq!(scores.accuracy, 1.0);
    }

    #[test]
    fn test_length_mismatch() {
        let gold = vec![tags("O O")];
        let pred = vec![tags("O")];
        assert!(evaluate(&gold, &pred).is_err());
    }
}
