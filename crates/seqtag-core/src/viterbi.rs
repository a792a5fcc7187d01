//! # Viterbi Decoding
//!
//! Finds the highest-scoring tag sequence under hard BIO constraints, given
//! per-token emission scores (log-probabilities from a tagger) and optional
//! transition scores.

use crate::error::{Result, SeqtagError};
use crate::scheme::{is_valid_start, transition_mask};

/// Viterbi decoder over a fixed label set.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    allowed: Vec<Vec<bool>>,
    allowed_start: Vec<bool>,
}

impl ViterbiDecoder {
    /// Decoder that enforces BIO constraints for `labels`.
    pub fn constrained(labels: &[String]) -> Self {
        Self {
            num_tags: labels.len(),
            allowed: transition_mask(labels),
            allowed_start: labels.iter().map(|l| is_valid_start(l)).collect(),
        }
    }

    /// Decoder with every transition allowed.
    pub fn unconstrained(num_tags: usize) -> Self {
        Self {
            num_tags,
            allowed: vec![vec![true; num_tags]; num_tags],
            allowed_start: vec![true; num_tags],
        }
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Decode using emission scores only.
    pub fn decode(&self, emission_scores: &[Vec<f32>]) -> Result<Vec<usize>> {
        let zeros = vec![vec![0.0f32; self.num_tags]; self.num_tags];
        self.decode_with_transitions(emission_scores, &zeros)
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - `[seq_len][num_tags]` emission scores
    /// * `transition_matrix` - `[num_tags][num_tags]` scores for `from -> to`
    pub fn decode_with_transitions(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        if let Some(row) = emission_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(SeqtagError::ShapeMismatch(format!(
                "emission row has {} scores, expected {}",
                row.len(),
                self.num_tags
            )));
        }
        if transition_matrix.len() != self.num_tags
            || transition_matrix.iter().any(|r| r.len() != self.num_tags)
        {
            return Err(SeqtagError::ShapeMismatch(format!(
                "transition matrix must be {n}x{n}",
                n = self.num_tags
            )));
        }

        let mut dp = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr = vec![vec![0usize; self.num_tags]; seq_len];

        for tag in 0..self.num_tags {
            if self.allowed_start[tag] {
                dp[0][tag] = emission_scores[0][tag];
            }
        }

        for pos in 1..seq_len {
            for curr in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev in 0..self.num_tags {
                    if !self.allowed[prev][curr] {
                        continue;
                    }
                    let score = dp[pos - 1][prev] + transition_matrix[prev][curr];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev;
                    }
                }

                dp[pos][curr] = best_score + emission_scores[pos][curr];
                backptr[pos][curr] = best_prev;
            }
        }

        let mut best_final = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for (tag, &score) in dp[seq_len - 1].iter().enumerate() {
            if score > best_final_score {
                best_final_score = score;
                best_final = tag;
            }
        }

        let mut path = vec![best_final];
        let mut curr = best_final;
        for pos in (1..seq_len).rev() {
            curr = backptr[pos][curr];
            path.push(curr);
        }
        path.reverse();
        Ok(path)
    }
}
