//! # Vocabulary
//!
//! Word, POS and label index tables built from a training corpus.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Sentence;
use crate::error::{Result, SeqtagError};

/// Padding symbol. Always index 0 in the word and POS tables.
pub const PAD: &str = "<PAD>";
/// Out-of-vocabulary symbol. Always index 1 in the word table.
pub const UNKNOWN: &str = "<UNK>";

/// Index tables for words, POS tags and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VocabTables", into = "VocabTables")]
pub struct Vocab {
    words: Vec<String>,
    pos: Vec<String>,
    labels: Vec<String>,
    word_index: HashMap<String, usize>,
    pos_index: HashMap<String, usize>,
    label_index: HashMap<String, usize>,
}

/// Serialized form: the ordered tables only.
#[derive(Serialize, Deserialize)]
struct VocabTables {
    words: Vec<String>,
    pos: Vec<String>,
    labels: Vec<String>,
}

impl From<VocabTables> for Vocab {
    fn from(t: VocabTables) -> Self {
        Self::from_parts(t.words, t.pos, t.labels)
    }
}

impl From<Vocab> for VocabTables {
    fn from(v: Vocab) -> Self {
        Self {
            words: v.words,
            pos: v.pos,
            labels: v.labels,
        }
    }
}

impl Vocab {
    /// Build tables from labeled sentences. Words keep first-seen order,
    /// POS tags and labels are sorted.
    pub fn build(sentences: &[Sentence]) -> Self {
        let mut words = vec![PAD.to_string(), UNKNOWN.to_string()];
        let mut seen: HashMap<&str, ()> = HashMap::new();
        let mut pos = Vec::new();
        let mut labels = Vec::new();

        for sentence in sentences {
            for token in &sentence.tokens {
                if seen.insert(token.token.as_str(), ()).is_none()
                    && token.token != PAD
                    && token.token != UNKNOWN
                {
                    words.push(token.token.clone());
                }
                pos.push(token.pos.clone());
                if let Some(tag) = &token.tag {
                    labels.push(tag.clone());
                }
            }
        }

        pos.sort_unstable();
        pos.dedup();
        pos.retain(|p| p != PAD);
        pos.insert(0, PAD.to_string());

        labels.sort_unstable();
        labels.dedup();

        Self::from_parts(words, pos, labels)
    }

    /// Label-only tables, keeping `labels` in the given order. Used for
    /// pretrained classifiers whose label ids are fixed by their config.
    pub fn from_labels(labels: Vec<String>) -> Self {
        Self::from_parts(
            vec![PAD.to_string(), UNKNOWN.to_string()],
            vec![PAD.to_string()],
            labels,
        )
    }

    fn from_parts(words: Vec<String>, pos: Vec<String>, labels: Vec<String>) -> Self {
        let index = |items: &[String]| {
            items
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), i))
                .collect::<HashMap<_, _>>()
        };
        Self {
            word_index: index(&words),
            pos_index: index(&pos),
            label_index: index(&labels),
            words,
            pos,
            labels,
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn pos_tags(&self) -> &[String] {
        &self.pos
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    pub fn num_pos(&self) -> usize {
        self.pos.len()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn pad_index(&self) -> usize {
        0
    }

    pub fn unknown_index(&self) -> usize {
        1
    }

    /// Word index, falling back to [`UNKNOWN`].
    pub fn word_index(&self, word: &str) -> usize {
        self.word_index
            .get(word)
            .copied()
            .unwrap_or(self.unknown_index())
    }

    /// POS index, falling back to [`PAD`] for tags never seen in training.
    pub fn pos_index(&self, pos: &str) -> usize {
        self.pos_index.get(pos).copied().unwrap_or(0)
    }

    pub fn label_index(&self, label: &str) -> Result<usize> {
        self.label_index
            .get(label)
            .copied()
            .ok_or_else(|| SeqtagError::UnknownLabel(label.to_string()))
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_sentences;

    fn corpus() -> Vec<Sentence> {
        parse_sentences("John NNP B-PER\nruns VBZ O\n\nMary NNP B-PER\nruns VBZ O\nfast RB O\n")
            .unwrap()
    }

    #[test]
    fn test_build_reserves_pad_and_unknown() {
        let vocab = Vocab::build(&corpus());
        assert_eq!(vocab.words()[0], PAD);
        assert_eq!(vocab.words()[1], UNKNOWN);
        assert_eq!(vocab.words()[2..], ["John", "runs", "Mary", "fast"]);
        assert_eq!(vocab.pos_tags(), ["<PAD>", "NNP", "RB", "VBZ"]);
        assert_eq!(vocab.labels(), ["B-PER", "O"]);
    }

    #[test]
    fn test_lookups() {
        let vocab = Vocab::build(&corpus());
        assert_eq!(vocab.word_index("John"), 2);
        assert_eq!(vocab.word_index("Zebra"), vocab.unknown_index());
        assert_eq!(vocab.pos_index("JJ"), 0);
        assert_eq!(vocab.label_index("O").unwrap(), 1);
        assert!(vocab.label_index("I-LOC").is_err());
        assert_eq!(vocab.label(0), Some("B-PER"));
        assert_eq!(vocab.label(9), None);
    }

    #[test]
    fn test_from_labels_keeps_order() {
        let vocab = Vocab::from_labels(vec!["O".into(), "B-PER".into()]);
        assert_eq!(vocab.label_index("O").unwrap(), 0);
        assert_eq!(vocab.num_words(), 2);
        assert_eq!(vocab.num_pos(), 1);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let vocab = Vocab::build(&corpus());
        vocab.save(&path).unwrap();

        let loaded = Vocab::load(&path).unwrap();
        assert_eq!(loaded, vocab);
        assert_eq!(loaded.word_index("Mary"), vocab.word_index("Mary"));
    }
}
