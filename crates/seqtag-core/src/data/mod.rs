//! # Corpus Data Model
//!
//! Sentences are sequences of `(token, pos, tag)` tuples. Unlabeled corpora
//! (the ones handed to `predict`) carry `(token, pos)` only.

pub mod conll;
pub mod split;

pub use conll::{parse_sentences, read_data, write_labels, write_labels_to};
pub use split::train_test_split;

use serde::{Deserialize, Serialize};

/// A single token line of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedToken {
    pub token: String,
    pub pos: String,
    pub tag: Option<String>,
}

impl TaggedToken {
    pub fn new(token: impl Into<String>, pos: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            token: token.into(),
            pos: pos.into(),
            tag,
        }
    }

    /// Labeled `(token, pos, tag)` triple.
    pub fn labeled(token: &str, pos: &str, tag: &str) -> Self {
        Self::new(token, pos, Some(tag.to_string()))
    }

    /// Unlabeled `(token, pos)` pair.
    pub fn unlabeled(token: &str, pos: &str) -> Self {
        Self::new(token, pos, None)
    }
}

/// One sentence of the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<TaggedToken>,
}

impl Sentence {
    pub fn new(tokens: Vec<TaggedToken>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether the first token carries a tag column.
    pub fn is_labeled(&self) -> bool {
        self.tokens.first().is_some_and(|t| t.tag.is_some())
    }

    pub fn words(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.token.as_str()).collect()
    }

    pub fn pos_tags(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.pos.as_str()).collect()
    }

    /// Gold tags, or `None` if any token is unlabeled.
    pub fn tags(&self) -> Option<Vec<&str>> {
        self.tokens.iter().map(|t| t.tag.as_deref()).collect()
    }

    /// Copy with every tag dropped, for inference on gold data.
    pub fn without_tags(&self) -> Sentence {
        Sentence::new(
            self.tokens
                .iter()
                .map(|t| TaggedToken::new(t.token.clone(), t.pos.clone(), None))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_accessors() {
        let sent = Sentence::new(vec![
            TaggedToken::labeled("Obama", "NNP", "B-PERSON"),
            TaggedToken::labeled("spoke", "VBD", "O"),
        ]);
        assert_eq!(sent.len(), 2);
        assert!(sent.is_labeled());
        assert_eq!(sent.words(), vec!["Obama", "spoke"]);
        assert_eq!(sent.pos_tags(), vec!["NNP", "VBD"]);
        assert_eq!(sent.tags(), Some(vec!["B-PERSON", "O"]));

        let bare = sent.without_tags();
        assert!(!bare.is_labeled());
        assert_eq!(bare.words(), sent.words());
    }

    #[test]
    fn test_unlabeled_sentence_has_no_tags() {
        let sent = Sentence::new(vec![TaggedToken::unlabeled("hello", "UH")]);
        assert!(!sent.is_labeled());
        assert_eq!(sent.tags(), None);
    }
}
