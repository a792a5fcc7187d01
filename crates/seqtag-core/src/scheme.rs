//! # BIO Tag Scheme
//!
//! Interprets dataset label strings (`B-PERSON`, `I-PERSON`, `O`) under the
//! BIO (Begin-Inside-Outside) tagging scheme. Labels without a BIO prefix
//! (POS tags, for example) are treated as single-token chunks.

use std::fmt;

/// Position of a tag inside a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagPrefix {
    Begin,
    Inside,
    Outside,
    /// A label with no BIO prefix; each token is its own chunk.
    Bare,
}

impl fmt::Display for TagPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagPrefix::Begin => write!(f, "B"),
            TagPrefix::Inside => write!(f, "I"),
            TagPrefix::Outside => write!(f, "O"),
            TagPrefix::Bare => write!(f, "-"),
        }
    }
}

/// Split a label into its prefix and entity type.
///
/// ```
/// use seqtag_core::scheme::{parse_tag, TagPrefix};
///
/// assert_eq!(parse_tag("B-GPE"), (TagPrefix::Begin, Some("GPE")));
/// assert_eq!(parse_tag("O"), (TagPrefix::Outside, None));
/// assert_eq!(parse_tag("NN"), (TagPrefix::Bare, Some("NN")));
/// ```
pub fn parse_tag(tag: &str) -> (TagPrefix, Option<&str>) {
    if tag == "O" {
        return (TagPrefix::Outside, None);
    }
    match tag.split_once('-') {
        Some(("B", ty)) if !ty.is_empty() => (TagPrefix::Begin, Some(ty)),
        Some(("I", ty)) if !ty.is_empty() => (TagPrefix::Inside, Some(ty)),
        _ => (TagPrefix::Bare, Some(tag)),
    }
}

/// Check if transitioning from `from` tag to `to` tag is valid.
///
/// The only forbidden transitions are `I-X` after anything other than
/// `B-X` or `I-X`.
pub fn is_valid_transition(from: &str, to: &str) -> bool {
    let (to_prefix, to_type) = parse_tag(to);
    if to_prefix != TagPrefix::Inside {
        return true;
    }
    let (from_prefix, from_type) = parse_tag(from);
    matches!(from_prefix, TagPrefix::Begin | TagPrefix::Inside) && from_type == to_type
}

/// A sentence may not open with an `I-X` tag.
pub fn is_valid_start(tag: &str) -> bool {
    parse_tag(tag).0 != TagPrefix::Inside
}

/// Whether the label set uses BIO prefixes at all.
pub fn is_bio(labels: &[String]) -> bool {
    labels
        .iter()
        .any(|l| matches!(parse_tag(l).0, TagPrefix::Begin | TagPrefix::Inside))
}

/// Allowed-transition matrix `[from][to]` over `labels`.
pub fn transition_mask(labels: &[String]) -> Vec<Vec<bool>> {
    labels
        .iter()
        .map(|from| labels.iter().map(|to| is_valid_transition(from, to)).collect())
        .collect()
}
