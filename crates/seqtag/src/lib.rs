//! # seqtag
//!
//! Neural sequence labeling for token/pos/tag corpora: corpus I/O,
//! vocabulary and GloVe embeddings, fixed-shape feature extraction for
//! recurrent and BERT-style models, and a training/evaluation driver.

pub use seqtag_core;
pub use seqtag_trainer;

pub use seqtag_core::{
    Architecture, BertFeatureExtractor, FeatureExtractor, RnnFeatureExtractor, Scores, Sentence,
    SeqtagError, Vocab,
};
pub use seqtag_trainer::{RnnClassifier, TrainConfig};
