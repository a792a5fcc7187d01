//! # seqtag core
//!
//! Building blocks for neural sequence labeling over `(token, pos, tag)`
//! corpora: corpus I/O, vocabulary, GloVe embeddings, fixed-shape feature
//! extraction for recurrent and BERT taggers, BIO-aware decoding and
//! chunk-level scoring.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqtag_core::data::parse_sentences;
//! use seqtag_core::{FeatureExtractor, RnnFeatureExtractor, Vocab};
//!
//! let sentences = parse_sentences("EU NNP B-ORG\nrejects VBZ O\n").unwrap();
//! let extractor = RnnFeatureExtractor::new(Vocab::build(&sentences), true, Some(8));
//! let batch = extractor.extract(&sentences).unwrap();
//!
//! assert_eq!(batch.token_ids.dims(), &[1, 8]);
//! assert_eq!(batch.features.dims(), &[1, 8, extractor.additional_feature_dim()]);
//! ```
pub mod data;
pub mod embedding;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod scheme;
pub mod viterbi;
pub mod vocab;

// Re-export primary API
pub use data::{Sentence, TaggedToken};
pub use embedding::{EmbeddingStats, GloveModel, build_embedding_matrix, load_glove};
pub use error::{Result, SeqtagError};
pub use features::{
    BertBatch, BertFeatureExtractor, FeatureExtractor, MAX_LEN, RnnBatch, RnnFeatureExtractor,
};
pub use metrics::{Scores, evaluate};
pub use model::{Architecture, BertTagger, ModelConfig, RnnTagger, masked_cross_entropy};
pub use viterbi::ViterbiDecoder;
pub use vocab::Vocab;
