//! # seqtag trainer
//!
//! Drives [`seqtag_core`] models end to end: builds a classifier from a
//! corpus and GloVe vectors, trains it with early checkpointing on
//! validation F1, evaluates and predicts from a saved checkpoint, and
//! scores pretrained BERT token classifiers. The `seqtag` binary wraps
//! these workflows in a CLI.

pub mod bert_eval;
pub mod checkpoint;
pub mod classifier;
pub mod config;

pub use bert_eval::evaluate_bert;
pub use classifier::{EpochReport, FitReport, RnnClassifier};
pub use config::{LossFn, RunManifest, TrainConfig, checkpoint_path, manifest_path};
