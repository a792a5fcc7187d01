//! seqtag CLI
//!
//! Train, evaluate and run neural sequence taggers on CoNLL-style corpora.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use seqtag_core::data::{read_data, train_test_split, write_labels};
use seqtag_core::embedding::GLOVE_DIMENSIONS;
use seqtag_core::features::rnn::MANUAL_FEATURE_DIM;
use seqtag_core::{Architecture, ModelConfig, Scores, Vocab, build_embedding_matrix, load_glove};
use seqtag_trainer::{
    LossFn, RnnClassifier, RunManifest, TrainConfig, checkpoint_path, evaluate_bert,
};

/// Padded length used when evaluating or predicting from a checkpoint.
const INFERENCE_MAX_LEN: usize = 300;

#[derive(Parser)]
#[command(name = "seqtag")]
#[command(about = "Neural sequence labeling for NER and POS tagging")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Encoder architecture
    #[arg(long, global = true, env = "SEQTAG_ARCHITECTURE", default_value = "bilstm")]
    architecture: Architecture,

    /// Number of stacked encoder layers
    #[arg(long, global = true, env = "SEQTAG_N_LAYERS", default_value_t = 1)]
    n_layers: usize,

    /// Add is_upper / is_title / is_digit channels to every token
    #[arg(long, global = true, env = "SEQTAG_MANUAL_FEATURE")]
    manual_feature: bool,

    /// Training objective
    #[arg(long, global = true, env = "SEQTAG_LOSS_FN", default_value = "cross_entropy")]
    loss_fn: LossFn,

    /// GloVe vector size (50, 100, 200 or 300)
    #[arg(long, global = true, env = "SEQTAG_EMBED_DIM", default_value_t = 50)]
    embed_dim: usize,

    /// Directory holding model checkpoints
    #[arg(long, global = true, env = "SEQTAG_CHECKPOINT_DIR", default_value = "checkpoint")]
    checkpoint_dir: PathBuf,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model, keeping the checkpoint with the best validation F1
    Train {
        #[arg(long, env = "SEQTAG_LEARNING_RATE", default_value_t = 1e-3)]
        learning_rate: f64,

        #[arg(long, env = "SEQTAG_NUM_EPOCH", default_value_t = 20)]
        num_epoch: usize,

        #[arg(long, env = "SEQTAG_BATCH_SIZE", default_value_t = 32)]
        batch_size: usize,

        #[arg(long, env = "SEQTAG_TRAIN_FILE", default_value = "data/onto.train")]
        train_file: PathBuf,

        #[arg(long, env = "SEQTAG_TEST_FILE", default_value = "data/onto.testa")]
        test_file: PathBuf,

        #[arg(long, env = "SEQTAG_GLOVE_DIR", default_value = "pretrain/glove.6B")]
        glove_dir: PathBuf,

        /// Fraction of the training file held out for validation
        #[arg(long, env = "SEQTAG_VAL_SIZE", default_value_t = 0.25)]
        val_size: f64,

        #[arg(long, env = "SEQTAG_SEED", default_value_t = 123)]
        seed: u64,
    },
    /// Score a trained checkpoint on a labeled file
    Eval {
        #[arg(long)]
        infile: PathBuf,

        #[arg(long, default_value_t = INFERENCE_MAX_LEN)]
        max_len: usize,

        /// Viterbi decoding with BIO constraints
        #[arg(long)]
        constrained: bool,
    },
    /// Write one predicted label per token
    Predict {
        #[arg(long)]
        infile: PathBuf,

        #[arg(long)]
        outfile: PathBuf,

        #[arg(long, default_value_t = INFERENCE_MAX_LEN)]
        max_len: usize,

        #[arg(long)]
        constrained: bool,
    },
    /// Score a pretrained BERT token classifier on a labeled file
    BertEval {
        /// Directory with config.json, model.safetensors and tokenizer.json
        #[arg(long)]
        model_dir: PathBuf,

        #[arg(long)]
        infile: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !GLOVE_DIMENSIONS.contains(&cli.embed_dim) {
        anyhow::bail!(
            "--embed-dim must be one of {:?}, got {}",
            GLOVE_DIMENSIONS,
            cli.embed_dim
        );
    }

    let device = Device::Cpu;
    let checkpoint = checkpoint_path(
        &cli.checkpoint_dir,
        cli.architecture,
        cli.n_layers,
        cli.manual_feature,
        cli.loss_fn,
        cli.embed_dim,
    );

    match &cli.command {
        Commands::Train {
            learning_rate,
            num_epoch,
            batch_size,
            train_file,
            test_file,
            glove_dir,
            val_size,
            seed,
        } => {
            let sentences = read_data(train_file)?;
            let vocab = Vocab::build(&sentences);
            let (train, val) = train_test_split(&sentences, *val_size, *seed)?;
            info!(
                train = train.len(),
                val = val.len(),
                words = vocab.num_words(),
                labels = vocab.num_labels(),
                "loaded training data"
            );

            let glove = load_glove(glove_dir, cli.embed_dim)?;
            let (matrix, _) = build_embedding_matrix(&glove, vocab.words(), *seed, &device)?;

            let additional = vocab.num_pos() + if cli.manual_feature { MANUAL_FEATURE_DIM } else { 0 };
            let model = ModelConfig::new(
                cli.architecture,
                vocab.num_words(),
                cli.embed_dim,
                additional,
                vocab.num_labels(),
            )
            .with_layers(cli.n_layers);
            let manifest = RunManifest {
                model,
                include_manual_features: cli.manual_feature,
                max_len: seqtag_core::MAX_LEN,
                loss_fn: cli.loss_fn,
                vocab,
            };

            let config = TrainConfig::new()
                .with_epochs(*num_epoch)
                .with_batch_size(*batch_size)
                .with_learning_rate(*learning_rate)
                .with_seed(*seed);
            let mut classifier = RnnClassifier::build(manifest, &matrix, &device)?;
            let report = classifier.fit(&train, &val, &config, Some(&checkpoint))?;
            if let (Some(epoch), Some(f1)) = (report.best_epoch, report.best_f1) {
                info!(epoch, f1, "best validation epoch");
            }

            let best = RnnClassifier::from_checkpoint(&checkpoint, None, &device)?;
            let test = read_data(test_file)?;
            report_scores(test_file, &best.evaluate(&test)?);
        }
        Commands::Eval {
            infile,
            max_len,
            constrained,
        } => {
            let classifier = load_classifier(&checkpoint, *max_len, *constrained, &device)?;
            let sentences = read_data(infile)?;
            report_scores(infile, &classifier.evaluate(&sentences)?);
        }
        Commands::Predict {
            infile,
            outfile,
            max_len,
            constrained,
        } => {
            let classifier = load_classifier(&checkpoint, *max_len, *constrained, &device)?;
            let sentences = read_data(infile)?;
            let labels = classifier.predict(&sentences)?;
            write_labels(outfile, &labels)
                .with_context(|| format!("writing predictions to {}", outfile.display()))?;
            info!(sentences = labels.len(), outfile = %outfile.display(), "wrote predictions");
        }
        Commands::BertEval { model_dir, infile } => {
            let sentences = read_data(infile)?;
            report_scores(infile, &evaluate_bert(model_dir, &sentences, &device)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_classifier(
    checkpoint: &Path,
    max_len: usize,
    constrained: bool,
    device: &Device,
) -> Result<RnnClassifier> {
    if !checkpoint.is_file() {
        anyhow::bail!(
            "checkpoint {} not found; train a model with the same flags first",
            checkpoint.display()
        );
    }
    Ok(RnnClassifier::from_checkpoint(checkpoint, Some(max_len), device)?
        .with_constrained_decoding(constrained))
}

fn report_scores(infile: &Path, scores: &Scores) {
    println!("{}", infile.display());
    println!(
        "precision: {:.4}  recall: {:.4}  f1: {:.4}  accuracy: {:.4}",
        scores.precision, scores.recall, scores.f1, scores.accuracy
    );
    for (chunk_type, s) in &scores.per_type {
        println!(
            "{chunk_type:>16}  precision: {:.4}  recall: {:.4}  f1: {:.4}  {}",
            s.precision, s.recall, s.f1, s.support
        );
    }
}
