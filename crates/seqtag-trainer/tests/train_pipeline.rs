use std::fmt::Write as _;
use std::path::Path;

use candle_core::Device;
use seqtag_core::data::{read_data, train_test_split, write_labels};
use seqtag_core::features::rnn::MANUAL_FEATURE_DIM;
use seqtag_core::{Architecture, ModelConfig, Vocab, build_embedding_matrix, load_glove};
use seqtag_trainer::{LossFn, RnnClassifier, RunManifest, TrainConfig, checkpoint_path};

const DIM: usize = 50;

const CORPUS: &str = "\
-DOCSTART- -X- O

John NNP B-PER
lives VBZ O
in IN O
Paris NNP B-LOC
. . O

Mary NNP B-PER
visited VBD O
New NNP B-LOC
York NNP I-LOC

The DT O
UN NNP B-ORG
met VBD O
in IN O
1999 CD O

Anna NNP B-PER
left VBD O
Berlin NNP B-LOC
";

fn write_glove(dir: &Path) {
    let mut text = String::new();
    for (i, word) in ["john", "lives", "in", "paris", ".", "the", "met"].iter().enumerate() {
        text.push_str(word);
        for d in 0..DIM {
            write!(text, " {:.3}", ((i * DIM + d) % 7) as f32 / 7.0 - 0.5).unwrap();
        }
        text.push('\n');
    }
    std::fs::write(dir.join(format!("glove.6B.{DIM}d.txt")), text).unwrap();
}

#[test]
fn test_train_checkpoint_predict() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("train.conll");
    std::fs::write(&data, CORPUS).unwrap();
    write_glove(dir.path());

    let device = Device::Cpu;
    let sentences = read_data(&data).unwrap();
    assert_eq!(sentences.len(), 4);
    let vocab = Vocab::build(&sentences);
    let (train, val) = train_test_split(&sentences, 0.25, 123).unwrap();
    assert_eq!((train.len(), val.len()), (3, 1));

    let glove = load_glove(dir.path(), DIM).unwrap();
    let (matrix, stats) = build_embedding_matrix(&glove, vocab.words(), 123, &device).unwrap();
    assert_eq!(stats.total, vocab.num_words());
    assert!(stats.missed > 0);

    let manifest = RunManifest {
        model: ModelConfig::new(
            Architecture::Lstm,
            vocab.num_words(),
            DIM,
            vocab.num_pos() + MANUAL_FEATURE_DIM,
            vocab.num_labels(),
        )
        .with_hidden_dim(16),
        include_manual_features: true,
        max_len: 12,
        loss_fn: LossFn::CrossEntropy,
        vocab,
    };
    let checkpoint = checkpoint_path(
        &dir.path().join("checkpoint"),
        Architecture::Lstm,
        1,
        true,
        LossFn::CrossEntropy,
        DIM,
    );

    let mut classifier = RnnClassifier::build(manifest, &matrix, &device).unwrap();
    let config = TrainConfig::new().with_epochs(3).with_batch_size(2).with_learning_rate(0.01);
    let report = classifier.fit(&train, &val, &config, Some(&checkpoint)).unwrap();
    assert_eq!(report.epochs.len(), 3);
    assert!(report.best_epoch.is_some());
    assert!(checkpoint.is_file());

    let restored = RnnClassifier::from_checkpoint(&checkpoint, Some(40), &device)
        .unwrap()
        .with_constrained_decoding(true);
    assert_eq!(restored.extractor().max_len(), 40);

    let scores = restored.evaluate(&sentences).unwrap();
    assert!((0.0..=1.0).contains(&scores.f1));

    let predictions = restored.predict(&sentences).unwrap();
    let out = dir.path().join("out").join("pred.txt");
    write_labels(&out, &predictions).unwrap();
    let written = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    // one label per token plus a blank line after each sentence
    assert_eq!(lines.len(), 5 + 4 + 5 + 3 + 4);
    assert!(written.lines().filter(|l| !l.is_empty()).all(|l| {
        restored.manifest().vocab.labels().iter().any(|label| label == l)
    }));
}
