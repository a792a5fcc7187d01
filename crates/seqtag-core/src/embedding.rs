//! # Pretrained Word Embeddings
//!
//! Loads GloVe 6B vectors and builds the embedding matrix for a vocabulary.
//! Parsing the text release is slow, so the first load writes a
//! safetensors cache next to the text file and later loads read that.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, info, warn};

use crate::error::{Result, SeqtagError};
use crate::vocab::{PAD, UNKNOWN};

/// Dimensions shipped in the GloVe 6B release.
pub const GLOVE_DIMENSIONS: &[usize] = &[50, 100, 200, 300];

const GLOVE_URL: &str = "http://nlp.stanford.edu/data/glove.6B.zip";
const CACHE_KEY: &str = "embeddings";

/// Word-to-vector table.
#[derive(Debug, Clone)]
pub struct GloveModel {
    dim: usize,
    words: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Vec<f32>,
}

impl GloveModel {
    fn new(dim: usize, words: Vec<String>, vectors: Vec<f32>) -> Self {
        let index = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Self {
            dim,
            words,
            index,
            vectors,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.index
            .get(word)
            .map(|&i| &self.vectors[i * self.dim..(i + 1) * self.dim])
    }

    /// Append `word`, or overwrite its vector if already present.
    fn set(&mut self, word: &str, vector: &[f32]) {
        match self.index.get(word) {
            Some(&i) => self.vectors[i * self.dim..(i + 1) * self.dim].copy_from_slice(vector),
            None => {
                self.index.insert(word.to_string(), self.words.len());
                self.words.push(word.to_string());
                self.vectors.extend_from_slice(vector);
            }
        }
    }
}

fn glove_paths(dir: &Path, dimension: usize) -> (PathBuf, PathBuf, PathBuf) {
    let stem = format!("glove.6B.{dimension}d");
    (
        dir.join(format!("{stem}.txt")),
        dir.join(format!("{stem}.safetensors")),
        dir.join(format!("{stem}.words.json")),
    )
}

/// Load the GloVe 6B embedding of the given dimension from `dir`.
pub fn load_glove<P: AsRef<Path>>(dir: P, dimension: usize) -> Result<GloveModel> {
    if !GLOVE_DIMENSIONS.contains(&dimension) {
        return Err(SeqtagError::InvalidConfig(format!(
            "GloVe 6B dimension must be one of {GLOVE_DIMENSIONS:?}, got {dimension}"
        )));
    }

    let (text_path, cache_path, words_path) = glove_paths(dir.as_ref(), dimension);
    if cache_path.is_file() && words_path.is_file() {
        match load_cache(&cache_path, &words_path, dimension) {
            Ok(model) => {
                info!(path = %cache_path.display(), words = model.len(), "loaded embedding cache");
                return Ok(model);
            }
            Err(e) => warn!(error = %e, "ignoring unreadable embedding cache"),
        }
    }

    if !text_path.is_file() {
        return Err(SeqtagError::MissingResource {
            path: text_path,
            hint: format!("download GloVe from {GLOVE_URL} and unpack it there"),
        });
    }

    info!(path = %text_path.display(), "loading GloVe vectors, this may take a while");
    let model = load_glove_file(&text_path, dimension)?;
    info!(words = model.len(), "GloVe vectors loaded");

    if let Err(e) = save_cache(&model, &cache_path, &words_path) {
        warn!(error = %e, "could not write embedding cache");
    }
    Ok(model)
}

/// Parse a GloVe text file. Adds [`UNKNOWN`] as the mean vector and
/// [`PAD`] as the zero vector.
pub fn load_glove_file<P: AsRef<Path>>(path: P, dimension: usize) -> Result<GloveModel> {
    let reader = BufReader::new(File::open(path)?);
    let mut words = Vec::new();
    let mut vectors = Vec::new();
    let mut sum = vec![0.0f64; dimension];

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            continue;
        };

        let start = vectors.len();
        for value in parts {
            let v: f32 = value.parse().map_err(|_| SeqtagError::MalformedEmbedding {
                line: idx + 1,
                reason: format!("{value:?} is not a number"),
            })?;
            vectors.push(v);
        }
        let found = vectors.len() - start;
        if found != dimension {
            return Err(SeqtagError::MalformedEmbedding {
                line: idx + 1,
                reason: format!("expected {dimension} values, got {found}"),
            });
        }
        for (acc, v) in sum.iter_mut().zip(&vectors[start..]) {
            *acc += f64::from(*v);
        }
        words.push(word.to_string());
    }

    let count = words.len().max(1) as f64;
    let average: Vec<f32> = sum.iter().map(|s| (s / count) as f32).collect();

    let mut model = GloveModel::new(dimension, words, vectors);
    model.set(UNKNOWN, &average);
    model.set(PAD, &vec![0.0; dimension]);
    Ok(model)
}

fn load_cache(cache_path: &Path, words_path: &Path, dimension: usize) -> Result<GloveModel> {
    let words: Vec<String> = serde_json::from_str(&std::fs::read_to_string(words_path)?)?;
    let tensors = candle_core::safetensors::load(cache_path, &Device::Cpu)?;
    let tensor = tensors.get(CACHE_KEY).ok_or_else(|| SeqtagError::MissingResource {
        path: cache_path.to_path_buf(),
        hint: format!("cache has no {CACHE_KEY:?} tensor"),
    })?;
    let (rows, cols) = tensor.dims2()?;
    if rows != words.len() || cols != dimension {
        return Err(SeqtagError::ShapeMismatch(format!(
            "cache is {rows}x{cols}, expected {}x{dimension}",
            words.len()
        )));
    }
    let vectors = tensor.flatten_all()?.to_vec1::<f32>()?;
    Ok(GloveModel::new(dimension, words, vectors))
}

fn save_cache(model: &GloveModel, cache_path: &Path, words_path: &Path) -> Result<()> {
    let tensor = Tensor::from_slice(&model.vectors, (model.len(), model.dim), &Device::Cpu)?;
    let tensors = HashMap::from([(CACHE_KEY.to_string(), tensor)]);
    candle_core::safetensors::save(&tensors, cache_path)?;
    std::fs::write(words_path, serde_json::to_string(&model.words)?)?;
    debug!(path = %cache_path.display(), "wrote embedding cache");
    Ok(())
}

/// Outcome of matching a vocabulary against pretrained vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingStats {
    pub total: usize,
    pub missed: usize,
}

impl EmbeddingStats {
    pub fn missing_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.missed as f64 / self.total as f64
        }
    }
}

/// Build a `[vocab.len(), dim]` matrix. Words are looked up lowercased;
/// words missing from the model get a standard-normal random row.
pub fn build_embedding_matrix<S: AsRef<str>>(
    model: &GloveModel,
    vocab: &[S],
    seed: u64,
    device: &Device,
) -> Result<(Tensor, EmbeddingStats)> {
    let dim = model.dim();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(vocab.len() * dim);
    let mut missed = 0usize;

    for word in vocab {
        let word = word.as_ref();
        let row = if word == UNKNOWN || word == PAD {
            model.get(word)
        } else {
            model.get(&word.to_lowercase())
        };
        match row {
            Some(row) => data.extend_from_slice(row),
            None => {
                debug!(word, "not in pretrained embedding, using random vector");
                data.extend((0..dim).map(|_| Distribution::<f32>::sample(&StandardNormal, &mut rng)));
                missed += 1;
            }
        }
    }

    let stats = EmbeddingStats {
        total: vocab.len(),
        missed,
    };
    info!(
        dim,
        total = stats.total,
        missed = stats.missed,
        missing_ratio = stats.missing_ratio(),
        "built embedding matrix"
    );

    let matrix = Tensor::from_vec(data, (vocab.len(), dim), device)?;
    Ok((matrix, stats))
}

/// Standard-normal `[vocab_size, dim]` matrix, for models whose weights are
/// restored from a checkpoint right after construction.
pub fn random_embedding_matrix(vocab_size: usize, dim: usize, seed: u64, device: &Device) -> Result<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = StandardNormal
        .sample_iter(&mut rng)
        .take(vocab_size * dim)
        .collect();
    Ok(Tensor::from_vec(data, (vocab_size, dim), device)?)
}
