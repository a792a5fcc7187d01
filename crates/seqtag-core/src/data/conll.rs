//! CoNLL-style column reader and label writer.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::{Sentence, TaggedToken};
use crate::error::{Result, SeqtagError};

const DOCSTART: &str = "-DOCSTART-";

/// Load sentences from a whitespace-separated column file.
pub fn read_data<P: AsRef<Path>>(path: P) -> Result<Vec<Sentence>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SeqtagError::MissingResource {
            path: path.to_path_buf(),
            hint: "corpus file does not exist".into(),
        },
        _ => SeqtagError::Io(e),
    })?;
    let sentences = parse_reader(BufReader::new(file))?;
    debug!(path = %path.display(), sentences = sentences.len(), "read corpus");
    Ok(sentences)
}

/// Parse sentences from an in-memory corpus.
pub fn parse_sentences(text: &str) -> Result<Vec<Sentence>> {
    parse_reader(text.as_bytes())
}

fn parse_reader<R: BufRead>(reader: R) -> Result<Vec<Sentence>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();
    let mut labeled: Option<bool> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !current.is_empty() {
                sentences.push(Sentence::new(std::mem::take(&mut current)));
            }
            continue;
        }

        if line.starts_with(DOCSTART) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let token = match parts.as_slice() {
            [token, pos] => TaggedToken::unlabeled(token, pos),
            [token, pos, tag] => TaggedToken::labeled(token, pos, tag),
            _ => {
                return Err(SeqtagError::MalformedLine {
                    line: idx + 1,
                    columns: parts.len(),
                });
            }
        };

        let has_tag = token.tag.is_some();
        match labeled {
            None => labeled = Some(has_tag),
            Some(expected) if expected != has_tag => {
                return Err(SeqtagError::InconsistentColumns {
                    expected: if expected { "labeled" } else { "unlabeled" },
                });
            }
            Some(_) => {}
        }
        current.push(token);
    }

    if !current.is_empty() {
        sentences.push(Sentence::new(current));
    }

    Ok(sentences)
}

/// Write one label per line, with a blank line after every sentence.
pub fn write_labels<P: AsRef<Path>>(path: P, labels: &[Vec<String>]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_labels_to(&mut writer, labels)?;
    writer.flush()?;
    Ok(())
}

pub fn write_labels_to<W: Write>(writer: &mut W, labels: &[Vec<String>]) -> Result<()> {
    for sentence in labels {
        for label in sentence {
            writeln!(writer, "{label}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
