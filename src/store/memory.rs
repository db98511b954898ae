// src/store/memory.rs
use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{parse_glove_line, EmbeddingStore, EmbeddingVector};

/// Flat word table held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    dimension: usize,
    vectors: HashMap<String, EmbeddingVector>,
    vocabulary: HashSet<String>,
}

impl InMemoryStore {
    /// Builds a store from `(word, vector)` pairs. All vectors must share one
    /// non-zero width. Later duplicates of a word replace earlier ones.
    pub fn from_pairs<I, W>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (W, EmbeddingVector)>,
        W: Into<String>,
    {
        let mut dimension = None;
        let mut vectors = HashMap::new();
        for (word, vector) in pairs {
            let word = word.into();
            match dimension {
                None => {
                    if vector.is_empty() {
                        return Err(anyhow::anyhow!("embedding for '{}' is empty", word));
                    }
                    dimension = Some(vector.len());
                }
                Some(d) if d != vector.len() => {
                    return Err(anyhow::anyhow!(
                        "embedding for '{}' has {} components, expected {}",
                        word,
                        vector.len(),
                        d
                    ));
                }
                Some(_) => {}
            }
            vectors.insert(word, vector);
        }
        let dimension =
            dimension.ok_or_else(|| anyhow::anyhow!("cannot build an embedding store with no words"))?;
        let vocabulary = vectors.keys().cloned().collect();
        Ok(Self {
            dimension,
            vectors,
            vocabulary,
        })
    }

    /// Loads a GloVe text file, one `word v1 ... vD` entry per line.
    pub fn from_glove_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading GloVe vectors from {}", path.display());
        let file = File::open(path).context(format!("Failed to open {}", path.display()))?;
        let mut pairs = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context(format!("Failed to read line {} of {}", idx + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let pair = parse_glove_line(line.trim_end())
                .context(format!("Malformed GloVe entry on line {}", idx + 1))?;
            pairs.push(pair);
        }
        let store = Self::from_pairs(pairs).context(format!("Invalid GloVe file {}", path.display()))?;
        info!(
            "Loaded {} words of dimension {} into memory",
            store.len(),
            store.dimension
        );
        Ok(store)
    }

    /// Consumes the store, yielding every `(word, vector)` entry in
    /// arbitrary order.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, EmbeddingVector)> {
        self.vectors.into_iter()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl EmbeddingStore for InMemoryStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vocabulary(&self) -> Result<&HashSet<String>> {
        Ok(&self.vocabulary)
    }

    fn lookup_many(&self, tokens: &[&str]) -> Result<Vec<EmbeddingVector>> {
        debug!("In-memory lookup of {} tokens", tokens.len());
        tokens
            .iter()
            .map(|token| {
                self.vectors
                    .get(*token)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("token '{}' not in embedding table", token))
            })
            .collect()
    }
}
