// src/store/lmdb.rs
use anyhow::{Context, Result};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use log::{debug, info};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use super::{EmbeddingStore, EmbeddingVector};

// Large enough for the 300d Common Crawl vocabulary.
const LMDB_MAP_SIZE_MIB: usize = 8192;
const VECTORS_DB: &str = "vectors";
const META_DB: &str = "meta";
const DIMENSION_KEY: &str = "dimension";

/// Embedding table persisted in an LMDB environment.
///
/// Vectors are stored as little-endian `f32` bytes keyed by word. The
/// vocabulary is read once when the store is opened and kept in memory.
pub struct LmdbStore {
    env: Env,
    vectors: Database<Str, Bytes>,
    dimension: usize,
    vocabulary: HashSet<String>,
}

fn open_env(path: &Path) -> Result<Env> {
    std::fs::create_dir_all(path)
        .context(format!("Failed to create LMDB directory {}", path.display()))?;
    // Safety: the environment is opened once per store and never from two
    // handles in the same process.
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(LMDB_MAP_SIZE_MIB * 1024 * 1024)
            .max_dbs(2)
            .open(path)
    }
    .context(format!("Failed to open LMDB environment at {}", path.display()))?;
    Ok(env)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8], dimension: usize) -> Result<EmbeddingVector> {
    if bytes.len() != dimension * 4 {
        return Err(anyhow::anyhow!(
            "stored vector has {} bytes, expected {}",
            bytes.len(),
            dimension * 4
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl LmdbStore {
    /// Writes `entries` into the store at `path`, creating it if needed.
    pub fn create<I, W>(path: impl AsRef<Path>, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (W, EmbeddingVector)>,
        W: AsRef<str>,
    {
        let path = path.as_ref();
        let start = Instant::now();
        let env = open_env(path)?;
        let mut wtxn = env.write_txn().context("Failed to start LMDB write transaction")?;
        let vectors: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(VECTORS_DB))
            .context("Failed to create vectors database")?;
        let meta: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(META_DB))
            .context("Failed to create metadata database")?;

        let mut dimension: Option<usize> = None;
        let mut vocabulary = HashSet::new();
        for (word, vector) in entries {
            let word = word.as_ref();
            match dimension {
                None if vector.is_empty() => {
                    return Err(anyhow::anyhow!("embedding for '{}' is empty", word));
                }
                None => dimension = Some(vector.len()),
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
            vectors
                .put(&mut wtxn, word, &encode_vector(&vector))
                .context(format!("Failed to write vector for '{}'", word))?;
            vocabulary.insert(word.to_string());
        }
        let dimension =
            dimension.ok_or_else(|| anyhow::anyhow!("cannot build an embedding store with no words"))?;
        meta.put(&mut wtxn, DIMENSION_KEY, &(dimension as u64).to_le_bytes()[..])
            .context("Failed to write store dimension")?;
        wtxn.commit().context("Failed to commit LMDB write transaction")?;

        info!(
            "Wrote {} vectors of dimension {} to {} in {:.2?}",
            vocabulary.len(),
            dimension,
            path.display(),
            start.elapsed()
        );
        Ok(Self {
            env,
            vectors,
            dimension,
            vocabulary,
        })
    }

    /// Opens an existing store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let start = Instant::now();
        let env = open_env(path)?;
        let rtxn = env.read_txn().context("Failed to start LMDB read transaction")?;
        let vectors: Database<Str, Bytes> = env
            .open_database(&rtxn, Some(VECTORS_DB))
            .context("Failed to open vectors database")?
            .ok_or_else(|| anyhow::anyhow!("{} holds no embedding table", path.display()))?;
        let meta: Database<Str, Bytes> = env
            .open_database(&rtxn, Some(META_DB))
            .context("Failed to open metadata database")?
            .ok_or_else(|| anyhow::anyhow!("{} holds no store metadata", path.display()))?;

        let dim_bytes = meta
            .get(&rtxn, DIMENSION_KEY)
            .context("Failed to read store dimension")?
            .ok_or_else(|| anyhow::anyhow!("store metadata has no dimension"))?;
        let dim_array: [u8; 8] = dim_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("store dimension is {} bytes, expected 8", dim_bytes.len()))?;
        let dimension = u64::from_le_bytes(dim_array) as usize;

        let mut vocabulary = HashSet::new();
        for entry in vectors.iter(&rtxn).context("Failed to iterate vocabulary")? {
            let (word, _) = entry.context("Failed to read vocabulary entry")?;
            vocabulary.insert(word.to_string());
        }
        // Handles opened in an aborted transaction are closed by LMDB.
        rtxn.commit().context("Failed to commit LMDB read transaction")?;

        info!(
            "Opened LMDB embedding store at {} ({} words, dimension {}) in {:.2?}",
            path.display(),
            vocabulary.len(),
            dimension,
            start.elapsed()
        );
        Ok(Self {
            env,
            vectors,
            dimension,
            vocabulary,
        })
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }
}

impl EmbeddingStore for LmdbStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vocabulary(&self) -> Result<&HashSet<String>> {
        Ok(&self.vocabulary)
    }

    fn lookup_many(&self, tokens: &[&str]) -> Result<Vec<EmbeddingVector>> {
        debug!("LMDB lookup of {} tokens", tokens.len());
        let rtxn = self
            .env
            .read_txn()
            .context("Failed to start LMDB read transaction")?;
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            let bytes = self
                .vectors
                .get(&rtxn, *token)
                .context(format!("Failed to read vector for '{}'", token))?
                .ok_or_else(|| anyhow::anyhow!("token '{}' not in embedding table", token))?;
            out.push(decode_vector(bytes, self.dimension)?);
        }
        Ok(out)
    }
}
