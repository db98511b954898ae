// src/store/mod.rs
//! Word → vector lookup backends.
//!
//! Extraction only ever talks to the [`EmbeddingStore`] trait, so a flat
//! in-memory table and an LMDB file are interchangeable.

pub mod lmdb;
pub mod memory;

use anyhow::Result;
use std::collections::HashSet;

pub use lmdb::LmdbStore;
pub use memory::InMemoryStore;

/// Fixed-dimension word vector.
pub type EmbeddingVector = Vec<f32>;

/// Lookup contract for a precomputed embedding table.
///
/// Implementations are not required to tolerate concurrent reads; callers
/// hold exclusive access for the duration of a batch.
pub trait EmbeddingStore: Send {
    /// Width D of every vector in the store.
    fn dimension(&self) -> usize;

    /// Every token the store can resolve.
    fn vocabulary(&self) -> Result<&HashSet<String>>;

    /// One vector per input token, in input order. Repeated tokens are
    /// resolved independently.
    fn lookup_many(&self, tokens: &[&str]) -> Result<Vec<EmbeddingVector>>;
}

impl<S: EmbeddingStore + ?Sized> EmbeddingStore for Box<S> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn vocabulary(&self) -> Result<&HashSet<String>> {
        (**self).vocabulary()
    }

    fn lookup_many(&self, tokens: &[&str]) -> Result<Vec<EmbeddingVector>> {
        (**self).lookup_many(tokens)
    }
}

/// Parses one `word v1 v2 ... vD` line of a GloVe text file.
pub(crate) fn parse_glove_line(line: &str) -> Result<(String, EmbeddingVector)> {
    let mut parts = line.split(' ');
    let word = parts
        .next()
        .filter(|w| !w.is_empty())
        .ok_or_else(|| anyhow::anyhow!("line has no word"))?
        .to_string();
    let vector = parts
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<f32>()
                .map_err(|e| anyhow::anyhow!("invalid component '{}' for '{}': {}", p, word, e))
        })
        .collect::<Result<Vec<f32>>>()?;
    if vector.is_empty() {
        return Err(anyhow::anyhow!("word '{}' has no vector components", word));
    }
    Ok((word, vector))
}
