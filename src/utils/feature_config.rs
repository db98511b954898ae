// src/utils/feature_config.rs
use anyhow::{Context, Result};
use log::{info, warn};
use std::env;
use std::path::PathBuf;

use super::env::env_bool;
use crate::store::{EmbeddingStore, InMemoryStore, LmdbStore};

const DEFAULT_LOW_COVERAGE_WARN_RATIO: f64 = 0.5;

/// Backing format of the embedding store on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// GloVe text file loaded into memory.
    Flat,
    /// LMDB environment built by `build_embedding_store`.
    Lmdb,
}

impl std::str::FromStr for StoreMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "text" => Ok(StoreMode::Flat),
            "lmdb" | "database" | "db" => Ok(StoreMode::Lmdb),
            other => Err(anyhow::anyhow!("unknown embedding store mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub store_path: Option<PathBuf>,
    pub store_mode: StoreMode,
    pub category_schema: Vec<String>,
    pub workers: usize,
    pub scaling: bool,
    pub low_coverage_warn_ratio: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            store_mode: StoreMode::Lmdb,
            category_schema: Vec::new(),
            workers: num_cpus::get(),
            scaling: true,
            low_coverage_warn_ratio: DEFAULT_LOW_COVERAGE_WARN_RATIO,
        }
    }
}

impl FeatureConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_mode = match env::var("EMBEDDING_STORE_MODE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}; falling back to lmdb", e);
                StoreMode::Lmdb
            }),
            Err(_) => defaults.store_mode,
        };

        let category_schema = env::var("CATEGORY_SCHEMA")
            .map(|s| {
                s.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let workers = env::var("FEATURE_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.workers);

        let low_coverage_warn_ratio = env::var("LOW_COVERAGE_WARN_RATIO")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|r| (0.0..=1.0).contains(r))
            .unwrap_or(defaults.low_coverage_warn_ratio);

        Self {
            store_path: env::var("EMBEDDING_STORE_PATH").ok().map(PathBuf::from),
            store_mode,
            category_schema,
            workers,
            scaling: env_bool("FEATURE_SCALING", defaults.scaling),
            low_coverage_warn_ratio,
        }
    }

    pub fn log_config(&self) {
        match self.store_path {
            Some(ref path) => info!(
                "Embedding store: {} ({:?})",
                path.display(),
                self.store_mode
            ),
            None => warn!("No EMBEDDING_STORE_PATH set; embedding features unavailable"),
        }
        if self.category_schema.is_empty() {
            info!("No CATEGORY_SCHEMA set; category features disabled");
        } else {
            info!("Category schema: {} columns", self.category_schema.len());
        }
        info!(
            "Workers: {}, scaling: {}, low coverage warning below {:.2}",
            self.workers, self.scaling, self.low_coverage_warn_ratio
        );
    }

    /// Opens the configured embedding store.
    pub fn open_store(&self) -> Result<Box<dyn EmbeddingStore>> {
        let path = self
            .store_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("EMBEDDING_STORE_PATH is not set"))?;
        let store: Box<dyn EmbeddingStore> = match self.store_mode {
            StoreMode::Flat => Box::new(
                InMemoryStore::from_glove_file(path).context("Failed to load flat embedding store")?,
            ),
            StoreMode::Lmdb => {
                Box::new(LmdbStore::open(path).context("Failed to open LMDB embedding store")?)
            }
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_mode_parse() {
        assert_eq!("flat".parse::<StoreMode>().unwrap(), StoreMode::Flat);
        assert_eq!(" LMDB ".parse::<StoreMode>().unwrap(), StoreMode::Lmdb);
        assert_eq!("database".parse::<StoreMode>().unwrap(), StoreMode::Lmdb);
        assert!("sqlite".parse::<StoreMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = FeatureConfig::default();
        assert!(config.store_path.is_none());
        assert_eq!(config.store_mode, StoreMode::Lmdb);
        assert!(config.workers >= 1);
        assert!(config.scaling);
        assert_eq!(config.low_coverage_warn_ratio, 0.5);
    }

    // Single test touching the environment so parallel tests do not race.
    #[test]
    fn test_env_config() {
        env::set_var("EMBEDDING_STORE_PATH", "/tmp/glove.lmdb");
        env::set_var("EMBEDDING_STORE_MODE", "flat");
        env::set_var("CATEGORY_SCHEMA", "posemo, negemo,,social");
        env::set_var("FEATURE_WORKERS", "3");
        env::set_var("FEATURE_SCALING", "false");
        env::set_var("LOW_COVERAGE_WARN_RATIO", "0.25");

        let config = FeatureConfig::from_env();
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/glove.lmdb")));
        assert_eq!(config.store_mode, StoreMode::Flat);
        assert_eq!(config.category_schema, vec!["posemo", "negemo", "social"]);
        assert_eq!(config.workers, 3);
        assert!(!config.scaling);
        assert_eq!(config.low_coverage_warn_ratio, 0.25);

        env::set_var("FEATURE_WORKERS", "0");
        env::set_var("LOW_COVERAGE_WARN_RATIO", "7");
        let config = FeatureConfig::from_env();
        assert_eq!(config.workers, num_cpus::get());
        assert_eq!(config.low_coverage_warn_ratio, 0.5);

        env::remove_var("EMBEDDING_STORE_PATH");
        env::remove_var("EMBEDDING_STORE_MODE");
        env::remove_var("CATEGORY_SCHEMA");
        env::remove_var("FEATURE_WORKERS");
        env::remove_var("FEATURE_SCALING");
        env::remove_var("LOW_COVERAGE_WARN_RATIO");
    }

    #[test]
    fn test_open_store_without_path_fails() {
        let config = FeatureConfig::default();
        assert!(config.open_store().is_err());
    }
}
