// src/features/embedding.rs
use log::{debug, info, warn};
use ndarray::Array2;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::{FeatureError, FeatureResult};
use crate::features::tokenizer::Tokenizer;
use crate::features::FeatureMatrix;
use crate::models::{CoverageRecord, CoverageSummary, Profile};
use crate::store::EmbeddingStore;
use crate::utils::candle::pool_mean_max_min;
use crate::utils::progress::ExtractionHooks;

const DEFAULT_LOW_COVERAGE_WARN_RATIO: f64 = 0.5;

/// Result of one embedding extraction call.
///
/// When the call was aborted, `matrix` and `coverage` hold the rows for the
/// first `completed()` profiles, which remain valid.
#[derive(Debug, Clone)]
pub struct EmbeddingExtraction {
    pub matrix: FeatureMatrix,
    pub coverage: Vec<CoverageRecord>,
    pub total: usize,
}

impl EmbeddingExtraction {
    pub fn completed(&self) -> usize {
        self.coverage.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.total
    }

    pub fn summary(&self) -> Option<CoverageSummary> {
        CoverageSummary::from_records(&self.coverage)
    }
}

/// Turns each profile's text into a `3 * D` row of pooled word vectors.
///
/// The extractor owns its store for its whole lifetime. Every batch holds
/// the store lock from start to finish, so calls sharing an extractor run
/// one after another.
pub struct EmbeddingFeatureExtractor {
    store: Mutex<Box<dyn EmbeddingStore>>,
    dimension: usize,
    tokenizer: Tokenizer,
    low_coverage_warn_ratio: f64,
}

impl EmbeddingFeatureExtractor {
    pub fn new<S: EmbeddingStore + 'static>(store: S) -> Self {
        Self::from_boxed(Box::new(store))
    }

    pub fn from_boxed(store: Box<dyn EmbeddingStore>) -> Self {
        let dimension = store.dimension();
        Self {
            store: Mutex::new(store),
            dimension,
            tokenizer: Tokenizer::new(),
            low_coverage_warn_ratio: DEFAULT_LOW_COVERAGE_WARN_RATIO,
        }
    }

    /// Profiles whose coverage ratio falls below `ratio` are logged as warnings.
    pub fn with_low_coverage_warning(mut self, ratio: f64) -> Self {
        self.low_coverage_warn_ratio = ratio;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Output width: mean, max and min blocks of `D` columns each.
    pub fn width(&self) -> usize {
        3 * self.dimension
    }

    /// Extracts one row per profile plus per-profile coverage.
    ///
    /// Fails on the first profile that cannot be extracted; no rows are
    /// returned in that case.
    pub fn extract(&self, profiles: &[Profile]) -> FeatureResult<(FeatureMatrix, Vec<CoverageRecord>)> {
        let extraction = self.extract_with(profiles, &ExtractionHooks::default())?;
        Ok((extraction.matrix, extraction.coverage))
    }

    /// Like [`extract`](Self::extract), reporting progress after every profile
    /// and polling the abort flag before each one.
    pub fn extract_with(
        &self,
        profiles: &[Profile],
        hooks: &ExtractionHooks,
    ) -> FeatureResult<EmbeddingExtraction> {
        let start = Instant::now();
        let total = profiles.len();
        let width = self.width();

        let store = self.store.lock().map_err(|_| {
            FeatureError::StoreUnavailable(anyhow::anyhow!("embedding store lock poisoned"))
        })?;
        let vocabulary = store.vocabulary().map_err(FeatureError::StoreUnavailable)?;

        let mut values: Vec<f64> = Vec::with_capacity(total * width);
        let mut coverage: Vec<CoverageRecord> = Vec::with_capacity(total);

        for (idx, profile) in profiles.iter().enumerate() {
            if hooks.should_abort() {
                warn!(
                    "Embedding extraction aborted after {}/{} profiles",
                    idx, total
                );
                break;
            }
            let (row, record) = self.extract_profile(&**store, vocabulary, profile)?;
            values.extend(row);
            coverage.push(record);
            hooks.notify(idx + 1, total);
        }
        drop(store);

        let matrix = Array2::from_shape_vec((coverage.len(), width), values)
            .map_err(|e| FeatureError::ShapeMismatch(e.to_string()))?;
        let extraction = EmbeddingExtraction {
            matrix,
            coverage,
            total,
        };

        match extraction.summary() {
            Some(summary) => info!(
                "Extracted embedding features for {}/{} profiles in {:.2?} (mean coverage {:.3}, mean word count {:.1})",
                summary.profiles,
                total,
                start.elapsed(),
                summary.mean_ratio,
                summary.mean_word_count
            ),
            None => debug!("Embedding extraction produced no rows ({} profiles requested)", total),
        }
        Ok(extraction)
    }

    fn extract_profile(
        &self,
        store: &dyn EmbeddingStore,
        vocabulary: &HashSet<String>,
        profile: &Profile,
    ) -> FeatureResult<(Vec<f64>, CoverageRecord)> {
        let tokens = self.tokenizer.tokenize(&profile.text);
        let resolvable: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|token| vocabulary.contains(*token))
            .collect();

        debug!(
            "Profile {}: {} tokens, {} resolvable",
            profile.user_id,
            tokens.len(),
            resolvable.len()
        );

        if resolvable.is_empty() {
            return Err(FeatureError::NoEmbeddingFound {
                user_id: profile.user_id.clone(),
            });
        }

        let vectors = store
            .lookup_many(&resolvable)
            .map_err(FeatureError::StoreUnavailable)?;
        if vectors.len() != resolvable.len() {
            return Err(FeatureError::StoreUnavailable(anyhow::anyhow!(
                "store returned {} vectors for {} tokens of profile {}",
                vectors.len(),
                resolvable.len(),
                profile.user_id
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(FeatureError::StoreUnavailable(anyhow::anyhow!(
                "store returned a {}-component vector, expected {}",
                bad.len(),
                self.dimension
            )));
        }

        let row = pool_mean_max_min(&vectors, self.dimension).map_err(FeatureError::Pooling)?;
        let record = CoverageRecord::new(profile.user_id.clone(), resolvable.len(), tokens.len());
        if record.ratio < self.low_coverage_warn_ratio {
            warn!(
                "Profile {} has low embedding coverage: {}/{} tokens ({:.2})",
                profile.user_id, record.resolvable, record.total, record.ratio
            );
        }
        Ok((row, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EmbeddingVector, InMemoryStore};
    use crate::utils::progress::{AbortFlag, ProgressCallback};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scenario_store() -> InMemoryStore {
        InMemoryStore::from_pairs(vec![
            ("good", vec![1.0, 0.0]),
            ("bad", vec![0.0, 1.0]),
            ("meh", vec![0.5, 0.5]),
        ])
        .unwrap()
    }

    /// Wraps a store and counts `lookup_many` round-trips.
    struct CountingStore {
        inner: InMemoryStore,
        lookups: Arc<AtomicUsize>,
    }

    impl EmbeddingStore for CountingStore {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn vocabulary(&self) -> anyhow::Result<&HashSet<String>> {
            self.inner.vocabulary()
        }

        fn lookup_many(&self, tokens: &[&str]) -> anyhow::Result<Vec<EmbeddingVector>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup_many(tokens)
        }
    }

    /// A store whose backend has gone away.
    struct BrokenStore {
        vocabulary: HashSet<String>,
    }

    impl EmbeddingStore for BrokenStore {
        fn dimension(&self) -> usize {
            2
        }

        fn vocabulary(&self) -> anyhow::Result<&HashSet<String>> {
            Ok(&self.vocabulary)
        }

        fn lookup_many(&self, _tokens: &[&str]) -> anyhow::Result<Vec<EmbeddingVector>> {
            Err(anyhow::anyhow!("connection reset"))
        }
    }

    fn assert_close(got: &[f64], want: &[f64]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).abs() < 1e-12, "got {:?}, want {:?}", got, want);
        }
    }

    #[test]
    fn test_pooled_scenario() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let (matrix, coverage) = extractor
            .extract(&[Profile::new("u1", "good good bad")])
            .unwrap();

        assert_eq!(matrix.dim(), (1, 6));
        let row: Vec<f64> = matrix.row(0).to_vec();
        assert_close(&row, &[2.0 / 3.0, 1.0 / 3.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(coverage, vec![CoverageRecord::new("u1", 3, 3)]);
        assert_eq!(coverage[0].ratio, 1.0);
    }

    #[test]
    fn test_unknown_token_fails() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let err = extractor.extract(&[Profile::new("u1", "xyz123")]).unwrap_err();
        match err {
            FeatureError::NoEmbeddingFound { user_id } => assert_eq!(user_id, "u1"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_partial_coverage_ratio() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let (matrix, coverage) = extractor
            .extract(&[Profile::new("u1", "good unknown  bad good")])
            .unwrap();
        // Tokens: good, unknown, "", bad, good -> 3 of 5 resolve.
        assert_eq!(coverage[0].resolvable, 3);
        assert_eq!(coverage[0].total, 5);
        assert_eq!(coverage[0].ratio, 3.0 / 5.0);
        assert_eq!(matrix.ncols(), 6);
    }

    #[test]
    fn test_width_is_three_times_dimension() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        assert_eq!(extractor.dimension(), 2);
        assert_eq!(extractor.width(), 6);
        let (matrix, _) = extractor
            .extract(&[Profile::new("a", "meh"), Profile::new("b", "good bad meh nope")])
            .unwrap();
        assert_eq!(matrix.dim(), (2, 6));
    }

    #[test]
    fn test_pooling_is_permutation_invariant() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let mut tokens = vec!["good", "bad", "meh", "good", "meh", "meh", "bad", "unknown"];
        let (base, _) = extractor
            .extract(&[Profile::new("u", tokens.join(" "))])
            .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            tokens.shuffle(&mut rng);
            let (shuffled, _) = extractor
                .extract(&[Profile::new("u", tokens.join(" "))])
                .unwrap();
            assert_close(&shuffled.row(0).to_vec(), &base.row(0).to_vec());
        }
    }

    #[test]
    fn test_rows_follow_input_order() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let profiles = vec![
            Profile::new("first", "good"),
            Profile::new("second", "bad"),
            Profile::new("third", "meh"),
        ];
        let (matrix, coverage) = extractor.extract(&profiles).unwrap();
        assert_eq!(matrix.nrows(), 3);
        assert_eq!(coverage.len(), 3);
        assert_eq!(matrix[[0, 0]], 1.0);
        assert_eq!(matrix[[1, 0]], 0.0);
        assert_eq!(matrix[[2, 0]], 0.5);
        let ids: Vec<&str> = coverage.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_fail_fast_stops_at_failing_profile() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let extractor = EmbeddingFeatureExtractor::new(CountingStore {
            inner: scenario_store(),
            lookups: Arc::clone(&lookups),
        });
        let progress_calls = Arc::new(AtomicUsize::new(0));
        let progress_clone = Arc::clone(&progress_calls);
        let callback: ProgressCallback = Arc::new(move |_pos, _total| {
            progress_clone.fetch_add(1, Ordering::SeqCst);
        });

        let profiles = vec![
            Profile::new("p1", "good"),
            Profile::new("p2", "nothing known here"),
            Profile::new("p3", "bad"),
        ];
        let err = extractor
            .extract_with(&profiles, &ExtractionHooks::default().with_progress(callback))
            .unwrap_err();

        assert!(matches!(err, FeatureError::NoEmbeddingFound { ref user_id } if user_id == "p2"));
        // Profile 3 was never looked up.
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert_eq!(progress_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_one_lookup_per_profile() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let extractor = EmbeddingFeatureExtractor::new(CountingStore {
            inner: scenario_store(),
            lookups: Arc::clone(&lookups),
        });
        let profiles = vec![
            Profile::new("a", "good bad good meh bad"),
            Profile::new("b", "meh meh"),
        ];
        extractor.extract(&profiles).unwrap();
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_progress_reports_positions() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |pos, total| {
            seen_clone.lock().unwrap().push((pos, total));
        });
        let profiles = vec![Profile::new("a", "good"), Profile::new("b", "bad")];
        extractor
            .extract_with(&profiles, &ExtractionHooks::default().with_progress(callback))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_abort_keeps_completed_rows() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let flag = AbortFlag::new();
        let flag_clone = flag.clone();
        let callback: ProgressCallback = Arc::new(move |pos, _total| {
            if pos == 1 {
                flag_clone.abort();
            }
        });
        let hooks = ExtractionHooks::default()
            .with_progress(callback)
            .with_abort(flag);
        let profiles = vec![
            Profile::new("a", "good"),
            Profile::new("b", "bad"),
            Profile::new("c", "meh"),
        ];

        let extraction = extractor.extract_with(&profiles, &hooks).unwrap();
        assert!(!extraction.is_complete());
        assert_eq!(extraction.completed(), 1);
        assert_eq!(extraction.total, 3);
        assert_eq!(extraction.matrix.dim(), (1, 6));
        assert_eq!(extraction.coverage[0].user_id, "a");
    }

    #[test]
    fn test_store_failure_propagates() {
        let extractor = EmbeddingFeatureExtractor::new(BrokenStore {
            vocabulary: ["good".to_string()].into_iter().collect(),
        });
        let err = extractor.extract(&[Profile::new("u", "good")]).unwrap_err();
        match err {
            FeatureError::StoreUnavailable(source) => {
                assert!(source.to_string().contains("connection reset"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let extraction = extractor.extract_with(&[], &ExtractionHooks::default()).unwrap();
        assert_eq!(extraction.matrix.dim(), (0, 6));
        assert!(extraction.is_complete());
        assert!(extraction.summary().is_none());
    }

    #[test]
    fn test_no_state_carried_between_calls() {
        let extractor = EmbeddingFeatureExtractor::new(scenario_store());
        let (_, first) = extractor
            .extract(&[Profile::new("a", "good"), Profile::new("b", "bad x")])
            .unwrap();
        let (_, second) = extractor.extract(&[Profile::new("c", "meh")]).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second, vec![CoverageRecord::new("c", 1, 1)]);
    }
}
