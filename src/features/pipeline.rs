// src/features/pipeline.rs
use futures::future;
use log::{debug, info};
use ndarray::{concatenate, Axis};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{FeatureError, FeatureResult};
use crate::features::category::CategoryFeatureExtractor;
use crate::features::embedding::EmbeddingFeatureExtractor;
use crate::features::scaling::{StandardScaler, TransformStage};
use crate::features::FeatureMatrix;
use crate::models::{CoverageRecord, Profile};
use crate::utils::progress::{AbortFlag, ExtractionHooks};

/// Whether an extractor may be split across worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// No shared mutable state; profiles can be chunked across workers.
    Parallel,
    /// Shares one store connection; runs as a single task.
    Serialized,
}

/// A feature family participating in the pipeline.
#[derive(Clone)]
pub enum Extractor {
    Category(Arc<CategoryFeatureExtractor>),
    Embedding(Arc<EmbeddingFeatureExtractor>),
}

impl Extractor {
    pub fn name(&self) -> &'static str {
        match self {
            Extractor::Category(_) => "category",
            Extractor::Embedding(_) => "embedding",
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Extractor::Category(e) => e.width(),
            Extractor::Embedding(e) => e.width(),
        }
    }

    pub fn parallelism(&self) -> Parallelism {
        match self {
            Extractor::Category(_) => Parallelism::Parallel,
            Extractor::Embedding(_) => Parallelism::Serialized,
        }
    }
}

/// Features for a batch plus the embedding coverage, when an embedding
/// extractor took part.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub matrix: FeatureMatrix,
    pub coverage: Option<Vec<CoverageRecord>>,
}

struct ExtractorBlock {
    matrix: FeatureMatrix,
    coverage: Option<Vec<CoverageRecord>>,
}

#[derive(Default)]
pub struct FeaturePipelineBuilder {
    extractors: Vec<Extractor>,
    stages: Vec<TransformStage>,
    workers: Option<usize>,
    hooks: ExtractionHooks,
}

impl FeaturePipelineBuilder {
    pub fn category(mut self, extractor: CategoryFeatureExtractor) -> Self {
        self.extractors.push(Extractor::Category(Arc::new(extractor)));
        self
    }

    pub fn embedding(mut self, extractor: EmbeddingFeatureExtractor) -> Self {
        self.extractors.push(Extractor::Embedding(Arc::new(extractor)));
        self
    }

    pub fn stage(mut self, stage: TransformStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn standard_scaler(self) -> Self {
        self.stage(TransformStage::Fittable(Box::new(StandardScaler::new())))
    }

    /// Upper bound on concurrent category extraction chunks.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    pub fn hooks(mut self, hooks: ExtractionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> FeatureResult<FeaturePipeline> {
        if self.extractors.is_empty() {
            return Err(FeatureError::InvalidConfig(
                "pipeline needs at least one extractor".to_string(),
            ));
        }
        let embedding_count = self
            .extractors
            .iter()
            .filter(|e| matches!(e, Extractor::Embedding(_)))
            .count();
        if embedding_count > 1 {
            return Err(FeatureError::InvalidConfig(format!(
                "pipeline supports one embedding extractor, got {}",
                embedding_count
            )));
        }
        Ok(FeaturePipeline {
            extractors: self.extractors,
            stages: self.stages,
            workers: self.workers.unwrap_or_else(num_cpus::get),
            hooks: self.hooks,
        })
    }
}

/// Extractors joined column-wise in declaration order, followed by
/// transform stages.
///
/// `fit` and `fit_transform` need `&mut self`; `transform` only reads the
/// fitted statistics, so concurrent `transform` calls on a shared pipeline
/// are fine once it has been fitted.
pub struct FeaturePipeline {
    extractors: Vec<Extractor>,
    stages: Vec<TransformStage>,
    workers: usize,
    hooks: ExtractionHooks,
}

impl std::fmt::Debug for FeaturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePipeline")
            .field(
                "extractors",
                &self.extractors.iter().map(Extractor::name).collect::<Vec<_>>(),
            )
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl FeaturePipeline {
    pub fn builder() -> FeaturePipelineBuilder {
        FeaturePipelineBuilder::default()
    }

    pub fn width(&self) -> usize {
        self.extractors.iter().map(Extractor::width).sum()
    }

    pub fn extractors(&self) -> &[Extractor] {
        &self.extractors
    }

    pub fn requires_fit(&self) -> bool {
        self.stages.iter().any(TransformStage::requires_fit)
    }

    pub fn is_fitted(&self) -> bool {
        self.stages.iter().all(TransformStage::is_ready)
    }

    /// Extracts features and fits every fittable stage on them. Refitting
    /// replaces earlier statistics.
    pub async fn fit(&mut self, profiles: &[Profile]) -> FeatureResult<()> {
        self.fit_transform(profiles).await.map(|_| ())
    }

    /// Training entry point: extract, then fit and apply each stage in order.
    pub async fn fit_transform(&mut self, profiles: &[Profile]) -> FeatureResult<PipelineOutput> {
        let start = Instant::now();
        let block = self.extract(profiles).await?;
        let mut matrix = block.matrix;
        for stage in self.stages.iter_mut() {
            stage.fit(&matrix)?;
            matrix = stage.apply(matrix)?;
        }
        info!(
            "fit_transform produced {} x {} features in {:.2?}",
            matrix.nrows(),
            matrix.ncols(),
            start.elapsed()
        );
        Ok(PipelineOutput {
            matrix,
            coverage: block.coverage,
        })
    }

    /// Inference entry point: extract and apply stored stage parameters.
    pub async fn transform(&self, profiles: &[Profile]) -> FeatureResult<PipelineOutput> {
        if let Some(stage) = self.stages.iter().find(|s| !s.is_ready()) {
            return Err(FeatureError::NotFitted {
                stage: stage.name().to_string(),
            });
        }
        let block = self.extract(profiles).await?;
        let mut matrix = block.matrix;
        for stage in &self.stages {
            matrix = stage.apply(matrix)?;
        }
        debug!("transform produced {} x {} features", matrix.nrows(), matrix.ncols());
        Ok(PipelineOutput {
            matrix,
            coverage: block.coverage,
        })
    }

    async fn extract(&self, profiles: &[Profile]) -> FeatureResult<ExtractorBlock> {
        let shared = Arc::new(profiles.to_vec());
        // Raised on the first extractor failure. The embedding task polls it
        // between profiles, so an abandoned batch releases the store early.
        let cancel = AbortFlag::new();
        let hooks = self.hooks.clone().with_abort(cancel.clone());
        let tasks = self.extractors.iter().cloned().map(|extractor| {
            let cancel = cancel.clone();
            let task = run_extractor(extractor, Arc::clone(&shared), self.workers, hooks.clone());
            async move {
                let result = task.await;
                if result.is_err() {
                    cancel.abort();
                }
                result
            }
        });
        let blocks = match future::try_join_all(tasks).await {
            Ok(blocks) => blocks,
            Err(e) => {
                cancel.abort();
                return Err(e);
            }
        };

        let n = profiles.len();
        if let Some((extractor, block)) = self
            .extractors
            .iter()
            .zip(blocks.iter())
            .find(|(_, b)| b.matrix.nrows() != n)
        {
            return Err(FeatureError::ShapeMismatch(format!(
                "{} extractor returned {} rows for {} profiles",
                extractor.name(),
                block.matrix.nrows(),
                n
            )));
        }

        let views: Vec<_> = blocks.iter().map(|b| b.matrix.view()).collect();
        let matrix = concatenate(Axis(1), &views)
            .map_err(|e| FeatureError::ShapeMismatch(e.to_string()))?;
        let coverage = blocks.into_iter().find_map(|b| b.coverage);
        Ok(ExtractorBlock { matrix, coverage })
    }
}

async fn run_extractor(
    extractor: Extractor,
    profiles: Arc<Vec<Profile>>,
    workers: usize,
    hooks: ExtractionHooks,
) -> FeatureResult<ExtractorBlock> {
    match extractor {
        Extractor::Category(category) => {
            let matrix = extract_category_parallel(category, profiles, workers).await?;
            Ok(ExtractorBlock {
                matrix,
                coverage: None,
            })
        }
        Extractor::Embedding(embedding) => {
            let extraction = tokio::task::spawn_blocking(move || {
                embedding.extract_with(&profiles, &hooks)
            })
            .await
            .map_err(|e| FeatureError::Task(e.to_string()))??;
            if !extraction.is_complete() {
                return Err(FeatureError::Aborted {
                    completed: extraction.completed(),
                    total: extraction.total,
                });
            }
            Ok(ExtractorBlock {
                matrix: extraction.matrix,
                coverage: Some(extraction.coverage),
            })
        }
    }
}

/// Splits profiles into at most `workers` contiguous chunks, extracts them on
/// the blocking pool and stitches the rows back in input order.
async fn extract_category_parallel(
    extractor: Arc<CategoryFeatureExtractor>,
    profiles: Arc<Vec<Profile>>,
    workers: usize,
) -> FeatureResult<FeatureMatrix> {
    let n = profiles.len();
    if n == 0 {
        return Ok(FeatureMatrix::zeros((0, extractor.width())));
    }
    let workers = workers.max(1);
    let chunk_size = (n + workers - 1) / workers;
    let handles: Vec<_> = (0..n)
        .step_by(chunk_size)
        .map(|start| {
            let end = (start + chunk_size).min(n);
            let extractor = Arc::clone(&extractor);
            let profiles = Arc::clone(&profiles);
            tokio::task::spawn_blocking(move || extractor.extract(&profiles[start..end]))
        })
        .collect();

    debug!(
        "Category extraction split into {} chunks for {} profiles",
        handles.len(),
        n
    );

    let mut parts = Vec::with_capacity(handles.len());
    for handle in handles {
        let part = handle
            .await
            .map_err(|e| FeatureError::Task(e.to_string()))??;
        parts.push(part);
    }
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| FeatureError::ShapeMismatch(e.to_string()))
}
