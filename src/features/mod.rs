// src/features/mod.rs
//! Profile → feature matrix extraction.
//!
//! Two feature families feed the trait models: category scores copied from
//! profile attributes, and pooled word-embedding statistics computed from
//! the profile text. [`pipeline::FeaturePipeline`] joins them column-wise
//! and applies optional scaling.

pub mod category;
pub mod embedding;
pub mod pipeline;
pub mod scaling;
pub mod tokenizer;

/// Rows align 1:1 with the input profiles.
pub type FeatureMatrix = ndarray::Array2<f64>;

pub use category::CategoryFeatureExtractor;
pub use embedding::{EmbeddingExtraction, EmbeddingFeatureExtractor};
pub use pipeline::{Extractor, FeaturePipeline, FeaturePipelineBuilder, Parallelism, PipelineOutput};
pub use scaling::{FittableTransform, FunctionTransform, StandardScaler, StatelessTransform, TransformStage};
pub use tokenizer::Tokenizer;
