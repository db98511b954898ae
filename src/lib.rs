// src/lib.rs
pub mod error;
pub mod estimator;
pub mod features;
pub mod models;
pub mod predictor;
pub mod store;
pub mod utils;

pub use error::{FeatureError, FeatureResult};
pub use features::{FeatureMatrix, FeaturePipeline};
pub use models::{CoverageRecord, Profile};
pub use predictor::TraitPredictor;
