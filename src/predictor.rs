// src/predictor.rs
use log::{debug, info};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::{FeatureError, FeatureResult};
use crate::estimator::{DecisionTreeAdapter, DecisionTreeModel, ParamSet};
use crate::features::FeaturePipeline;
use crate::models::Profile;

/// Trait name → predicted score for one profile.
pub type TraitScores = BTreeMap<String, f64>;

/// A fitted feature pipeline plus one fitted regression tree per trait.
/// This is what a serving layer holds to answer personality queries.
pub struct TraitPredictor {
    pipeline: FeaturePipeline,
    models: BTreeMap<String, DecisionTreeModel>,
}

impl TraitPredictor {
    /// Fits `pipeline` on `profiles`, then trains one model per trait on the
    /// resulting features. Every label vector must align with `profiles`.
    pub async fn train(
        mut pipeline: FeaturePipeline,
        profiles: &[Profile],
        labels: &BTreeMap<String, Vec<f64>>,
        adapter: &DecisionTreeAdapter,
        params: &ParamSet,
    ) -> FeatureResult<Self> {
        if labels.is_empty() {
            return Err(FeatureError::InvalidConfig(
                "at least one trait label set is required".to_string(),
            ));
        }
        for (trait_name, values) in labels {
            if values.len() != profiles.len() {
                return Err(FeatureError::LabelMismatch {
                    trait_name: trait_name.clone(),
                    expected: profiles.len(),
                    got: values.len(),
                });
            }
        }

        let start = Instant::now();
        let output = pipeline.fit_transform(profiles).await?;
        let mut models = BTreeMap::new();
        for (trait_name, values) in labels {
            let mut model = adapter.build(params)?;
            model.fit(&output.matrix, values)?;
            debug!("Trained {} model for trait '{}'", adapter.name(), trait_name);
            models.insert(trait_name.clone(), model);
        }
        info!(
            "Trained {} trait models on {} profiles in {:.2?}",
            models.len(),
            profiles.len(),
            start.elapsed()
        );
        Ok(Self { pipeline, models })
    }

    pub fn traits(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub async fn predict(&self, profile: &Profile) -> FeatureResult<TraitScores> {
        let mut rows = self.predict_batch(std::slice::from_ref(profile)).await?;
        rows.pop().ok_or_else(|| {
            FeatureError::ShapeMismatch(format!("no prediction row for {}", profile.user_id))
        })
    }

    /// One score map per input profile, in input order. Any extraction
    /// failure fails the whole call.
    pub async fn predict_batch(&self, profiles: &[Profile]) -> FeatureResult<Vec<TraitScores>> {
        let output = self.pipeline.transform(profiles).await?;
        let mut rows = vec![TraitScores::new(); profiles.len()];
        for (trait_name, model) in &self.models {
            let scores = model.predict(&output.matrix)?;
            if scores.len() != rows.len() {
                return Err(FeatureError::ShapeMismatch(format!(
                    "model for '{}' returned {} scores for {} profiles",
                    trait_name,
                    scores.len(),
                    rows.len()
                )));
            }
            for (row, score) in rows.iter_mut().zip(scores) {
                row.insert(trait_name.clone(), score);
            }
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for TraitPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitPredictor")
            .field("width", &self.pipeline.width())
            .field("models", &self.models)
            .finish()
    }
}
