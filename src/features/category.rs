// src/features/category.rs
use log::debug;
use ndarray::Array2;
use std::collections::HashSet;

use crate::error::{FeatureError, FeatureResult};
use crate::features::FeatureMatrix;
use crate::models::Profile;

/// One column of the category schema.
#[derive(Debug, Clone)]
struct CategoryAccessor {
    name: String,
}

impl CategoryAccessor {
    fn read(&self, profile: &Profile) -> FeatureResult<f64> {
        profile
            .attribute(&self.name)
            .map(|value| value.as_f64())
            .ok_or_else(|| FeatureError::MissingAttribute {
                user_id: profile.user_id.clone(),
                attribute: self.name.clone(),
            })
    }
}

/// Copies named category scores out of each profile, one column per name.
///
/// The schema is validated once here, so extraction never has to guess
/// which attributes exist.
#[derive(Debug, Clone)]
pub struct CategoryFeatureExtractor {
    accessors: Vec<CategoryAccessor>,
}

impl CategoryFeatureExtractor {
    pub fn new<I, S>(schema: I) -> FeatureResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut accessors = Vec::new();
        for name in schema {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(FeatureError::InvalidSchema(
                    "category names must not be blank".to_string(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(FeatureError::InvalidSchema(format!(
                    "category '{}' appears more than once",
                    name
                )));
            }
            accessors.push(CategoryAccessor { name });
        }
        if accessors.is_empty() {
            return Err(FeatureError::InvalidSchema(
                "schema must name at least one category".to_string(),
            ));
        }
        Ok(Self { accessors })
    }

    /// Number of output columns, fixed at construction.
    pub fn width(&self) -> usize {
        self.accessors.len()
    }

    pub fn schema(&self) -> Vec<&str> {
        self.accessors.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn extract_row(&self, profile: &Profile) -> FeatureResult<Vec<f64>> {
        self.accessors.iter().map(|a| a.read(profile)).collect()
    }

    /// One row per profile, columns in schema order.
    pub fn extract(&self, profiles: &[Profile]) -> FeatureResult<FeatureMatrix> {
        let width = self.width();
        let mut values = Vec::with_capacity(profiles.len() * width);
        for profile in profiles {
            values.extend(self.extract_row(profile)?);
        }
        debug!(
            "Extracted {} category columns for {} profiles",
            width,
            profiles.len()
        );
        Array2::from_shape_vec((profiles.len(), width), values)
            .map_err(|e| FeatureError::ShapeMismatch(e.to_string()))
    }
}
