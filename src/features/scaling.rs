// src/features/scaling.rs
use log::debug;
use ndarray::{Array1, Axis};
use std::sync::Arc;

use crate::error::{FeatureError, FeatureResult};
use crate::features::FeatureMatrix;

// Columns with a standard deviation below this are treated as constant.
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// A transform with nothing to learn.
pub trait StatelessTransform: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, matrix: FeatureMatrix) -> FeatureResult<FeatureMatrix>;
}

/// A transform whose parameters come from training data.
pub trait FittableTransform: Send + Sync {
    fn name(&self) -> &str;
    /// Learns parameters from `matrix`, replacing any earlier fit.
    fn fit(&mut self, matrix: &FeatureMatrix) -> FeatureResult<()>;
    fn is_fitted(&self) -> bool;
    fn transform(&self, matrix: FeatureMatrix) -> FeatureResult<FeatureMatrix>;
}

/// A post-extraction stage. The variant tells the pipeline whether the
/// stage has to see training data before it can transform.
pub enum TransformStage {
    Stateless(Box<dyn StatelessTransform>),
    Fittable(Box<dyn FittableTransform>),
}

impl TransformStage {
    pub fn name(&self) -> &str {
        match self {
            TransformStage::Stateless(t) => t.name(),
            TransformStage::Fittable(t) => t.name(),
        }
    }

    pub fn requires_fit(&self) -> bool {
        matches!(self, TransformStage::Fittable(_))
    }

    pub fn is_ready(&self) -> bool {
        match self {
            TransformStage::Stateless(_) => true,
            TransformStage::Fittable(t) => t.is_fitted(),
        }
    }

    pub(crate) fn fit(&mut self, matrix: &FeatureMatrix) -> FeatureResult<()> {
        match self {
            TransformStage::Stateless(_) => Ok(()),
            TransformStage::Fittable(t) => t.fit(matrix),
        }
    }

    pub(crate) fn apply(&self, matrix: FeatureMatrix) -> FeatureResult<FeatureMatrix> {
        match self {
            TransformStage::Stateless(t) => t.apply(matrix),
            TransformStage::Fittable(t) => t.transform(matrix),
        }
    }
}

impl std::fmt::Debug for TransformStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStage::Stateless(t) => write!(f, "Stateless({})", t.name()),
            TransformStage::Fittable(t) => write!(f, "Fittable({})", t.name()),
        }
    }
}

type MatrixFn = Arc<dyn Fn(FeatureMatrix) -> FeatureResult<FeatureMatrix> + Send + Sync>;

/// Wraps a plain function as a stateless stage.
#[derive(Clone)]
pub struct FunctionTransform {
    name: String,
    func: MatrixFn,
}

impl FunctionTransform {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(FeatureMatrix) -> FeatureResult<FeatureMatrix> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl StatelessTransform for FunctionTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, matrix: FeatureMatrix) -> FeatureResult<FeatureMatrix> {
        (self.func)(matrix)
    }
}

/// Per-column standardization: `(x - mean) / std`, population std.
/// Constant columns keep a scale of 1 and therefore map to 0.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }
}

impl FittableTransform for StandardScaler {
    fn name(&self) -> &str {
        "standard_scaler"
    }

    fn fit(&mut self, matrix: &FeatureMatrix) -> FeatureResult<()> {
        let mean = matrix.mean_axis(Axis(0)).ok_or_else(|| {
            FeatureError::ShapeMismatch("cannot fit a scaler on zero rows".to_string())
        })?;
        let scale = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < MIN_SCALE { 1.0 } else { s });
        debug!("Fitted standard scaler on {} x {} matrix", matrix.nrows(), matrix.ncols());
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.scale.is_some()
    }

    fn transform(&self, matrix: FeatureMatrix) -> FeatureResult<FeatureMatrix> {
        let (mean, scale) = match (&self.mean, &self.scale) {
            (Some(mean), Some(scale)) => (mean, scale),
            _ => {
                return Err(FeatureError::NotFitted {
                    stage: self.name().to_string(),
                })
            }
        };
        if matrix.ncols() != mean.len() {
            return Err(FeatureError::ShapeMismatch(format!(
                "scaler fitted on {} columns, got {}",
                mean.len(),
                matrix.ncols()
            )));
        }
        let mut out = matrix;
        out -= mean;
        out /= scale;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scaler_standardizes_columns() {
        let data = array![[1.0, 10.0, 5.0], [3.0, 30.0, 5.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(&data).unwrap();
        assert_eq!(scaler.mean().unwrap().to_vec(), vec![2.0, 20.0, 5.0]);
        assert_eq!(scaler.scale().unwrap().to_vec(), vec![1.0, 10.0, 1.0]);

        let out = scaler.transform(data).unwrap();
        assert_eq!(out, array![[-1.0, -1.0, 0.0], [1.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_transform_before_fit() {
        let scaler = StandardScaler::new();
        let err = scaler.transform(array![[1.0]]).unwrap_err();
        assert!(matches!(err, FeatureError::NotFitted { .. }));
    }

    #[test]
    fn test_refit_overwrites() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[0.0], [2.0]]).unwrap();
        scaler.fit(&array![[10.0], [14.0]]).unwrap();
        assert_eq!(scaler.mean().unwrap().to_vec(), vec![12.0]);
        assert_eq!(scaler.scale().unwrap().to_vec(), vec![2.0]);
    }

    #[test]
    fn test_column_mismatch() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[0.0, 1.0], [2.0, 3.0]]).unwrap();
        assert!(matches!(
            scaler.transform(array![[1.0]]),
            Err(FeatureError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_fit_on_empty_fails() {
        let mut scaler = StandardScaler::new();
        assert!(scaler.fit(&FeatureMatrix::zeros((0, 3))).is_err());
        assert!(!scaler.is_fitted());
    }

    #[test]
    fn test_stage_variants() {
        let stateless = TransformStage::Stateless(Box::new(FunctionTransform::new("double", |m| {
            Ok(m * 2.0)
        })));
        assert!(!stateless.requires_fit());
        assert!(stateless.is_ready());
        assert_eq!(stateless.apply(array![[1.5]]).unwrap(), array![[3.0]]);

        let mut fittable = TransformStage::Fittable(Box::new(StandardScaler::new()));
        assert!(fittable.requires_fit());
        assert!(!fittable.is_ready());
        fittable.fit(&array![[1.0], [3.0]]).unwrap();
        assert!(fittable.is_ready());
        assert_eq!(fittable.name(), "standard_scaler");
    }
}
