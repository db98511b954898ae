// src/estimator/decision_tree.rs
use log::debug;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::{ParamGrid, ParamSet, ParamValue};
use crate::error::{FeatureError, FeatureResult};
use crate::features::FeatureMatrix;

type Regressor = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Supplies the default search space for a regression tree and builds
/// untrained trees for one parameter combination. Searching and
/// cross-validation are left to the caller.
#[derive(Debug, Clone)]
pub struct DecisionTreeAdapter {
    grid: ParamGrid,
}

impl Default for DecisionTreeAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DecisionTreeAdapter {
    pub fn new(grid: Option<ParamGrid>) -> Self {
        Self {
            grid: grid.unwrap_or_else(Self::default_search_space),
        }
    }

    pub fn name(&self) -> &'static str {
        "DecisionTree"
    }

    pub fn default_search_space() -> ParamGrid {
        let mut grid = ParamGrid::new();
        grid.insert("criterion".to_string(), vec![ParamValue::Text("mse".to_string())]);
        grid.insert("splitter".to_string(), vec![ParamValue::Text("best".to_string())]);
        grid.insert("max_depth".to_string(), vec![ParamValue::Int(10)]);
        grid.insert("min_samples_split".to_string(), vec![ParamValue::Int(2)]);
        grid.insert("min_samples_leaf".to_string(), vec![ParamValue::Int(1)]);
        grid.insert("random_state".to_string(), vec![ParamValue::Int(0)]);
        grid
    }

    pub fn search_space(&self) -> &ParamGrid {
        &self.grid
    }

    /// A fresh, untrained tree configured by `params`. Parameters left out
    /// keep the regressor's defaults.
    pub fn build(&self, params: &ParamSet) -> FeatureResult<DecisionTreeModel> {
        let mut parameters = DecisionTreeRegressorParameters::default();
        let mut random_state = None;
        for (name, value) in params {
            match name.as_str() {
                "criterion" => match value.as_text() {
                    Some("mse") | Some("squared_error") => {}
                    _ => return Err(invalid(name, "only mean squared error is supported")),
                },
                "splitter" => match value.as_text() {
                    Some("best") => {}
                    _ => return Err(invalid(name, "only the 'best' splitter is supported")),
                },
                "max_depth" => {
                    let depth = positive_int(name, value)?;
                    let depth = u16::try_from(depth).map_err(|_| invalid(name, "too large"))?;
                    parameters = parameters.with_max_depth(depth);
                }
                "min_samples_split" => {
                    let n = positive_int(name, value)?;
                    if n < 2 {
                        return Err(invalid(name, "must be at least 2"));
                    }
                    parameters = parameters.with_min_samples_split(n as usize);
                }
                "min_samples_leaf" => {
                    parameters = parameters.with_min_samples_leaf(positive_int(name, value)? as usize);
                }
                "random_state" => {
                    let seed = value
                        .as_int()
                        .filter(|s| *s >= 0)
                        .ok_or_else(|| invalid(name, "expected a non-negative integer"))?;
                    random_state = Some(seed as u64);
                }
                _ => return Err(invalid(name, "unknown decision tree parameter")),
            }
        }
        debug!("Built decision tree with {:?}", parameters);
        Ok(DecisionTreeModel {
            parameters,
            random_state,
            fitted: None,
        })
    }
}

fn invalid(name: &str, reason: &str) -> FeatureError {
    FeatureError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn positive_int(name: &str, value: &ParamValue) -> FeatureResult<i64> {
    value
        .as_int()
        .filter(|v| *v >= 1)
        .ok_or_else(|| invalid(name, "expected a positive integer"))
}

fn to_dense(matrix: &FeatureMatrix) -> DenseMatrix<f64> {
    let rows: Vec<Vec<f64>> = matrix.rows().into_iter().map(|r| r.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows)
}

/// One regression tree, untrained until [`fit`](Self::fit) succeeds.
pub struct DecisionTreeModel {
    parameters: DecisionTreeRegressorParameters,
    // The best-split search is deterministic, so the seed is only recorded.
    random_state: Option<u64>,
    fitted: Option<Regressor>,
}

impl DecisionTreeModel {
    pub fn parameters(&self) -> &DecisionTreeRegressorParameters {
        &self.parameters
    }

    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> FeatureResult<()> {
        if x.nrows() == 0 {
            return Err(FeatureError::ShapeMismatch(
                "cannot fit a tree on zero rows".to_string(),
            ));
        }
        if x.nrows() != y.len() {
            return Err(FeatureError::ShapeMismatch(format!(
                "{} feature rows but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        let dense = to_dense(x);
        let model = Regressor::fit(&dense, &y.to_vec(), self.parameters.clone())
            .map_err(|e| FeatureError::Model(e.to_string()))?;
        self.fitted = Some(model);
        Ok(())
    }

    pub fn predict(&self, x: &FeatureMatrix) -> FeatureResult<Vec<f64>> {
        let model = self.fitted.as_ref().ok_or_else(|| FeatureError::NotFitted {
            stage: "decision_tree".to_string(),
        })?;
        if x.nrows() == 0 {
            return Ok(Vec::new());
        }
        model
            .predict(&to_dense(x))
            .map_err(|e| FeatureError::Model(e.to_string()))
    }
}

impl std::fmt::Debug for DecisionTreeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionTreeModel")
            .field("parameters", &self.parameters)
            .field("random_state", &self.random_state)
            .field("fitted", &self.is_fitted())
            .finish()
    }
}
