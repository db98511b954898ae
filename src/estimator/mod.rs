// src/estimator/mod.rs
//! Adapters between the feature matrix and the trait regression models.

pub mod decision_tree;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use decision_tree::{DecisionTreeAdapter, DecisionTreeModel};

/// One candidate hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Parameter name → finite list of candidates, for an external search.
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// A single chosen combination from a [`ParamGrid`].
pub type ParamSet = BTreeMap<String, ParamValue>;
