// src/models/profile.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A numeric category score as it arrives from upstream, integer counts or
/// already-normalized reals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
}

impl AttributeValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            AttributeValue::Int(v) => *v as f64,
            AttributeValue::Float(v) => *v,
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

/// One user's input: raw text plus named category scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.get(name).copied()
    }
}

/// How much of one profile's text resolved to embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub user_id: String,
    /// Tokens found in the store, duplicates included.
    pub resolvable: usize,
    /// Tokens before filtering, duplicates included.
    pub total: usize,
    pub ratio: f64,
}

impl CoverageRecord {
    pub fn new(user_id: impl Into<String>, resolvable: usize, total: usize) -> Self {
        let ratio = if total == 0 {
            0.0
        } else {
            resolvable as f64 / total as f64
        };
        Self {
            user_id: user_id.into(),
            resolvable,
            total,
            ratio,
        }
    }
}

/// Aggregate coverage diagnostics over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub profiles: usize,
    pub mean_ratio: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub mean_word_count: f64,
}

impl CoverageSummary {
    pub fn from_records(records: &[CoverageRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let mut min_ratio = f64::INFINITY;
        let mut max_ratio = f64::NEG_INFINITY;
        let mut ratio_sum = 0.0;
        let mut words = 0usize;
        for r in records {
            min_ratio = min_ratio.min(r.ratio);
            max_ratio = max_ratio.max(r.ratio);
            ratio_sum += r.ratio;
            words += r.total;
        }
        Some(Self {
            profiles: records.len(),
            mean_ratio: ratio_sum / n,
            min_ratio,
            max_ratio,
            mean_word_count: words as f64 / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_cast() {
        assert_eq!(AttributeValue::Int(3).as_f64(), 3.0);
        assert_eq!(AttributeValue::Float(0.25).as_f64(), 0.25);
    }

    #[test]
    fn test_profile_deserializes_mixed_attributes() {
        let json = r#"{"user_id":"u1","text":"hi there","attributes":{"posemo":4,"negemo":1.5}}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.attribute("posemo"), Some(AttributeValue::Int(4)));
        assert_eq!(profile.attribute("negemo"), Some(AttributeValue::Float(1.5)));

        let bare: Profile = serde_json::from_str(r#"{"user_id":"u2","text":"x"}"#).unwrap();
        assert!(bare.attributes.is_empty());
    }

    #[test]
    fn test_coverage_ratio() {
        let record = CoverageRecord::new("u", 3, 4);
        assert_eq!(record.ratio, 0.75);
        assert!(record.resolvable <= record.total);
    }

    #[test]
    fn test_coverage_summary() {
        let records = vec![CoverageRecord::new("a", 1, 2), CoverageRecord::new("b", 4, 4)];
        let summary = CoverageSummary::from_records(&records).unwrap();
        assert_eq!(summary.profiles, 2);
        assert!((summary.mean_ratio - 0.75).abs() < 1e-12);
        assert_eq!(summary.min_ratio, 0.5);
        assert_eq!(summary.max_ratio, 1.0);
        assert_eq!(summary.mean_word_count, 3.0);
        assert!(CoverageSummary::from_records(&[]).is_none());
    }
}
