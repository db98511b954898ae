pub mod profile;

pub use profile::{AttributeValue, CoverageRecord, CoverageSummary, Profile};
