// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_cluster::{KMeansConfig, Linkage};
use cod_core::CodError;
use cod_correlate::CorrelationConfig;
use cod_pca::PcaConfig;
use cod_preprocess::{ExclusionList, MissingPolicyConfig, SchemaSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_VARIABLE_K: usize = 5;
const DEFAULT_OBSERVATION_K: usize = 6;
const DEFAULT_RESTARTS: usize = 100;
const DEFAULT_MAX_ITERATIONS: usize = 300;
const DEFAULT_SEED: u64 = 0;
const DEFAULT_ELBOW_MIN_K: usize = 2;
const DEFAULT_ELBOW_MAX_K: usize = 10;

/// Clustering parameters for one mode. Fields left out of a partially
/// specified mode take their values from [`ModeConfig::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub k: usize,
    pub linkage: Linkage,
    pub restarts: usize,
    pub max_iterations: usize,
    pub seed: u64,
    pub elbow_min_k: usize,
    pub elbow_max_k: usize,
}

impl ModeConfig {
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            linkage: Linkage::default(),
            restarts: DEFAULT_RESTARTS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: DEFAULT_SEED,
            elbow_min_k: DEFAULT_ELBOW_MIN_K,
            elbow_max_k: DEFAULT_ELBOW_MAX_K,
        }
    }

    /// k-means parameters with `k` capped at `n_points`.
    pub fn kmeans(&self, n_points: usize) -> KMeansConfig {
        KMeansConfig {
            k: self.k.min(n_points),
            restarts: self.restarts,
            max_iterations: self.max_iterations,
            seed: self.seed,
        }
    }

    pub fn validate(&self, mode: &str) -> Result<(), CodError> {
        if self.k == 0 {
            return Err(CodError::invalid_input(format!(
                "clustering.{mode}.k must be >= 1; got 0"
            )));
        }
        if self.restarts == 0 || self.max_iterations == 0 {
            return Err(CodError::invalid_input(format!(
                "clustering.{mode}.restarts and max_iterations must be >= 1; got {} and {}",
                self.restarts, self.max_iterations
            )));
        }
        if self.elbow_min_k == 0 || self.elbow_min_k > self.elbow_max_k {
            return Err(CodError::invalid_input(format!(
                "clustering.{mode} elbow range must satisfy 1 <= min <= max; got {}..={}",
                self.elbow_min_k, self.elbow_max_k
            )));
        }
        Ok(())
    }
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self::with_k(DEFAULT_OBSERVATION_K)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Causes as points.
    pub variable: ModeConfig,
    /// Records as points.
    pub observation: ModeConfig,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            variable: ModeConfig::with_k(DEFAULT_VARIABLE_K),
            observation: ModeConfig::with_k(DEFAULT_OBSERVATION_K),
        }
    }
}

/// Everything one analysis run is parameterized by.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub exclusions: ExclusionList,
    /// Expected columns and category mapping, keyed by dataset name.
    pub schemas: BTreeMap<String, SchemaSpec>,
    pub missing: MissingPolicyConfig,
    pub correlation: CorrelationConfig,
    pub pca: PcaConfig,
    pub clustering: ClusteringConfig,
}

impl AnalysisConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, CodError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| CodError::invalid_input(format!("invalid analysis config JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CodError> {
        self.missing.validate()?;
        self.correlation.validate()?;
        self.pca.validate()?;
        self.clustering.variable.validate("variable")?;
        self.clustering.observation.validate("observation")?;
        Ok(())
    }

    pub fn schema_for(&self, dataset: &str) -> Option<&SchemaSpec> {
        self.schemas.get(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::AnalysisConfig;
    use cod_cluster::Linkage;

    #[test]
    fn empty_json_yields_documented_defaults() {
        let config = AnalysisConfig::from_json_str("{}").expect("empty config should parse");
        assert_eq!(config.clustering.variable.k, 5);
        assert_eq!(config.clustering.observation.k, 6);
        assert_eq!(config.clustering.observation.restarts, 100);
        assert_eq!(config.clustering.variable.linkage, Linkage::Ward);
        assert_eq!(config.correlation.min_join_rows, 10);
        assert_eq!(config.missing.acceptable_row_loss, 0.05);
        assert_eq!(config.missing.column_drop_disparity_ratio, 10.0);
        assert_eq!(config.pca.n_components, None);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let raw = r#"{
            "exclusions": { "aggregates": ["World"], "dissolved": ["USSR"] },
            "schemas": {
                "deaths": {
                    "expected_columns": ["Stroke", "Malaria", "Cholera"],
                    "categories": [
                        { "name": "Stroke", "sources": ["Stroke"] },
                        { "name": "Infectious", "sources": ["Malaria", "Cholera"] }
                    ]
                }
            },
            "missing": { "acceptable_row_loss": 0.1 },
            "clustering": { "observation": { "k": 4, "linkage": "average", "seed": 7 } }
        }"#;
        let config = AnalysisConfig::from_json_str(raw).expect("config should parse");
        assert!(config.exclusions.aggregates.contains("World"));
        assert!(config.exclusions.subdivisions.is_empty());
        let schema = config.schema_for("deaths").expect("schema present");
        assert_eq!(schema.categories[1].sources.len(), 2);
        assert_eq!(config.missing.acceptable_row_loss, 0.1);
        assert_eq!(config.missing.informative_alpha, 0.01);
        assert_eq!(config.clustering.observation.k, 4);
        assert_eq!(config.clustering.observation.linkage, Linkage::Average);
        assert_eq!(config.clustering.observation.restarts, 100);
        assert_eq!(config.clustering.variable.k, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = AnalysisConfig::from_json_str(r#"{ "clustering": { "variable": { "k": 0 } } }"#)
            .expect_err("k = 0 is invalid");
        assert!(err.to_string().contains("clustering.variable.k"));
        assert!(AnalysisConfig::from_json_str(r#"{ "correlation": { "min_join_rows": 1 } }"#).is_err());
        assert!(AnalysisConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn kmeans_config_caps_k_at_point_count() {
        let config = AnalysisConfig::default();
        assert_eq!(config.clustering.observation.kmeans(3).k, 3);
        assert_eq!(config.clustering.observation.kmeans(50).k, 6);
    }
}
