// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! The staged analysis run. Every stage takes the previous stage's artifact
//! by reference and returns a new one; nothing is mutated in place.

use crate::config::{AnalysisConfig, ModeConfig};
use crate::provider::TableProvider;
use cod_cluster::{
    ClusterAssignment, ClusterMode, ClusterProfile, ClusterProfiler, Dendrogram, ElbowPoint,
    KMeansResult, agglomerate, elbow_k, kmeans, scaled_points, wcss_curve,
};
use cod_core::{
    CodError, Diagnostics, EntityYear, NormalizedMatrix, RawTable, RowExclusion, Table,
};
use cod_correlate::{CorrelationTable, correlate_each};
use cod_pca::{PcaResult, pca};
use cod_preprocess::{
    DroppedRow, KeyNormalizer, MissingPolicyEngine, PolicyRecord, normalize_composition,
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Key normalization and missing-data policy applied to one dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct IntegratedDataset {
    pub dataset: String,
    pub dropped: Vec<DroppedRow>,
    pub kept_without_code: BTreeSet<String>,
    pub policy: PolicyRecord,
    pub table: Table,
    pub diagnostics: Vec<Diagnostics>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetOutcome {
    Integrated {
        rows: usize,
        dropped: Vec<DroppedRow>,
        policy: PolicyRecord,
    },
    Failed {
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    #[serde(flatten)]
    pub outcome: DatasetOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrimaryReport {
    pub dataset: String,
    pub dropped: Vec<DroppedRow>,
    pub kept_without_code: BTreeSet<String>,
    pub policy: PolicyRecord,
    /// Records left out of the normalized matrix and why.
    pub excluded_rows: Vec<(EntityYear, RowExclusion)>,
}

/// Clustering output for one mode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModeReport {
    pub mode: ClusterMode,
    /// Cluster count actually used, after capping at the number of points.
    pub k: usize,
    pub elbow: Vec<ElbowPoint>,
    pub suggested_k: Option<usize>,
    pub dendrogram: Dendrogram,
    pub hierarchical: ClusterAssignment,
    pub partition: KMeansResult,
    /// Centroid rankings over unscaled cause proportions; observation mode only.
    pub profiles: Vec<ClusterProfile>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub primary: PrimaryReport,
    pub covariates: Vec<DatasetReport>,
    pub matrix: NormalizedMatrix,
    pub correlation: CorrelationTable,
    pub pca: PcaResult,
    pub variable: ModeReport,
    pub observation: ModeReport,
    /// Per-stage diagnostics in execution order.
    pub stages: Vec<Diagnostics>,
}

impl DatasetReport {
    fn failed(dataset: String, err: &CodError) -> Self {
        tracing::warn!(%dataset, error = %err, "covariate table skipped");
        Self {
            dataset,
            outcome: DatasetOutcome::Failed {
                error: err.to_string(),
            },
        }
    }
}

impl AnalysisReport {
    pub fn mode(&self, mode: ClusterMode) -> &ModeReport {
        match mode {
            ClusterMode::Variable => &self.variable,
            ClusterMode::Observation => &self.observation,
        }
    }

    pub fn failed_datasets(&self) -> impl Iterator<Item = &DatasetReport> {
        self.covariates
            .iter()
            .filter(|report| matches!(report.outcome, DatasetOutcome::Failed { .. }))
    }
}

/// Normalizes keys and applies the missing-data policy to one raw table.
pub fn integrate(raw: &RawTable, config: &AnalysisConfig) -> Result<IntegratedDataset, CodError> {
    let normalizer = KeyNormalizer::new(config.exclusions.clone());
    let keyed = normalizer.normalize(raw, config.schema_for(&raw.name))?;
    let engine = MissingPolicyEngine::new(config.missing.clone())?;
    let outcome = engine.apply(&keyed.table)?;
    Ok(IntegratedDataset {
        dataset: raw.name.clone(),
        dropped: keyed.dropped,
        kept_without_code: keyed.kept_without_code,
        policy: outcome.record,
        table: outcome.table,
        diagnostics: vec![keyed.diagnostics, outcome.diagnostics],
    })
}

/// Runs the full analysis over the tables yielded by `provider`.
///
/// Failures on the primary table abort the run. A covariate table that
/// cannot be integrated or correlated, or that repeats an earlier table's
/// name, is reported as failed and left out of the correlation table.
pub fn run_analysis(
    provider: &dyn TableProvider,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, CodError> {
    config.validate()?;
    let mut stages = vec![];

    let raw_primary = provider.primary()?;
    let primary = integrate(&raw_primary, config)?;
    stages.extend(primary.diagnostics);
    tracing::info!(
        dataset = %primary.dataset,
        rows = primary.table.n_rows(),
        "primary table integrated"
    );

    let composition = normalize_composition(&primary.table)?;
    stages.push(composition.diagnostics.clone());
    let matrix = composition.matrix;

    let mut covariate_reports = vec![];
    let mut covariate_tables = vec![];
    let mut report_index = vec![];
    let mut seen = BTreeSet::new();
    for name in provider.covariate_names() {
        let integrated = if seen.insert(name.clone()) {
            provider
                .covariate(&name)
                .and_then(|raw| integrate(&raw, config))
        } else {
            Err(CodError::data_integrity(format!(
                "duplicate covariate table name '{name}'"
            )))
        };
        match integrated {
            Ok(dataset) => {
                stages.extend(dataset.diagnostics);
                report_index.push(covariate_reports.len());
                covariate_reports.push(DatasetReport {
                    dataset: name,
                    outcome: DatasetOutcome::Integrated {
                        rows: dataset.table.n_rows(),
                        dropped: dataset.dropped,
                        policy: dataset.policy,
                    },
                });
                covariate_tables.push(dataset.table);
            }
            Err(err) => covariate_reports.push(DatasetReport::failed(name, &err)),
        }
    }

    let mut correlation = CorrelationTable::empty(matrix.causes().to_vec());
    let mut correlation_diagnostics = Diagnostics::for_stage("correlation");
    let parts = correlate_each(&matrix, &covariate_tables, &config.correlation);
    for (idx, part) in report_index.into_iter().zip(parts) {
        let appended = part.and_then(|part| {
            correlation.append(part.table)?;
            Ok(part.diagnostics)
        });
        match appended {
            Ok(diagnostics) => {
                correlation_diagnostics.rows_in += diagnostics.rows_in;
                correlation_diagnostics.rows_out += diagnostics.rows_out;
                correlation_diagnostics.absorb(diagnostics);
            }
            Err(err) => {
                let report = &mut covariate_reports[idx];
                *report = DatasetReport::failed(std::mem::take(&mut report.dataset), &err);
            }
        }
    }
    stages.push(correlation_diagnostics);

    let pca_result = pca(&matrix, &config.pca)?;
    stages.push(pca_result.diagnostics.clone());

    let variable = cluster_mode(&matrix, ClusterMode::Variable, &config.clustering.variable)?;
    stages.push(variable.diagnostics.clone());
    let observation = cluster_mode(
        &matrix,
        ClusterMode::Observation,
        &config.clustering.observation,
    )?;
    stages.push(observation.diagnostics.clone());

    tracing::info!(
        records = matrix.n_rows(),
        causes = matrix.n_causes(),
        covariates = correlation.covariates().len(),
        "analysis complete"
    );

    Ok(AnalysisReport {
        primary: PrimaryReport {
            dataset: primary.dataset,
            dropped: primary.dropped,
            kept_without_code: primary.kept_without_code,
            policy: primary.policy,
            excluded_rows: composition.excluded,
        },
        covariates: covariate_reports,
        matrix,
        correlation,
        pca: pca_result,
        variable,
        observation,
        stages,
    })
}

/// Hierarchical and partition clustering of `matrix` in one mode.
pub fn cluster_mode(
    matrix: &NormalizedMatrix,
    mode: ClusterMode,
    config: &ModeConfig,
) -> Result<ModeReport, CodError> {
    let points = scaled_points(matrix, mode)?;
    let n = points.n_points();
    let kmeans_config = config.kmeans(n);
    let k = kmeans_config.k;

    let mut diagnostics = Diagnostics::for_stage(match mode {
        ClusterMode::Variable => "clustering_variable",
        ClusterMode::Observation => "clustering_observation",
    });
    diagnostics.rows_in = n;
    diagnostics.rows_out = n;
    diagnostics.seed = Some(config.seed);
    if k < config.k {
        diagnostics.note(format!(
            "k capped at {k}: only {n} {} points",
            mode.as_str()
        ));
    }

    let dendrogram = agglomerate(&points, config.linkage)?;
    let hierarchical = dendrogram.cut(k)?;

    let elbow = if config.elbow_min_k <= n {
        wcss_curve(
            &points,
            config.elbow_min_k..=config.elbow_max_k,
            &kmeans_config,
        )?
    } else {
        vec![]
    };
    let suggested_k = elbow_k(&elbow);
    if let Some(suggested) = suggested_k {
        diagnostics.note(format!("elbow heuristic suggests k={suggested}"));
    }

    let partition = kmeans(&points, &kmeans_config)?;
    diagnostics.absorb(partition.diagnostics.clone());

    let profiles = match mode {
        ClusterMode::Observation => {
            ClusterProfiler::new(&matrix.to_record_points(), &partition.assignment)?.report()?
        }
        ClusterMode::Variable => vec![],
    };

    tracing::info!(
        mode = mode.as_str(),
        k,
        suggested_k = ?suggested_k,
        inertia = partition.inertia,
        "clustering complete"
    );

    Ok(ModeReport {
        mode,
        k,
        elbow,
        suggested_k,
        dendrogram,
        hierarchical,
        partition,
        profiles,
        diagnostics,
    })
}
