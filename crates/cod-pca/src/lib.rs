// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Principal component analysis of a normalized cause matrix.
//!
//! Columns are centered and scaled to unit variance, so the decomposition is
//! of the correlation matrix. Loadings are correlations between each original
//! variable and each component.

use cod_core::{CodError, Diagnostics, EntityYear, NormalizedMatrix, mean, non_constant_std};
use nalgebra::{DMatrix, SymmetricEigen};
use std::cmp::Ordering;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PcaConfig {
    /// Number of leading components to report; `None` reports all.
    pub n_components: Option<usize>,
}

impl PcaConfig {
    pub fn validate(&self) -> Result<(), CodError> {
        if matches!(self.n_components, Some(0)) {
            return Err(CodError::invalid_input(
                "PcaConfig.n_components must be >= 1 when provided; got 0",
            ));
        }
        Ok(())
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub eigenvalue: f64,
    pub variance_share: f64,
    pub cumulative_share: f64,
    /// One loading per retained variable, in `PcaResult::variables` order.
    pub loadings: Vec<f64>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PcaResult {
    pub variables: Vec<String>,
    /// Constant columns left out of the decomposition.
    pub excluded_constant: Vec<String>,
    pub components: Vec<Component>,
    pub keys: Vec<EntityYear>,
    /// Row-major scores: one row per record, one column per reported component.
    pub scores: Vec<f64>,
    pub diagnostics: Diagnostics,
}

impl PcaResult {
    pub fn loading(&self, variable: &str, component: usize) -> Option<f64> {
        let idx = self.variables.iter().position(|v| v == variable)?;
        self.components.get(component)?.loadings.get(idx).copied()
    }

    pub fn scores_row(&self, row: usize) -> &[f64] {
        let k = self.components.len();
        &self.scores[row * k..(row + 1) * k]
    }
}

/// Decomposes `matrix` into ordered principal components.
pub fn pca(matrix: &NormalizedMatrix, config: &PcaConfig) -> Result<PcaResult, CodError> {
    config.validate()?;
    let n = matrix.n_rows();
    if n < 2 {
        return Err(CodError::invalid_input(format!(
            "PCA requires at least 2 records; got {n}"
        )));
    }
    let mut diagnostics = Diagnostics::for_stage("pca");
    diagnostics.rows_in = n;

    let mut variables = vec![];
    let mut excluded_constant = vec![];
    let mut standardized: Vec<Vec<f64>> = vec![];
    for (col, cause) in matrix.causes().iter().enumerate() {
        let values = matrix.column(col);
        let Some(mu) = mean(&values) else {
            continue;
        };
        let Some(sd) = non_constant_std(&values) else {
            diagnostics.note(format!("excluded constant column '{cause}'"));
            excluded_constant.push(cause.clone());
            continue;
        };
        variables.push(cause.clone());
        standardized.push(values.iter().map(|v| (v - mu) / sd).collect());
    }
    if variables.is_empty() {
        return Err(CodError::invalid_input(
            "PCA requires at least one non-constant column",
        ));
    }

    let p = variables.len();
    let z = DMatrix::from_fn(n, p, |row, col| standardized[col][row]);
    let correlation = (z.transpose() * &z) / (n as f64 - 1.0);
    let eigen = SymmetricEigen::new(correlation);

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let eigenvalues: Vec<f64> = order
        .iter()
        .map(|&idx| eigen.eigenvalues[idx].max(0.0))
        .collect();
    let total: f64 = eigenvalues.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(CodError::numerical_issue(format!(
            "correlation matrix has non-positive trace {total}"
        )));
    }

    let reported = config.n_components.unwrap_or(p).min(p);
    let mut components = Vec::with_capacity(reported);
    let mut directions = Vec::with_capacity(reported);
    let mut cumulative = 0.0;
    for (rank, &idx) in order.iter().take(reported).enumerate() {
        let mut vector: Vec<f64> = eigen.eigenvectors.column(idx).iter().copied().collect();
        orient(&mut vector);
        let eigenvalue = eigenvalues[rank];
        let variance_share = eigenvalue / total;
        cumulative += variance_share;
        components.push(Component {
            eigenvalue,
            variance_share,
            cumulative_share: cumulative.min(1.0),
            loadings: vector.iter().map(|v| v * eigenvalue.sqrt()).collect(),
        });
        directions.push(vector);
    }

    let mut scores = Vec::with_capacity(n * reported);
    for row in 0..n {
        for direction in &directions {
            scores.push((0..p).map(|col| z[(row, col)] * direction[col]).sum());
        }
    }

    diagnostics.rows_out = n;
    tracing::info!(
        variables = p,
        reported,
        leading_share = components.first().map_or(0.0, |c| c.variance_share),
        "pca complete"
    );

    Ok(PcaResult {
        variables,
        excluded_constant,
        components,
        keys: matrix.keys().to_vec(),
        scores,
        diagnostics,
    })
}

/// Flips `vector` so its largest-magnitude entry is positive.
fn orient(vector: &mut [f64]) {
    let pivot = vector
        .iter()
        .enumerate()
        .max_by(|a, b| {
            a.1.abs()
                .partial_cmp(&b.1.abs())
                .unwrap_or(Ordering::Equal)
                .then(b.0.cmp(&a.0))
        })
        .map(|(idx, _)| idx);
    if let Some(idx) = pivot {
        if vector[idx] < 0.0 {
            vector.iter_mut().for_each(|v| *v = -*v);
        }
    }
}
