// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Joins covariate tables against a normalized cause matrix on the
//! (Entity, Year) key and reports Pearson coefficients per (cause, covariate).

use cod_core::{CodError, Diagnostics, NormalizedMatrix, Table, Warning, pearson};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

const DEFAULT_MIN_JOIN_ROWS: usize = 10;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// Pairs matched on fewer rows are reported as insufficient data.
    pub min_join_rows: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            min_join_rows: DEFAULT_MIN_JOIN_ROWS,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), CodError> {
        if self.min_join_rows < 2 {
            return Err(CodError::invalid_input(format!(
                "CorrelationConfig.min_join_rows must be >= 2; got {}",
                self.min_join_rows
            )));
        }
        Ok(())
    }
}

/// Correlation of one (cause, covariate) pair.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Coefficient {
    /// Pearson r in `[-1, 1]` over `matched` rows.
    Value { r: f64, matched: usize },
    /// Too few matched rows to compute a stable coefficient.
    InsufficientData { matched: usize, required: usize },
    /// Enough rows, but one side is constant so r is undefined.
    ZeroVariance { matched: usize },
}

impl Coefficient {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value { r, .. } => Some(*r),
            _ => None,
        }
    }

    pub fn matched(&self) -> usize {
        match self {
            Self::Value { matched, .. }
            | Self::InsufficientData { matched, .. }
            | Self::ZeroVariance { matched } => *matched,
        }
    }
}

/// One covariate column and its join coverage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CovariateColumn {
    pub dataset: String,
    pub column: String,
    /// Covariate rows whose key is present in the cause matrix.
    pub joined_rows: usize,
    /// Joined rows where the covariate value is present.
    pub matched_rows: usize,
}

impl CovariateColumn {
    /// Label used to address the column: `dataset/column`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.dataset, self.column)
    }
}

/// Cause-by-covariate coefficient matrix.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationTable {
    causes: Vec<String>,
    covariates: Vec<CovariateColumn>,
    /// Covariate-major: all causes for covariate 0, then covariate 1, ...
    cells: Vec<Coefficient>,
}

impl CorrelationTable {
    pub fn empty(causes: Vec<String>) -> Self {
        Self {
            causes,
            covariates: vec![],
            cells: vec![],
        }
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    pub fn covariates(&self) -> &[CovariateColumn] {
        &self.covariates
    }

    pub fn get(&self, cause: &str, covariate_label: &str) -> Option<&Coefficient> {
        let row = self.causes.iter().position(|c| c == cause)?;
        let col = self
            .covariates
            .iter()
            .position(|c| c.label() == covariate_label)?;
        self.cells.get(col * self.causes.len() + row)
    }

    /// Coefficients for every cause against one covariate column.
    pub fn covariate_column(&self, covariate_label: &str) -> Option<&[Coefficient]> {
        let col = self
            .covariates
            .iter()
            .position(|c| c.label() == covariate_label)?;
        let d = self.causes.len();
        Some(&self.cells[col * d..(col + 1) * d])
    }

    /// Long-format view: (cause, covariate, coefficient).
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CovariateColumn, &Coefficient)> {
        let d = self.causes.len();
        self.cells.iter().enumerate().map(move |(idx, coefficient)| {
            (
                self.causes[idx % d].as_str(),
                &self.covariates[idx / d],
                coefficient,
            )
        })
    }

    /// Covariates with a numeric coefficient for `cause`, strongest |r| first.
    pub fn top_covariates(&self, cause: &str, limit: usize) -> Vec<(&CovariateColumn, f64)> {
        let mut ranked: Vec<(&CovariateColumn, f64)> = self
            .entries()
            .filter(|(name, _, _)| *name == cause)
            .filter_map(|(_, covariate, coefficient)| Some((covariate, coefficient.value()?)))
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked.truncate(limit);
        ranked
    }

    /// Appends the columns of `other`, which must share this table's causes
    /// and add no label already present. On error `self` is left unchanged.
    pub fn append(&mut self, other: CorrelationTable) -> Result<(), CodError> {
        if self.causes != other.causes {
            return Err(CodError::invalid_input(
                "cannot concatenate correlation tables over different causes",
            ));
        }
        for covariate in &other.covariates {
            if self.covariates.iter().any(|c| c.label() == covariate.label()) {
                return Err(CodError::invalid_input(format!(
                    "duplicate covariate column '{}'",
                    covariate.label()
                )));
            }
        }
        self.covariates.extend(other.covariates);
        self.cells.extend(other.cells);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Correlation {
    pub table: CorrelationTable,
    pub diagnostics: Diagnostics,
}

/// Correlates every value column of `covariates` with every cause of `matrix`.
///
/// Each column is inner-joined on (Entity, Year) independently; rows where
/// the covariate is missing are skipped for that column only.
pub fn correlate(
    matrix: &NormalizedMatrix,
    covariates: &Table,
    config: &CorrelationConfig,
) -> Result<Correlation, CodError> {
    config.validate()?;
    let mut diagnostics = Diagnostics::for_stage("correlation");
    diagnostics.rows_in = covariates.n_rows();

    let joined: Vec<(usize, usize)> = covariates
        .keys()
        .iter()
        .enumerate()
        .filter_map(|(cov_row, key)| Some((cov_row, matrix.row_index(key)?)))
        .collect();
    diagnostics.rows_out = joined.len();
    diagnostics.note(format!(
        "'{}': {} of {} rows joined",
        covariates.name(),
        joined.len(),
        covariates.n_rows()
    ));

    let mut table = CorrelationTable::empty(matrix.causes().to_vec());
    for column in covariates.value_columns() {
        let pairs: Vec<(f64, usize)> = joined
            .iter()
            .filter_map(|&(cov_row, matrix_row)| {
                Some((column.cells[cov_row].value()?, matrix_row))
            })
            .collect();
        let matched = pairs.len();
        let covariate = CovariateColumn {
            dataset: covariates.name().to_string(),
            column: column.name.clone(),
            joined_rows: joined.len(),
            matched_rows: matched,
        };

        let xs: Vec<f64> = pairs.iter().map(|(value, _)| *value).collect();
        for (cause_idx, cause) in matrix.causes().iter().enumerate() {
            let coefficient = if matched < config.min_join_rows {
                diagnostics.warn(Warning::InsufficientJoinData {
                    cause: cause.clone(),
                    covariate: covariate.label(),
                    matched,
                    required: config.min_join_rows,
                });
                Coefficient::InsufficientData {
                    matched,
                    required: config.min_join_rows,
                }
            } else {
                let ys: Vec<f64> = pairs
                    .iter()
                    .map(|&(_, matrix_row)| matrix.row(matrix_row)[cause_idx])
                    .collect();
                match pearson(&xs, &ys) {
                    Some(r) => Coefficient::Value { r, matched },
                    None => Coefficient::ZeroVariance { matched },
                }
            };
            table.cells.push(coefficient);
        }
        table.covariates.push(covariate);
    }

    tracing::debug!(
        dataset = %covariates.name(),
        columns = table.covariates.len(),
        joined = joined.len(),
        "covariate correlated"
    );
    Ok(Correlation { table, diagnostics })
}

/// Correlates each covariate table on its own, returning one result per
/// table in input order. With the `rayon` feature the tables run in parallel.
pub fn correlate_each(
    matrix: &NormalizedMatrix,
    covariates: &[Table],
    config: &CorrelationConfig,
) -> Vec<Result<Correlation, CodError>> {
    #[cfg(feature = "rayon")]
    let parts = covariates
        .par_iter()
        .map(|table| correlate(matrix, table, config))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let parts = covariates
        .iter()
        .map(|table| correlate(matrix, table, config))
        .collect();
    parts
}

/// Correlates several covariate tables and concatenates their columns in
/// input order. Fails if any table fails.
pub fn correlate_all(
    matrix: &NormalizedMatrix,
    covariates: &[Table],
    config: &CorrelationConfig,
) -> Result<Correlation, CodError> {
    config.validate()?;

    let mut table = CorrelationTable::empty(matrix.causes().to_vec());
    let mut diagnostics = Diagnostics::for_stage("correlation");
    for part in correlate_each(matrix, covariates, config) {
        let part = part?;
        diagnostics.rows_in += part.diagnostics.rows_in;
        diagnostics.rows_out += part.diagnostics.rows_out;
        diagnostics.absorb(part.diagnostics);
        table.append(part.table)?;
    }
    tracing::info!(
        tables = covariates.len(),
        columns = table.covariates.len(),
        "cross-dataset correlation complete"
    );
    Ok(Correlation { table, diagnostics })
}
