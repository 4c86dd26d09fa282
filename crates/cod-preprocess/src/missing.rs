// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Per-dataset missing-data policy.
//!
//! Decisions run in three passes: a single dominant column may be dropped,
//! then incomplete rows are dropped if the loss is small, and otherwise each
//! incomplete column is classified on its own. Informative missingness is
//! flagged with an indicator column; missingness that looks random is left
//! for pairwise (surgical) exclusion. Every decision carries the statistics
//! it was based on so a caller can audit or override it.

use cod_core::{
    Cell, CodError, Column, ColumnKind, Diagnostics, KsTest, Table, ks_two_sample, pearson,
};

const DEFAULT_COLUMN_DROP_DISPARITY_RATIO: f64 = 10.0;
const DEFAULT_COLUMN_DROP_MIN_ROW_SHARE: f64 = 0.5;
const DEFAULT_ACCEPTABLE_ROW_LOSS: f64 = 0.05;
const DEFAULT_INFORMATIVE_ALPHA: f64 = 0.01;
const DEFAULT_MIN_GROUP_SIZE: usize = 5;
const DEFAULT_MIN_ASSOCIATION: f64 = 0.3;
const DEFAULT_INDICATOR_SUFFIX: &str = "_missing";

/// Year is always used as a probe column for informative missingness.
pub const YEAR_PROBE: &str = "Year";

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct MissingPolicyConfig {
    /// Worst column's missing rate must be at least this multiple of the next.
    pub column_drop_disparity_ratio: f64,
    /// Share of incomplete rows the column drop must make complete.
    pub column_drop_min_row_share: f64,
    /// Largest share of rows that may be dropped outright.
    pub acceptable_row_loss: f64,
    /// Family-wise significance level for informative-missingness tests.
    pub informative_alpha: f64,
    /// Smallest group (missing or present) a test may run on.
    pub min_group_size: usize,
    /// Minimum |r| for another value column to be used as a probe.
    pub min_association: f64,
    pub indicator_suffix: String,
}

impl Default for MissingPolicyConfig {
    fn default() -> Self {
        Self {
            column_drop_disparity_ratio: DEFAULT_COLUMN_DROP_DISPARITY_RATIO,
            column_drop_min_row_share: DEFAULT_COLUMN_DROP_MIN_ROW_SHARE,
            acceptable_row_loss: DEFAULT_ACCEPTABLE_ROW_LOSS,
            informative_alpha: DEFAULT_INFORMATIVE_ALPHA,
            min_group_size: DEFAULT_MIN_GROUP_SIZE,
            min_association: DEFAULT_MIN_ASSOCIATION,
            indicator_suffix: DEFAULT_INDICATOR_SUFFIX.to_string(),
        }
    }
}

impl MissingPolicyConfig {
    pub fn validate(&self) -> Result<(), CodError> {
        if !self.column_drop_disparity_ratio.is_finite() || self.column_drop_disparity_ratio < 1.0
        {
            return Err(CodError::invalid_input(format!(
                "MissingPolicyConfig.column_drop_disparity_ratio must be finite and >= 1.0; got {}",
                self.column_drop_disparity_ratio
            )));
        }
        for (name, value) in [
            ("column_drop_min_row_share", self.column_drop_min_row_share),
            ("acceptable_row_loss", self.acceptable_row_loss),
            ("min_association", self.min_association),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CodError::invalid_input(format!(
                    "MissingPolicyConfig.{name} must be in [0, 1]; got {value}"
                )));
            }
        }
        if !(self.informative_alpha > 0.0 && self.informative_alpha < 1.0) {
            return Err(CodError::invalid_input(format!(
                "MissingPolicyConfig.informative_alpha must be in (0, 1); got {}",
                self.informative_alpha
            )));
        }
        if self.min_group_size < 2 {
            return Err(CodError::invalid_input(format!(
                "MissingPolicyConfig.min_group_size must be >= 2; got {}",
                self.min_group_size
            )));
        }
        if self.indicator_suffix.is_empty() {
            return Err(CodError::invalid_input(
                "MissingPolicyConfig.indicator_suffix must not be empty",
            ));
        }
        Ok(())
    }
}

/// What happens to one column's missing cells.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnPolicy {
    /// Column has no missing cells.
    Complete,
    /// Column removed from the dataset.
    DropColumn,
    /// Rows missing this column were removed from the dataset.
    DropRows,
    /// Missingness is informative; `indicator` holds 1 where the value is missing.
    FlagIndicator { indicator: String },
    /// Missingness looks random; rows are excluded only where this column is used.
    SurgicalDrop,
}

/// One two-sample comparison of a probe column split by target missingness.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct InformativeTest {
    pub probe: String,
    pub missing_group: usize,
    pub present_group: usize,
    pub ks: KsTest,
}

/// Statistical basis for a [`ColumnPolicy`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum DecisionBasis {
    NoMissingValues,
    ColumnDisparity {
        ratio: f64,
        incomplete_rows_resolved: f64,
    },
    RowLossWithinThreshold {
        row_loss: f64,
        threshold: f64,
    },
    DistributionComparison {
        tests: Vec<InformativeTest>,
        /// Largest KS statistic across probes.
        divergence: f64,
        min_p_value: f64,
        /// Bonferroni-adjusted threshold the minimum p-value was compared with.
        threshold: f64,
    },
    /// No probe had enough observations on both sides; flagging keeps the signal.
    InsufficientEvidence { tests_attempted: usize },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDecision {
    pub column: String,
    pub missing_rate: f64,
    pub policy: ColumnPolicy,
    pub basis: DecisionBasis,
}

/// Inspectable record of the policy applied to one dataset.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRecord {
    pub dataset: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub incomplete_row_share: f64,
    pub incomplete_row_share_after_column_drop: f64,
    pub decisions: Vec<ColumnDecision>,
}

impl PolicyRecord {
    pub fn decision(&self, column: &str) -> Option<&ColumnDecision> {
        self.decisions.iter().find(|d| d.column == column)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyOutcome {
    pub record: PolicyRecord,
    pub table: Table,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissingPolicyEngine {
    config: MissingPolicyConfig,
}

impl MissingPolicyEngine {
    pub fn new(config: MissingPolicyConfig) -> Result<Self, CodError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MissingPolicyConfig {
        &self.config
    }

    /// Decides and applies a policy for every value column of `table`.
    pub fn apply(&self, table: &Table) -> Result<PolicyOutcome, CodError> {
        let mut diagnostics = Diagnostics::for_stage("missing_policy");
        diagnostics.rows_in = table.n_rows();
        let incomplete_row_share = table.incomplete_row_share();

        let mut decisions: Vec<ColumnDecision> = vec![];
        let mut working = table.clone();

        if let Some(candidate) = self.column_drop_candidate(table) {
            diagnostics.note(format!(
                "dropping column '{}' (missing_rate={:.3}, ratio={:.1})",
                candidate.column, candidate.missing_rate, candidate.ratio
            ));
            working = working.without_column(&candidate.column)?;
            decisions.push(ColumnDecision {
                column: candidate.column,
                missing_rate: candidate.missing_rate,
                policy: ColumnPolicy::DropColumn,
                basis: DecisionBasis::ColumnDisparity {
                    ratio: candidate.ratio,
                    incomplete_rows_resolved: candidate.resolved_share,
                },
            });
        }

        let row_loss = working.incomplete_row_share();
        let rates: Vec<(String, f64)> = working
            .value_columns()
            .map(|column| (column.name.clone(), column.missing_rate()))
            .collect();

        if row_loss <= self.config.acceptable_row_loss {
            for (name, rate) in &rates {
                let (policy, basis) = if *rate > 0.0 {
                    (
                        ColumnPolicy::DropRows,
                        DecisionBasis::RowLossWithinThreshold {
                            row_loss,
                            threshold: self.config.acceptable_row_loss,
                        },
                    )
                } else {
                    (ColumnPolicy::Complete, DecisionBasis::NoMissingValues)
                };
                decisions.push(ColumnDecision {
                    column: name.clone(),
                    missing_rate: *rate,
                    policy,
                    basis,
                });
            }
            if row_loss > 0.0 {
                diagnostics.note(format!(
                    "dropping incomplete rows (row_loss={row_loss:.4} <= {:.4})",
                    self.config.acceptable_row_loss
                ));
            }
            let snapshot = working.clone();
            working = snapshot.retain_rows(|row| !snapshot.row_is_incomplete(row));
        } else {
            let mut indicators = vec![];
            for (name, rate) in &rates {
                if *rate == 0.0 {
                    decisions.push(ColumnDecision {
                        column: name.clone(),
                        missing_rate: 0.0,
                        policy: ColumnPolicy::Complete,
                        basis: DecisionBasis::NoMissingValues,
                    });
                    continue;
                }
                let (policy, basis) = self.classify_column(&working, name)?;
                if let ColumnPolicy::FlagIndicator { indicator } = &policy {
                    indicators.push(indicator_column(&working, name, indicator)?);
                }
                diagnostics.note(format!("column '{name}': {policy:?}"));
                decisions.push(ColumnDecision {
                    column: name.clone(),
                    missing_rate: *rate,
                    policy,
                    basis,
                });
            }
            for indicator in indicators {
                working = working.with_column(indicator)?;
            }
        }

        diagnostics.rows_out = working.n_rows();
        tracing::info!(
            dataset = %table.name(),
            rows_in = diagnostics.rows_in,
            rows_out = diagnostics.rows_out,
            "missing-data policy applied"
        );

        Ok(PolicyOutcome {
            record: PolicyRecord {
                dataset: table.name().to_string(),
                rows_in: table.n_rows(),
                rows_out: working.n_rows(),
                incomplete_row_share,
                incomplete_row_share_after_column_drop: row_loss,
                decisions,
            },
            table: working,
            diagnostics,
        })
    }

    fn column_drop_candidate(&self, table: &Table) -> Option<ColumnDropCandidate> {
        let mut rates: Vec<(&str, f64)> = table
            .value_columns()
            .map(|column| (column.name.as_str(), column.missing_rate()))
            .collect();
        if rates.len() < 2 {
            return None;
        }
        rates.sort_by(|a, b| b.1.total_cmp(&a.1));
        let (worst, worst_rate) = rates[0];
        let runner_up = rates[1].1;

        // Small gaps are cheaper to close by dropping rows.
        if worst_rate <= self.config.acceptable_row_loss {
            return None;
        }
        let ratio = if runner_up > 0.0 {
            worst_rate / runner_up
        } else {
            f64::INFINITY
        };
        if ratio < self.config.column_drop_disparity_ratio {
            return None;
        }

        let before = table.incomplete_row_count();
        let after = (0..table.n_rows())
            .filter(|&row| {
                table
                    .value_columns()
                    .filter(|column| column.name != worst)
                    .any(|column| column.cells[row].is_missing())
            })
            .count();
        let resolved_share = (before - after) as f64 / before as f64;
        if resolved_share <= self.config.column_drop_min_row_share {
            return None;
        }

        Some(ColumnDropCandidate {
            column: worst.to_string(),
            missing_rate: worst_rate,
            ratio,
            resolved_share,
        })
    }

    fn classify_column(
        &self,
        table: &Table,
        target: &str,
    ) -> Result<(ColumnPolicy, DecisionBasis), CodError> {
        let target_column = table.column(target).ok_or_else(|| {
            CodError::invalid_input(format!("table '{}' has no column '{target}'", table.name()))
        })?;
        let missing: Vec<bool> = target_column.cells.iter().map(Cell::is_missing).collect();

        let mut probes: Vec<(String, Vec<Cell>)> = vec![(
            YEAR_PROBE.to_string(),
            table
                .keys()
                .iter()
                .map(|key| Cell::Value(f64::from(key.year)))
                .collect(),
        )];
        for column in table.value_columns().filter(|c| c.name != target) {
            if self.is_associated(target_column, column) {
                probes.push((column.name.clone(), column.cells.clone()));
            }
        }

        let mut tests = vec![];
        for (probe, cells) in &probes {
            let mut missing_group = vec![];
            let mut present_group = vec![];
            for (cell, &is_missing) in cells.iter().zip(&missing) {
                if let Some(value) = cell.value() {
                    if is_missing {
                        missing_group.push(value);
                    } else {
                        present_group.push(value);
                    }
                }
            }
            if missing_group.len() < self.config.min_group_size
                || present_group.len() < self.config.min_group_size
            {
                continue;
            }
            if let Some(ks) = ks_two_sample(&missing_group, &present_group) {
                tests.push(InformativeTest {
                    probe: probe.clone(),
                    missing_group: missing_group.len(),
                    present_group: present_group.len(),
                    ks,
                });
            }
        }

        if tests.is_empty() {
            return Ok((
                ColumnPolicy::FlagIndicator {
                    indicator: self.indicator_name(target),
                },
                DecisionBasis::InsufficientEvidence {
                    tests_attempted: probes.len(),
                },
            ));
        }

        let threshold = self.config.informative_alpha / tests.len() as f64;
        let min_p_value = tests
            .iter()
            .map(|test| test.ks.p_value)
            .fold(f64::INFINITY, f64::min);
        let divergence = tests
            .iter()
            .map(|test| test.ks.statistic)
            .fold(0.0, f64::max);
        let policy = if min_p_value < threshold {
            ColumnPolicy::FlagIndicator {
                indicator: self.indicator_name(target),
            }
        } else {
            ColumnPolicy::SurgicalDrop
        };
        Ok((
            policy,
            DecisionBasis::DistributionComparison {
                tests,
                divergence,
                min_p_value,
                threshold,
            },
        ))
    }

    /// Association on pairwise-complete rows; columns too sparse to measure are skipped.
    fn is_associated(&self, target: &Column, other: &Column) -> bool {
        let (xs, ys): (Vec<f64>, Vec<f64>) = target
            .cells
            .iter()
            .zip(&other.cells)
            .filter_map(|(a, b)| Some((a.value()?, b.value()?)))
            .unzip();
        pearson(&xs, &ys).is_some_and(|r| r.abs() >= self.config.min_association)
    }

    fn indicator_name(&self, column: &str) -> String {
        format!("{column}{}", self.config.indicator_suffix)
    }
}

struct ColumnDropCandidate {
    column: String,
    missing_rate: f64,
    ratio: f64,
    resolved_share: f64,
}

fn indicator_column(table: &Table, source: &str, name: &str) -> Result<Column, CodError> {
    let column = table.column(source).ok_or_else(|| {
        CodError::invalid_input(format!("table '{}' has no column '{source}'", table.name()))
    })?;
    Ok(Column {
        name: name.to_string(),
        kind: ColumnKind::MissingIndicator {
            source: source.to_string(),
        },
        cells: column
            .cells
            .iter()
            .map(|cell| Cell::Value(if cell.is_missing() { 1.0 } else { 0.0 }))
            .collect(),
    })
}
