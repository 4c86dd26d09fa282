// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::EntityYear;
use std::borrow::Cow;
use std::fmt;

/// Why a row was left out of the compositional matrix.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowExclusion {
    ZeroTotal,
    NegativeCount { cause: String },
    MissingCount { cause: String },
}

impl fmt::Display for RowExclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTotal => f.write_str("row total is zero"),
            Self::NegativeCount { cause } => write!(f, "negative count for '{cause}'"),
            Self::MissingCount { cause } => write!(f, "missing count for '{cause}'"),
        }
    }
}

/// Non-fatal condition that degraded one row, pair or restart.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// A row was excluded during compositional normalization.
    Normalization { key: EntityYear, reason: RowExclusion },
    /// A correlation pair had too few matched rows to be computed.
    InsufficientJoinData {
        cause: String,
        covariate: String,
        matched: usize,
        required: usize,
    },
    /// A k-means restart hit the iteration cap without stabilizing.
    Convergence { restart: usize, iterations: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalization { key, reason } => {
                write!(f, "excluded {key} from normalization: {reason}")
            }
            Self::InsufficientJoinData {
                cause,
                covariate,
                matched,
                required,
            } => write!(
                f,
                "insufficient join data for {cause} x {covariate}: matched={matched}, required={required}"
            ),
            Self::Convergence {
                restart,
                iterations,
            } => write!(
                f,
                "k-means restart {restart} did not converge within {iterations} iterations"
            ),
        }
    }
}

/// Inspectable record of what a stage did.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    pub stage: Cow<'static, str>,
    pub engine_version: Option<String>,
    pub rows_in: usize,
    pub rows_out: usize,
    pub seed: Option<u64>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn for_stage(stage: &'static str) -> Self {
        Self {
            stage: Cow::Borrowed(stage),
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            ..Self::default()
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::debug!(stage = %self.stage, %note);
        self.notes.push(note);
    }

    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(stage = %self.stage, %warning);
        self.warnings.push(warning);
    }

    /// Moves notes and warnings from `other` into `self`.
    pub fn absorb(&mut self, other: Diagnostics) {
        self.notes.extend(other.notes);
        self.warnings.extend(other.warnings);
    }
}
