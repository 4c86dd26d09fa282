// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Core shared types for cod-panel: canonical keys, tagged-missing tables,
//! compositional matrices, diagnostics and the statistics every stage uses.

pub mod diagnostics;
pub mod error;
pub mod key;
pub mod matrix;
pub mod repro;
pub mod stats;
pub mod table;

pub use diagnostics::{Diagnostics, RowExclusion, Warning};
pub use error::CodError;
pub use key::{EntityYear, MemberKey};
pub use matrix::{NormalizedMatrix, PointMatrix, ROW_SUM_TOLERANCE};
pub use repro::derive_seed;
pub use stats::{
    KsTest, ks_two_sample, mean, negligible_spread, non_constant_std, pearson, sample_std,
    sample_variance,
};
pub use table::{
    CODE_COLUMN, Cell, Column, ColumnKind, ENTITY_COLUMN, RawCell, RawTable, Table, YEAR_COLUMN,
};
