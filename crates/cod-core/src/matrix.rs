// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{CodError, EntityYear, MemberKey};
use std::collections::HashMap;

/// Relative tolerance for compositional row sums.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// Record-by-cause proportions; every row sums to one.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedMatrix {
    keys: Vec<EntityYear>,
    causes: Vec<String>,
    values: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<EntityYear, usize>,
}

impl NormalizedMatrix {
    /// Builds a matrix from row-major proportions, validating shape, range,
    /// key uniqueness and row sums.
    pub fn new(
        keys: Vec<EntityYear>,
        causes: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, CodError> {
        if causes.is_empty() {
            return Err(CodError::invalid_input(
                "normalized matrix requires at least one cause column",
            ));
        }
        let expected = keys
            .len()
            .checked_mul(causes.len())
            .ok_or_else(|| CodError::invalid_input("rows*causes overflow"))?;
        if values.len() != expected {
            return Err(CodError::invalid_input(format!(
                "value length mismatch: got {}, expected {expected} (rows={}, causes={})",
                values.len(),
                keys.len(),
                causes.len()
            )));
        }

        let mut index = HashMap::with_capacity(keys.len());
        for (row, key) in keys.iter().enumerate() {
            if index.insert(key.clone(), row).is_some() {
                return Err(CodError::data_integrity(format!(
                    "duplicate key in normalized matrix: {key}"
                )));
            }
        }

        for (row, chunk) in values.chunks(causes.len()).enumerate() {
            if let Some(bad) = chunk.iter().find(|v| !(0.0..=1.0).contains(*v)) {
                return Err(CodError::numerical_issue(format!(
                    "proportion {bad} outside [0, 1] for {}",
                    keys[row]
                )));
            }
            let sum: f64 = chunk.iter().sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE * sum.abs().max(1.0) {
                return Err(CodError::numerical_issue(format!(
                    "row {} sums to {sum}, expected 1",
                    keys[row]
                )));
            }
        }

        Ok(Self {
            keys,
            causes,
            values,
            index,
        })
    }

    pub fn keys(&self) -> &[EntityYear] {
        &self.keys
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.keys.len()
    }

    pub fn n_causes(&self) -> usize {
        self.causes.len()
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let d = self.causes.len();
        &self.values[row * d..(row + 1) * d]
    }

    pub fn row_index(&self, key: &EntityYear) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &EntityYear) -> Option<&[f64]> {
        self.row_index(key).map(|row| self.row(row))
    }

    pub fn cause_index(&self, cause: &str) -> Option<usize> {
        self.causes.iter().position(|name| name == cause)
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        self.values
            .chunks(self.causes.len())
            .map(|row| row[col])
            .collect()
    }

    /// Observation-space view: one point per record, one dimension per cause.
    pub fn to_record_points(&self) -> PointMatrix {
        PointMatrix {
            labels: self.keys.iter().cloned().map(MemberKey::Record).collect(),
            dims: self.causes.clone(),
            values: self.values.clone(),
        }
    }
}

/// Dense points-by-dimensions matrix used by clustering and profiling.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PointMatrix {
    labels: Vec<MemberKey>,
    dims: Vec<String>,
    values: Vec<f64>,
}

impl PointMatrix {
    pub fn new(labels: Vec<MemberKey>, dims: Vec<String>, values: Vec<f64>) -> Result<Self, CodError> {
        if labels.is_empty() {
            return Err(CodError::invalid_input("point matrix requires at least one point"));
        }
        if dims.is_empty() {
            return Err(CodError::invalid_input(
                "point matrix requires at least one dimension",
            ));
        }
        if values.len() != labels.len() * dims.len() {
            return Err(CodError::invalid_input(format!(
                "value length mismatch: got {}, expected {} (points={}, dims={})",
                values.len(),
                labels.len() * dims.len(),
                labels.len(),
                dims.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(CodError::numerical_issue(format!(
                "point matrix contains non-finite value {bad}"
            )));
        }
        Ok(Self {
            labels,
            dims,
            values,
        })
    }

    pub fn labels(&self) -> &[MemberKey] {
        &self.labels
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn n_points(&self) -> usize {
        self.labels.len()
    }

    pub fn n_dims(&self) -> usize {
        self.dims.len()
    }

    pub fn point(&self, idx: usize) -> &[f64] {
        let d = self.dims.len();
        &self.values[idx * d..(idx + 1) * d]
    }

    pub fn points(&self) -> std::slice::ChunksExact<'_, f64> {
        self.values.chunks_exact(self.dims.len())
    }

    /// Swaps the roles of points and dimensions.
    ///
    /// `labels` names the new points (old dimensions) and `dims` the new
    /// dimensions (old points).
    pub fn transpose(&self, labels: Vec<MemberKey>, dims: Vec<String>) -> Result<Self, CodError> {
        if labels.len() != self.n_dims() || dims.len() != self.n_points() {
            return Err(CodError::invalid_input(format!(
                "transpose labels/dims mismatch: got {}x{}, expected {}x{}",
                labels.len(),
                dims.len(),
                self.n_dims(),
                self.n_points()
            )));
        }
        let (n, d) = (self.n_points(), self.n_dims());
        let mut values = Vec::with_capacity(n * d);
        for col in 0..d {
            for row in 0..n {
                values.push(self.values[row * d + col]);
            }
        }
        Self::new(labels, dims, values)
    }
}

#[cfg(test)]
mod tests {
    use super::{NormalizedMatrix, PointMatrix};
    use crate::{EntityYear, MemberKey};

    fn matrix() -> NormalizedMatrix {
        NormalizedMatrix::new(
            vec![EntityYear::new("A", 2000), EntityYear::new("B", 2000)],
            vec!["c1".to_string(), "c2".to_string()],
            vec![0.1, 0.9, 0.2, 0.8],
        )
        .expect("matrix should be valid")
    }

    #[test]
    fn normalized_matrix_lookup_by_key_and_cause() {
        let m = matrix();
        assert_eq!(m.get(&EntityYear::new("B", 2000)), Some(&[0.2, 0.8][..]));
        assert!(m.get(&EntityYear::new("C", 2000)).is_none());
        assert_eq!(m.cause_index("c2"), Some(1));
        assert_eq!(m.column(0), vec![0.1, 0.2]);
    }

    #[test]
    fn normalized_matrix_rejects_rows_not_summing_to_one() {
        let err = NormalizedMatrix::new(
            vec![EntityYear::new("A", 2000)],
            vec!["c1".to_string(), "c2".to_string()],
            vec![0.5, 0.4],
        )
        .expect_err("row sum 0.9 must fail");
        assert!(err.to_string().contains("sums to"));
    }

    #[test]
    fn normalized_matrix_rejects_duplicate_keys() {
        let err = NormalizedMatrix::new(
            vec![EntityYear::new("A", 2000), EntityYear::new("A", 2000)],
            vec!["c1".to_string()],
            vec![1.0, 1.0],
        )
        .expect_err("duplicate keys must fail");
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn point_matrix_transpose_swaps_axes() {
        let points = matrix().to_record_points();
        let transposed = points
            .transpose(
                vec![
                    MemberKey::Cause("c1".to_string()),
                    MemberKey::Cause("c2".to_string()),
                ],
                vec!["A (2000)".to_string(), "B (2000)".to_string()],
            )
            .expect("transpose shape matches");
        assert_eq!(transposed.point(0), &[0.1, 0.2]);
        assert_eq!(transposed.point(1), &[0.9, 0.8]);
    }

    #[test]
    fn point_matrix_rejects_non_finite_values() {
        let err = PointMatrix::new(
            vec![MemberKey::Cause("c".to_string())],
            vec!["d".to_string()],
            vec![f64::NAN],
        )
        .expect_err("nan must fail");
        assert!(err.to_string().contains("non-finite"));
    }
}
