// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{CodError, PointMatrix};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

/// Upper-triangle pairwise distances, stored row by row.
#[derive(Clone, Debug, PartialEq)]
pub struct CondensedDistances {
    n: usize,
    values: Vec<f64>,
}

impl CondensedDistances {
    /// Euclidean distances between all points.
    pub fn euclidean(points: &PointMatrix) -> Result<Self, CodError> {
        let n = points.n_points();
        let len = n
            .checked_mul(n.saturating_sub(1))
            .map(|v| v / 2)
            .ok_or_else(|| CodError::invalid_input("distance matrix size overflow"))?;

        let row = |i: usize| -> Vec<f64> {
            let a = points.point(i);
            ((i + 1)..n).map(|j| euclidean(a, points.point(j))).collect()
        };
        #[cfg(feature = "rayon")]
        let rows: Vec<Vec<f64>> = (0..n).into_par_iter().map(row).collect();
        #[cfg(not(feature = "rayon"))]
        let rows: Vec<Vec<f64>> = (0..n).map(row).collect();

        let mut values = Vec::with_capacity(len);
        for r in rows {
            values.extend(r);
        }
        Ok(Self { n, values })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        self.n * i - i * (i + 1) / 2 + (j - i - 1)
    }

    /// Distance between distinct points `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        debug_assert_ne!(i, j);
        self.values[self.index(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        debug_assert_ne!(i, j);
        let idx = self.index(i, j);
        self.values[idx] = value;
    }
}
