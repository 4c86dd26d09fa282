// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Within-cluster sum-of-squares curve and elbow detection.

use crate::kmeans::{KMeansConfig, kmeans};
use cod_core::{CodError, PointMatrix};
use std::ops::RangeInclusive;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElbowPoint {
    pub k: usize,
    pub wcss: f64,
}

/// Runs k-means for every `k` in `ks` (capped at the number of points) and
/// records the best within-cluster sum of squares for each.
pub fn wcss_curve(
    points: &PointMatrix,
    ks: RangeInclusive<usize>,
    base: &KMeansConfig,
) -> Result<Vec<ElbowPoint>, CodError> {
    let (start, end) = (*ks.start(), *ks.end());
    if start == 0 || start > end {
        return Err(CodError::invalid_input(format!(
            "elbow range must satisfy 1 <= start <= end; got {start}..={end}"
        )));
    }
    let end = end.min(points.n_points());
    let mut curve = Vec::with_capacity(end.saturating_sub(start) + 1);
    for k in start..=end {
        let config = KMeansConfig { k, ..base.clone() };
        let result = kmeans(points, &config)?;
        curve.push(ElbowPoint {
            k,
            wcss: result.inertia,
        });
    }
    tracing::debug!(points = points.n_points(), evaluated = curve.len(), "wcss curve");
    Ok(curve)
}

/// Picks the curve point farthest from the chord joining its first and last
/// points, after scaling both axes to [0, 1]. Ties go to the smaller `k`.
///
/// Returns `None` for curves with fewer than three points or no drop.
pub fn elbow_k(curve: &[ElbowPoint]) -> Option<usize> {
    if curve.len() < 3 {
        return None;
    }
    let first = curve.first()?;
    let last = curve.last()?;
    let k_span = (last.k - first.k) as f64;
    let drop = first.wcss - last.wcss;
    if k_span <= 0.0 || !(drop > 0.0) {
        return None;
    }

    // Chord from (0, 1) to (1, 0) in scaled coordinates: x + y = 1.
    let mut best: Option<(usize, f64)> = None;
    for point in &curve[1..curve.len() - 1] {
        let x = (point.k - first.k) as f64 / k_span;
        let y = (point.wcss - last.wcss) / drop;
        let distance = (1.0 - x - y) / std::f64::consts::SQRT_2;
        if best.is_none_or(|(_, d)| distance > d) {
            best = Some((point.k, distance));
        }
    }
    best.filter(|(_, d)| *d > 0.0).map(|(k, _)| k)
}
