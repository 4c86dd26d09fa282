// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Per-cluster variable rankings.
//!
//! A cluster is described two ways that routinely disagree: by how far its
//! centroid sits from the global mean in units of global spread, and by the
//! raw magnitude of its centroid. They are separate queries with separate
//! result types.

use crate::assignment::ClusterAssignment;
use cod_core::{CodError, PointMatrix, mean, non_constant_std};

/// Deviation of a cluster centroid from the global mean, in global
/// standard deviations.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RelativeScore {
    pub variable: String,
    pub score: f64,
}

/// Raw centroid value of a variable.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AbsoluteValue {
    pub variable: String,
    pub value: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub relative: Vec<RelativeScore>,
    pub absolute: Vec<AbsoluteValue>,
}

#[derive(Clone, Debug)]
pub struct ClusterProfiler {
    variables: Vec<String>,
    centroids: Vec<Vec<f64>>,
    sizes: Vec<usize>,
    global_mean: Vec<f64>,
    /// `None` for dimensions that do not vary.
    global_spread: Vec<Option<f64>>,
}

impl ClusterProfiler {
    /// Computes centroids of `assignment` over `points` together with the
    /// global mean and sample standard deviation of each dimension.
    pub fn new(points: &PointMatrix, assignment: &ClusterAssignment) -> Result<Self, CodError> {
        if assignment.members() != points.labels() {
            return Err(CodError::invalid_input(
                "cluster assignment members do not match the profiled points",
            ));
        }
        let d = points.n_dims();
        let sizes = assignment.sizes();
        let mut centroids = vec![vec![0.0; d]; assignment.k()];
        for (point, &id) in points.points().zip(assignment.cluster_ids()) {
            for (acc, value) in centroids[id].iter_mut().zip(point) {
                *acc += value / sizes[id] as f64;
            }
        }

        let mut global_mean = Vec::with_capacity(d);
        let mut global_spread = Vec::with_capacity(d);
        for col in 0..d {
            let column: Vec<f64> = points.points().map(|point| point[col]).collect();
            global_mean.push(mean(&column).unwrap_or(0.0));
            global_spread.push(non_constant_std(&column));
        }

        Ok(Self {
            variables: points.dims().to_vec(),
            centroids,
            sizes,
            global_mean,
            global_spread,
        })
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn centroid(&self, cluster: usize) -> Option<&[f64]> {
        self.centroids.get(cluster).map(Vec::as_slice)
    }

    /// Variables ranked by `(centroid - global mean) / global sd`, highest
    /// first. Variables with no global spread score zero.
    pub fn relative_ranking(&self, cluster: usize) -> Result<Vec<RelativeScore>, CodError> {
        let centroid = self.checked_centroid(cluster)?;
        let mut ranked: Vec<RelativeScore> = self
            .variables
            .iter()
            .enumerate()
            .map(|(j, variable)| {
                let score = self.global_spread[j]
                    .map_or(0.0, |spread| (centroid[j] - self.global_mean[j]) / spread);
                RelativeScore {
                    variable: variable.clone(),
                    score,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }

    /// Variables ranked by raw centroid value, largest first.
    pub fn absolute_ranking(&self, cluster: usize) -> Result<Vec<AbsoluteValue>, CodError> {
        let centroid = self.checked_centroid(cluster)?;
        let mut ranked: Vec<AbsoluteValue> = self
            .variables
            .iter()
            .zip(centroid)
            .map(|(variable, &value)| AbsoluteValue {
                variable: variable.clone(),
                value,
            })
            .collect();
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
        Ok(ranked)
    }

    /// Both rankings for every cluster, in cluster id order.
    pub fn report(&self) -> Result<Vec<ClusterProfile>, CodError> {
        (0..self.n_clusters())
            .map(|cluster| {
                Ok(ClusterProfile {
                    cluster,
                    size: self.sizes[cluster],
                    relative: self.relative_ranking(cluster)?,
                    absolute: self.absolute_ranking(cluster)?,
                })
            })
            .collect()
    }

    fn checked_centroid(&self, cluster: usize) -> Result<&[f64], CodError> {
        self.centroid(cluster).ok_or_else(|| {
            CodError::invalid_input(format!(
                "cluster {cluster} out of range; profiler has {} clusters",
                self.n_clusters()
            ))
        })
    }
}
