// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::assignment::{ClusterAssignment, canonical_labels};
use crate::distance::squared_euclidean;
use cod_core::{CodError, Diagnostics, PointMatrix, Warning, derive_seed};
use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

const DEFAULT_RESTARTS: usize = 100;
const DEFAULT_MAX_ITERATIONS: usize = 300;
const DEFAULT_SEED: u64 = 0;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KMeansConfig {
    pub k: usize,
    pub restarts: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

impl KMeansConfig {
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            restarts: DEFAULT_RESTARTS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: DEFAULT_SEED,
        }
    }

    pub fn validate(&self, n_points: usize) -> Result<(), CodError> {
        if self.k == 0 {
            return Err(CodError::invalid_input("KMeansConfig.k must be >= 1; got 0"));
        }
        if self.k > n_points {
            return Err(CodError::invalid_input(format!(
                "KMeansConfig.k must be <= number of points ({n_points}); got {}",
                self.k
            )));
        }
        if self.restarts == 0 {
            return Err(CodError::invalid_input(
                "KMeansConfig.restarts must be >= 1; got 0",
            ));
        }
        if self.max_iterations == 0 {
            return Err(CodError::invalid_input(
                "KMeansConfig.max_iterations must be >= 1; got 0",
            ));
        }
        Ok(())
    }
}

/// Outcome of one restart, kept for inspection.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RestartSummary {
    pub restart: usize,
    pub seed: u64,
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansResult {
    pub assignment: ClusterAssignment,
    /// Centroids indexed by canonical cluster id.
    pub centroids: Vec<Vec<f64>>,
    /// Within-cluster sum of squares of the selected restart.
    pub inertia: f64,
    pub best_restart: usize,
    pub converged: bool,
    pub iterations: usize,
    pub restarts: Vec<RestartSummary>,
    pub diagnostics: Diagnostics,
}

struct RestartOutcome {
    labels: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

/// Runs k-means with independent seeded restarts and keeps the restart with
/// the lowest within-cluster sum of squares (ties go to the lower restart).
pub fn kmeans(points: &PointMatrix, config: &KMeansConfig) -> Result<KMeansResult, CodError> {
    config.validate(points.n_points())?;
    let mut diagnostics = Diagnostics::for_stage("kmeans");
    diagnostics.rows_in = points.n_points();
    diagnostics.seed = Some(config.seed);

    let run = |restart: usize| {
        let seed = derive_seed(config.seed, restart as u64);
        (seed, run_restart(points, config.k, config.max_iterations, seed))
    };
    #[cfg(feature = "rayon")]
    let outcomes: Vec<(u64, RestartOutcome)> = (0..config.restarts).into_par_iter().map(run).collect();
    #[cfg(not(feature = "rayon"))]
    let outcomes: Vec<(u64, RestartOutcome)> = (0..config.restarts).map(run).collect();

    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut best: Option<(usize, RestartOutcome)> = None;
    for (restart, (seed, outcome)) in outcomes.into_iter().enumerate() {
        if !outcome.converged {
            diagnostics.warn(Warning::Convergence {
                restart,
                iterations: outcome.iterations,
            });
        }
        summaries.push(RestartSummary {
            restart,
            seed,
            inertia: outcome.inertia,
            iterations: outcome.iterations,
            converged: outcome.converged,
        });
        let better = best
            .as_ref()
            .is_none_or(|(_, current)| outcome.inertia < current.inertia);
        if better {
            best = Some((restart, outcome));
        }
    }
    let (best_restart, outcome) =
        best.ok_or_else(|| CodError::invalid_input("k-means produced no restarts"))?;
    if !outcome.inertia.is_finite() {
        return Err(CodError::numerical_issue(format!(
            "k-means inertia is not finite: {}",
            outcome.inertia
        )));
    }

    let (canonical, k) = canonical_labels(&outcome.labels);
    let mut centroids = vec![vec![]; k];
    for (old, new) in outcome.labels.iter().zip(&canonical) {
        if centroids[*new].is_empty() {
            centroids[*new] = outcome.centroids[*old].clone();
        }
    }
    let assignment = ClusterAssignment::from_labels(points.labels().to_vec(), &canonical)?;

    diagnostics.rows_out = points.n_points();
    diagnostics.note(format!(
        "best restart {best_restart} of {} (inertia={:.6})",
        config.restarts, outcome.inertia
    ));
    tracing::info!(
        k = config.k,
        restarts = config.restarts,
        best_restart,
        inertia = outcome.inertia,
        "k-means complete"
    );

    Ok(KMeansResult {
        assignment,
        centroids,
        inertia: outcome.inertia,
        best_restart,
        converged: outcome.converged,
        iterations: outcome.iterations,
        restarts: summaries,
        diagnostics,
    })
}

fn run_restart(points: &PointMatrix, k: usize, max_iterations: usize, seed: u64) -> RestartOutcome {
    let n = points.n_points();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids: Vec<Vec<f64>> = sample(&mut rng, n, k)
        .into_iter()
        .map(|idx| points.point(idx).to_vec())
        .collect();
    let mut labels = vec![usize::MAX; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        let mut changed = false;
        for (idx, point) in points.points().enumerate() {
            let mut nearest = nearest_centroid(point, &centroids);
            let current = labels[idx];
            if current != usize::MAX
                && squared_euclidean(point, &centroids[current])
                    <= squared_euclidean(point, &centroids[nearest])
            {
                nearest = current;
            }
            if current != nearest {
                labels[idx] = nearest;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
        update_centroids(points, &mut labels, &mut centroids);
    }

    let inertia = points
        .points()
        .zip(&labels)
        .map(|(point, &label)| squared_euclidean(point, &centroids[label]))
        .sum();
    RestartOutcome {
        labels,
        centroids,
        inertia,
        iterations,
        converged,
    }
}

/// Index of the closest centroid; ties go to the lower index.
fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_euclidean(point, centroid);
        if d < best_distance {
            best = idx;
            best_distance = d;
        }
    }
    best
}

/// Recomputes centroids as member means. An empty cluster takes the point
/// farthest from its current centroid, drawn from a cluster with more than
/// one member.
fn update_centroids(points: &PointMatrix, labels: &mut [usize], centroids: &mut [Vec<f64>]) {
    let k = centroids.len();
    let d = points.n_dims();
    loop {
        let mut sums = vec![vec![0.0; d]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.points().zip(labels.iter()) {
            counts[label] += 1;
            for (sum, value) in sums[label].iter_mut().zip(point) {
                *sum += value;
            }
        }
        for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(&counts) {
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }

        let Some(empty) = counts.iter().position(|&c| c == 0) else {
            return;
        };
        let donor = points
            .points()
            .enumerate()
            .filter(|(idx, _)| counts[labels[*idx]] > 1)
            .map(|(idx, point)| (idx, squared_euclidean(point, &centroids[labels[idx]])))
            .fold(None::<(usize, f64)>, |best, (idx, dist)| match best {
                Some((_, best_dist)) if best_dist >= dist => best,
                _ => Some((idx, dist)),
            });
        let Some((donor, _)) = donor else {
            return;
        };
        labels[donor] = empty;
        centroids[empty] = points.point(donor).to_vec();
    }
}
