// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Agglomerative clustering with the nearest-neighbor-chain algorithm.
//!
//! All supported linkages are reducible, so the chain finds the same merges
//! as the naive closest-pair loop in O(n^2) time. Merges are then sorted by
//! height and relabeled: leaves are `0..n`, the cluster created by merge `i`
//! is `n + i`.

use crate::assignment::ClusterAssignment;
use crate::distance::CondensedDistances;
use cod_core::{CodError, MemberKey, PointMatrix};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Linkage {
    Single,
    Average,
    Complete,
    #[default]
    Ward,
}

impl Linkage {
    /// Lance-Williams update: distance from cluster `k` to the union of `x`
    /// and `y`, on unsquared Euclidean distances.
    fn update(self, d_kx: f64, d_ky: f64, d_xy: f64, n_x: usize, n_y: usize, n_k: usize) -> f64 {
        match self {
            Self::Single => d_kx.min(d_ky),
            Self::Complete => d_kx.max(d_ky),
            Self::Average => (n_x as f64 * d_kx + n_y as f64 * d_ky) / (n_x + n_y) as f64,
            Self::Ward => {
                let (n_x, n_y, n_k) = (n_x as f64, n_y as f64, n_k as f64);
                let numerator = (n_x + n_k) * d_kx * d_kx + (n_y + n_k) * d_ky * d_ky
                    - n_k * d_xy * d_xy;
                (numerator / (n_x + n_y + n_k)).max(0.0).sqrt()
            }
        }
    }
}

/// One agglomeration step.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Full merge tree over `labels`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Dendrogram {
    pub labels: Vec<MemberKey>,
    pub linkage: Linkage,
    pub merges: Vec<Merge>,
}

impl Dendrogram {
    pub fn n_leaves(&self) -> usize {
        self.labels.len()
    }

    /// Cuts the tree into exactly `k` flat clusters.
    pub fn cut(&self, k: usize) -> Result<ClusterAssignment, CodError> {
        let n = self.n_leaves();
        if k == 0 || k > n {
            return Err(CodError::invalid_input(format!(
                "cut requires 1 <= k <= {n}; got k={k}"
            )));
        }

        let mut sets = DisjointSets::new(2 * n - 1);
        for (step, merge) in self.merges.iter().take(n - k).enumerate() {
            sets.union_into(merge.left, n + step);
            sets.union_into(merge.right, n + step);
        }
        let roots: Vec<usize> = (0..n).map(|leaf| sets.find(leaf)).collect();
        ClusterAssignment::from_labels(self.labels.clone(), &roots)
    }

    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }
}

/// Builds the merge tree for `points` under `linkage`.
pub fn agglomerate(points: &PointMatrix, linkage: Linkage) -> Result<Dendrogram, CodError> {
    let n = points.n_points();
    let mut distances = CondensedDistances::euclidean(points)?;
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    // (slot x, slot y, distance); slot y keeps the merged cluster.
    let mut found: Vec<(usize, usize, f64)> = Vec::with_capacity(n.saturating_sub(1));

    for _ in 1..n {
        if chain.is_empty() {
            let first = active
                .iter()
                .position(|&a| a)
                .ok_or_else(|| CodError::numerical_issue("no active clusters left to merge"))?;
            chain.push(first);
        }

        let (a, b, d_ab) = loop {
            let a = chain[chain.len() - 1];
            let previous = (chain.len() >= 2).then(|| chain[chain.len() - 2]);
            let (mut best, mut best_distance) = match previous {
                Some(p) => (p, distances.get(a, p)),
                None => (usize::MAX, f64::INFINITY),
            };
            for candidate in (0..n).filter(|&c| active[c] && c != a) {
                let d = distances.get(a, candidate);
                if d < best_distance {
                    best = candidate;
                    best_distance = d;
                }
            }
            if best == usize::MAX || !best_distance.is_finite() {
                return Err(CodError::numerical_issue(format!(
                    "no finite nearest neighbor for cluster slot {a}"
                )));
            }
            if Some(best) == previous {
                break (a, best, best_distance);
            }
            chain.push(best);
        };
        chain.truncate(chain.len() - 2);

        let (x, y) = (a.min(b), a.max(b));
        found.push((x, y, d_ab));
        active[x] = false;
        for k in (0..n).filter(|&k| active[k] && k != y) {
            let updated = linkage.update(
                distances.get(k, x),
                distances.get(k, y),
                d_ab,
                size[x],
                size[y],
                size[k],
            );
            distances.set(k, y, updated);
        }
        size[y] += size[x];
    }

    found.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut sets = DisjointSets::new(2 * n - 1);
    let mut cluster_size = vec![1usize; 2 * n - 1];
    let merges = found
        .into_iter()
        .enumerate()
        .map(|(step, (x, y, distance))| {
            let (rx, ry) = (sets.find(x), sets.find(y));
            let id = n + step;
            cluster_size[id] = cluster_size[rx] + cluster_size[ry];
            sets.union_into(rx, id);
            sets.union_into(ry, id);
            Merge {
                left: rx.min(ry),
                right: rx.max(ry),
                distance,
                size: cluster_size[id],
            }
        })
        .collect();

    tracing::debug!(points = n, ?linkage, "agglomeration complete");
    Ok(Dendrogram {
        labels: points.labels().to_vec(),
        linkage,
        merges,
    })
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    /// Attaches the tree containing `node` under `root`.
    fn union_into(&mut self, node: usize, root: usize) {
        let node_root = self.find(node);
        self.parent[node_root] = root;
    }
}

#[cfg(test)]
mod tests {
    use super::{Linkage, agglomerate};
    use cod_core::{MemberKey, PointMatrix};

    fn line(xs: &[f64]) -> PointMatrix {
        PointMatrix::new(
            (0..xs.len()).map(|i| MemberKey::Cause(format!("p{i}"))).collect(),
            vec!["x".to_string()],
            xs.to_vec(),
        )
        .expect("points are valid")
    }

    #[test]
    fn single_linkage_on_a_line_merges_nearest_first() {
        let tree = agglomerate(&line(&[0.0, 1.0, 5.0, 6.5]), Linkage::Single).expect("tree builds");
        assert_eq!(tree.merges.len(), 3);
        assert_eq!((tree.merges[0].left, tree.merges[0].right), (0, 1));
        assert!((tree.merges[0].distance - 1.0).abs() < 1e-12);
        assert_eq!((tree.merges[1].left, tree.merges[1].right), (2, 3));
        assert!((tree.merges[1].distance - 1.5).abs() < 1e-12);
        assert_eq!((tree.merges[2].left, tree.merges[2].right), (4, 5));
        assert!((tree.merges[2].distance - 4.0).abs() < 1e-12);
        assert_eq!(tree.merges[2].size, 4);
    }

    #[test]
    fn complete_and_average_use_farthest_and_mean_distances() {
        let points = line(&[0.0, 1.0, 5.0, 6.5]);
        let complete = agglomerate(&points, Linkage::Complete).expect("tree builds");
        assert!((complete.merges[2].distance - 6.5).abs() < 1e-12);
        let average = agglomerate(&points, Linkage::Average).expect("tree builds");
        let expected = (5.0 + 6.5 + 4.0 + 5.5) / 4.0;
        assert!((average.merges[2].distance - expected).abs() < 1e-12);
    }

    #[test]
    fn ward_height_matches_closed_form() {
        // Ward distance between clusters A and B is
        // sqrt(2 * |A||B| / (|A|+|B|)) * ||mean(A) - mean(B)||.
        let tree = agglomerate(&line(&[0.0, 2.0, 10.0, 12.0]), Linkage::Ward).expect("tree builds");
        let last = tree.merges[2];
        let expected = (2.0f64 * 2.0 * 2.0 / 4.0).sqrt() * 10.0;
        assert!((last.distance - expected).abs() < 1e-9);
        assert!((tree.merges[0].distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn heights_are_monotone() {
        let xs = [0.3, 9.1, 2.2, 4.8, 7.7, 1.0, 5.5, 3.3];
        for linkage in [Linkage::Single, Linkage::Average, Linkage::Complete, Linkage::Ward] {
            let tree = agglomerate(&line(&xs), linkage).expect("tree builds");
            let heights = tree.heights();
            assert!(heights.windows(2).all(|w| w[0] <= w[1]), "{linkage:?}: {heights:?}");
            assert_eq!(tree.merges.last().map(|m| m.size), Some(xs.len()));
        }
    }

    #[test]
    fn cut_yields_requested_cluster_count() {
        let tree = agglomerate(&line(&[0.0, 1.0, 5.0, 6.5, 20.0]), Linkage::Average)
            .expect("tree builds");
        let two = tree.cut(2).expect("cut at 2");
        assert_eq!(two.k(), 2);
        assert_eq!(two.cluster_ids(), &[0, 0, 0, 0, 1]);
        let three = tree.cut(3).expect("cut at 3");
        assert_eq!(three.cluster_ids(), &[0, 0, 1, 1, 2]);
        let all = tree.cut(5).expect("cut at n");
        assert_eq!(all.cluster_ids(), &[0, 1, 2, 3, 4]);
        assert_eq!(tree.cut(1).expect("cut at 1").cluster_ids(), &[0; 5]);
        assert!(tree.cut(0).is_err());
        assert!(tree.cut(6).is_err());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let xs = [1.0, 1.0, 2.0, 2.0, 3.0, 8.0, 8.0, 9.0];
        let a = agglomerate(&line(&xs), Linkage::Ward).expect("tree builds");
        let b = agglomerate(&line(&xs), Linkage::Ward).expect("tree builds");
        assert_eq!(a, b);
        assert_eq!(a.cut(3).expect("cut"), b.cut(3).expect("cut"));
    }

    #[test]
    fn single_point_has_no_merges() {
        let tree = agglomerate(&line(&[4.0]), Linkage::Single).expect("tree builds");
        assert!(tree.merges.is_empty());
        assert_eq!(tree.cut(1).expect("cut").k(), 1);
    }
}
