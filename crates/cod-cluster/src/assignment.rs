// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{CodError, MemberKey};

/// Flat partition of points into `k` clusters.
///
/// Every input point appears exactly once. Cluster ids are canonical: they
/// are numbered by first appearance in input order, so two runs that find
/// the same partition produce identical assignments.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterAssignment {
    members: Vec<MemberKey>,
    cluster_ids: Vec<usize>,
    k: usize,
}

/// One materialized cluster.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub centroid: Option<Vec<f64>>,
    pub members: Vec<MemberKey>,
}

impl ClusterAssignment {
    /// Builds an assignment from raw labels, renumbering them canonically.
    pub fn from_labels(members: Vec<MemberKey>, labels: &[usize]) -> Result<Self, CodError> {
        if members.len() != labels.len() {
            return Err(CodError::invalid_input(format!(
                "assignment length mismatch: {} members, {} labels",
                members.len(),
                labels.len()
            )));
        }
        let (cluster_ids, k) = canonical_labels(labels);
        Ok(Self {
            members,
            cluster_ids,
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn members(&self) -> &[MemberKey] {
        &self.members
    }

    pub fn cluster_ids(&self) -> &[usize] {
        &self.cluster_ids
    }

    pub fn cluster_of(&self, member: &MemberKey) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m == member)
            .map(|idx| self.cluster_ids[idx])
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &id in &self.cluster_ids {
            sizes[id] += 1;
        }
        sizes
    }

    /// Groups members by cluster, attaching centroids when supplied.
    pub fn clusters(&self, centroids: Option<&[Vec<f64>]>) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = (0..self.k)
            .map(|id| Cluster {
                id,
                centroid: centroids.and_then(|c| c.get(id).cloned()),
                members: vec![],
            })
            .collect();
        for (member, &id) in self.members.iter().zip(&self.cluster_ids) {
            clusters[id].members.push(member.clone());
        }
        clusters
    }
}

/// Renumbers labels by first appearance. Returns the new labels and the
/// number of distinct clusters.
pub(crate) fn canonical_labels(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: Vec<(usize, usize)> = vec![];
    let relabeled = labels
        .iter()
        .map(|&label| match mapping.iter().find(|(old, _)| *old == label) {
            Some(&(_, new)) => new,
            None => {
                let new = mapping.len();
                mapping.push((label, new));
                new
            }
        })
        .collect();
    (relabeled, mapping.len())
}
