// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Clustering of causes (variable mode) and records (observation mode):
//! agglomerative merge trees, seeded k-means, the elbow curve and cluster
//! profiling.

pub mod assignment;
pub mod distance;
pub mod elbow;
pub mod hierarchical;
pub mod kmeans;
pub mod profile;
pub mod scaling;

pub use assignment::{Cluster, ClusterAssignment};
pub use distance::{CondensedDistances, euclidean, squared_euclidean};
pub use elbow::{ElbowPoint, elbow_k, wcss_curve};
pub use hierarchical::{Dendrogram, Linkage, Merge, agglomerate};
pub use kmeans::{KMeansConfig, KMeansResult, RestartSummary, kmeans};
pub use profile::{AbsoluteValue, ClusterProfile, ClusterProfiler, RelativeScore};
pub use scaling::{ClusterMode, scaled_points, standardize_columns, standardize_rows};
