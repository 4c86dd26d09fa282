// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod config;
pub mod pipeline;
pub mod provider;

pub use config::{AnalysisConfig, ClusteringConfig, ModeConfig};
pub use pipeline::{
    AnalysisReport, DatasetOutcome, DatasetReport, IntegratedDataset, ModeReport, PrimaryReport,
    cluster_mode, integrate, run_analysis,
};
pub use provider::{InMemoryProvider, TableProvider};
