// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::CodError;
use cod_pipeline::{AnalysisConfig, AnalysisReport, InMemoryProvider, run_analysis};

/// Runs an analysis over an in-memory table bundle.
pub fn run_bundle(
    bundle: &InMemoryProvider,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, CodError> {
    run_analysis(bundle, config)
}

/// Parses a JSON table bundle and optional JSON config, then runs the analysis.
pub fn run_bundle_json(
    bundle_json: &str,
    config_json: Option<&str>,
) -> Result<AnalysisReport, CodError> {
    let bundle = InMemoryProvider::from_json_str(bundle_json)?;
    let config = match config_json {
        Some(raw) => AnalysisConfig::from_json_str(raw)?,
        None => AnalysisConfig::default(),
    };
    run_bundle(&bundle, &config)
}
