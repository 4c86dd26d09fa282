// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{CodError, RawTable};
use serde::{Deserialize, Serialize};

/// Source of raw tables for one analysis run. Loading, caching and file
/// formats live behind this trait.
pub trait TableProvider {
    /// The cause-of-death table whose value columns are causes.
    fn primary(&self) -> Result<RawTable, CodError>;

    /// Names of the covariate tables, in the order they are reported.
    fn covariate_names(&self) -> Vec<String>;

    fn covariate(&self, name: &str) -> Result<RawTable, CodError>;
}

/// Fully loaded tables, as read from a JSON bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InMemoryProvider {
    pub primary: RawTable,
    #[serde(default)]
    pub covariates: Vec<RawTable>,
}

impl InMemoryProvider {
    pub fn new(primary: RawTable, covariates: Vec<RawTable>) -> Self {
        Self {
            primary,
            covariates,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CodError> {
        serde_json::from_str(raw)
            .map_err(|err| CodError::invalid_input(format!("invalid table bundle JSON: {err}")))
    }
}

impl TableProvider for InMemoryProvider {
    fn primary(&self) -> Result<RawTable, CodError> {
        Ok(self.primary.clone())
    }

    fn covariate_names(&self) -> Vec<String> {
        self.covariates.iter().map(|table| table.name.clone()).collect()
    }

    fn covariate(&self, name: &str) -> Result<RawTable, CodError> {
        self.covariates
            .iter()
            .find(|table| table.name == name)
            .cloned()
            .ok_or_else(|| CodError::data_integrity(format!("no covariate table named '{name}'")))
    }
}
