// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Preparation stages that run before any analysis: canonical keys,
//! missing-data policy and compositional normalization.

pub mod compose;
pub mod keys;
pub mod missing;

pub use compose::{Composition, normalize_composition};
pub use keys::{
    CategoryMapping, DroppedRow, ExclusionList, ExclusionReason, KeyNormalization, KeyNormalizer,
    SchemaSpec,
};
pub use missing::{
    ColumnDecision, ColumnPolicy, DecisionBasis, InformativeTest, MissingPolicyConfig,
    MissingPolicyEngine, PolicyOutcome, PolicyRecord, YEAR_PROBE,
};
