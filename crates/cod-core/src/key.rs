// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::fmt;

/// Canonical panel identity: one region or country observed in one year.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityYear {
    pub entity: String,
    pub year: i32,
}

impl EntityYear {
    pub fn new(entity: impl Into<String>, year: i32) -> Self {
        Self {
            entity: entity.into(),
            year,
        }
    }
}

impl fmt::Display for EntityYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.entity, self.year)
    }
}

/// Identity of a clustered point.
///
/// Variable-mode clustering groups causes; observation-mode clustering groups
/// entity-year records.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKey {
    Cause(String),
    Record(EntityYear),
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cause(name) => f.write_str(name),
            Self::Record(key) => key.fmt(f),
        }
    }
}
