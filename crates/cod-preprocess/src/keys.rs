// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{
    CODE_COLUMN, Cell, CodError, Column, Diagnostics, ENTITY_COLUMN, EntityYear, RawCell,
    RawTable, Table, YEAR_COLUMN,
};
use std::collections::{BTreeSet, HashMap};

/// Curated entity lists removed during key normalization.
///
/// Nothing here is inferred: an entity is removed only when it is named.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionList {
    /// Regional or income-group aggregates such as "World".
    pub aggregates: BTreeSet<String>,
    /// Dissolved states whose years are covered by their successors.
    pub dissolved: BTreeSet<String>,
    /// Administrative subdivisions of an entity already in the panel.
    pub subdivisions: BTreeSet<String>,
}

impl ExclusionList {
    pub fn reason_for(&self, entity: &str) -> Option<ExclusionReason> {
        if self.subdivisions.contains(entity) {
            Some(ExclusionReason::Subdivision)
        } else if self.dissolved.contains(entity) {
            Some(ExclusionReason::DissolvedPredecessor)
        } else if self.aggregates.contains(entity) {
            Some(ExclusionReason::Aggregate)
        } else {
            None
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExclusionReason {
    Aggregate,
    DissolvedPredecessor,
    Subdivision,
}

/// One output category assembled from one or more source columns.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryMapping {
    pub name: String,
    pub sources: Vec<String>,
}

/// Expected value-column schema and its rename/category mapping.
///
/// An empty `categories` list keeps the source columns under their own names.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaSpec {
    pub expected_columns: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub categories: Vec<CategoryMapping>,
}

impl SchemaSpec {
    /// Checks the delivered value columns against the expected schema.
    pub fn validate_against(&self, raw: &RawTable) -> Result<(), CodError> {
        let actual = raw.value_columns();
        if actual.len() != self.expected_columns.len() {
            return Err(CodError::data_integrity(format!(
                "table '{}': expected {} value columns, got {}",
                raw.name,
                self.expected_columns.len(),
                actual.len()
            )));
        }
        let actual_set: BTreeSet<&str> = actual.iter().copied().collect();
        let missing: Vec<&str> = self
            .expected_columns
            .iter()
            .map(String::as_str)
            .filter(|name| !actual_set.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(CodError::data_integrity(format!(
                "table '{}': expected columns not found: {}",
                raw.name,
                missing.join(", ")
            )));
        }

        let mut used = BTreeSet::new();
        for category in &self.categories {
            if category.sources.is_empty() {
                return Err(CodError::invalid_input(format!(
                    "category '{}' has no source columns",
                    category.name
                )));
            }
            for source in &category.sources {
                if !self.expected_columns.contains(source) {
                    return Err(CodError::invalid_input(format!(
                        "category '{}' maps unknown column '{source}'",
                        category.name
                    )));
                }
                if !used.insert(source.as_str()) {
                    return Err(CodError::invalid_input(format!(
                        "column '{source}' is mapped to more than one category"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedRow {
    pub key: EntityYear,
    pub reason: ExclusionReason,
}

/// Result of key normalization for one dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyNormalization {
    pub table: Table,
    pub dropped: Vec<DroppedRow>,
    /// Entities kept even though their code is empty.
    pub kept_without_code: BTreeSet<String>,
    pub diagnostics: Diagnostics,
}

/// Builds the canonical (Entity, Year) key for raw tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyNormalizer {
    exclusions: ExclusionList,
}

impl KeyNormalizer {
    pub fn new(exclusions: ExclusionList) -> Self {
        Self { exclusions }
    }

    pub fn exclusions(&self) -> &ExclusionList {
        &self.exclusions
    }

    /// Normalizes `raw` into a key-unique table.
    ///
    /// Fails with a data-integrity error when key columns are absent, the
    /// schema does not match, no rows survive, or two rows share a key.
    pub fn normalize(
        &self,
        raw: &RawTable,
        schema: Option<&SchemaSpec>,
    ) -> Result<KeyNormalization, CodError> {
        let mut diagnostics = Diagnostics::for_stage("key_normalization");
        diagnostics.rows_in = raw.rows.len();

        let entity_idx = required_column(raw, ENTITY_COLUMN)?;
        let year_idx = required_column(raw, YEAR_COLUMN)?;
        let code_idx = raw.column_index(CODE_COLUMN);

        if let Some(schema) = schema {
            schema.validate_against(raw)?;
        }
        let layout = output_layout(raw, schema)?;

        let mut keys = Vec::with_capacity(raw.rows.len());
        let mut cells: Vec<Vec<Cell>> = vec![Vec::with_capacity(raw.rows.len()); layout.len()];
        let mut dropped = vec![];
        let mut kept_without_code = BTreeSet::new();
        let mut seen: HashMap<EntityYear, usize> = HashMap::with_capacity(raw.rows.len());

        for (row_idx, row) in raw.rows.iter().enumerate() {
            if row.len() != raw.columns.len() {
                return Err(CodError::data_integrity(format!(
                    "table '{}' row {row_idx}: {} cells for {} columns",
                    raw.name,
                    row.len(),
                    raw.columns.len()
                )));
            }
            let key = EntityYear {
                entity: parse_entity(&row[entity_idx], &raw.name, row_idx)?,
                year: parse_year(&row[year_idx], &raw.name, row_idx)?,
            };

            if let Some(reason) = self.exclusions.reason_for(&key.entity) {
                dropped.push(DroppedRow { key, reason });
                continue;
            }
            if code_idx.is_none_or(|idx| row[idx].is_empty()) {
                kept_without_code.insert(key.entity.clone());
            }

            if let Some(first) = seen.insert(key.clone(), row_idx) {
                return Err(CodError::data_integrity(format!(
                    "table '{}': unresolved duplicate key {key} at rows {first} and {row_idx}",
                    raw.name
                )));
            }

            for (slot, sources) in layout.iter().enumerate() {
                cells[slot].push(combine_sources(row, &sources.1, &raw.name, row_idx)?);
            }
            keys.push(key);
        }

        if keys.is_empty() {
            return Err(CodError::data_integrity(format!(
                "table '{}' has zero rows after key normalization",
                raw.name
            )));
        }

        for entity in &kept_without_code {
            diagnostics.note(format!("kept '{entity}' with empty code: not on an exclusion list"));
        }
        diagnostics.note(format!(
            "dropped {} rows via exclusion lists ({} distinct entities)",
            dropped.len(),
            dropped
                .iter()
                .map(|row| row.key.entity.as_str())
                .collect::<BTreeSet<_>>()
                .len()
        ));
        diagnostics.rows_out = keys.len();

        let columns = layout
            .into_iter()
            .zip(cells)
            .map(|((name, _), cells)| Column::value(name, cells))
            .collect();
        let table = Table::new(raw.name.clone(), keys, columns)?;

        tracing::info!(
            dataset = %raw.name,
            rows_in = diagnostics.rows_in,
            rows_out = diagnostics.rows_out,
            dropped = dropped.len(),
            "key normalization complete"
        );

        Ok(KeyNormalization {
            table,
            dropped,
            kept_without_code,
            diagnostics,
        })
    }
}

fn required_column(raw: &RawTable, name: &str) -> Result<usize, CodError> {
    raw.column_index(name).ok_or_else(|| {
        CodError::data_integrity(format!(
            "table '{}' is missing required key column '{name}'",
            raw.name
        ))
    })
}

/// Output columns as (name, source column indices).
fn output_layout(
    raw: &RawTable,
    schema: Option<&SchemaSpec>,
) -> Result<Vec<(String, Vec<usize>)>, CodError> {
    let index_of = |name: &str| {
        raw.column_index(name).ok_or_else(|| {
            CodError::data_integrity(format!("table '{}' has no column '{name}'", raw.name))
        })
    };

    match schema {
        Some(schema) if !schema.categories.is_empty() => schema
            .categories
            .iter()
            .map(|category| {
                let sources = category
                    .sources
                    .iter()
                    .map(|source| index_of(source))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((category.name.clone(), sources))
            })
            .collect(),
        _ => raw
            .value_columns()
            .into_iter()
            .map(|name| Ok((name.to_string(), vec![index_of(name)?])))
            .collect(),
    }
}

fn parse_entity(cell: &RawCell, table: &str, row: usize) -> Result<String, CodError> {
    match cell.as_text().map(str::trim) {
        Some(entity) if !entity.is_empty() => Ok(entity.to_string()),
        _ => Err(CodError::data_integrity(format!(
            "table '{table}' row {row}: Entity must be a non-empty string"
        ))),
    }
}

fn parse_year(cell: &RawCell, table: &str, row: usize) -> Result<i32, CodError> {
    let parsed = match cell {
        RawCell::Number(value) if value.fract() == 0.0 && value.abs() <= f64::from(i32::MAX) => {
            Some(*value as i32)
        }
        RawCell::Text(text) => text.trim().parse::<i32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        CodError::data_integrity(format!(
            "table '{table}' row {row}: Year must be an integer, got {cell:?}"
        ))
    })
}

/// Sums the source cells of one category; missing if any source is missing.
fn combine_sources(
    row: &[RawCell],
    sources: &[usize],
    table: &str,
    row_idx: usize,
) -> Result<Cell, CodError> {
    let mut total = 0.0;
    for &source in sources {
        let cell = row[source].to_cell().map_err(|err| {
            CodError::data_integrity(format!("table '{table}' row {row_idx}: {err}"))
        })?;
        match cell {
            Cell::Value(value) => total += value,
            Cell::Missing => return Ok(Cell::Missing),
        }
    }
    Ok(Cell::Value(total))
}
