// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{CodError, EntityYear};

pub const ENTITY_COLUMN: &str = "Entity";
pub const CODE_COLUMN: &str = "Code";
pub const YEAR_COLUMN: &str = "Year";

/// Untyped cell as delivered by a table provider.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Clone, Debug, PartialEq)]
pub enum RawCell {
    Number(f64),
    Text(String),
    Empty,
}

impl RawCell {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Number(_) => false,
        }
    }

    /// Interprets the cell as a numeric value, treating blanks as missing.
    pub fn to_cell(&self) -> Result<Cell, CodError> {
        match self {
            Self::Number(value) if value.is_finite() => Ok(Cell::Value(*value)),
            Self::Number(value) => Err(CodError::numerical_issue(format!(
                "non-finite numeric cell: {value}"
            ))),
            Self::Empty => Ok(Cell::Missing),
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(Cell::Missing);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(Cell::Value)
                    .ok_or_else(|| {
                        CodError::invalid_input(format!("cell '{trimmed}' is not numeric"))
                    })
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// A source table in its delivered shape: named header plus rows.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<RawCell>>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Value columns are everything that is not a key column, in header order.
    pub fn value_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|name| ![ENTITY_COLUMN, CODE_COLUMN, YEAR_COLUMN].contains(name))
            .collect()
    }
}

/// Numeric cell with an explicit missing tag, distinct from zero.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Cell {
    Value(f64),
    Missing,
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(*value),
            Self::Missing => None,
        }
    }
}

/// Role of a column in a keyed table.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Observed measurement.
    Value,
    /// Binary indicator (1 = missing) derived from the named source column.
    MissingIndicator { source: String },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn value(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Value,
            cells,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_missing()).count()
    }

    /// Fraction of missing cells; zero for an empty column.
    pub fn missing_rate(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.missing_count() as f64 / self.cells.len() as f64
    }
}

/// Key-unique table produced by key normalization.
///
/// Every transformation returns a new `Table`; nothing is mutated in place.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    name: String,
    keys: Vec<EntityYear>,
    columns: Vec<Column>,
}

impl Table {
    /// Builds a table, validating that every column has one cell per key.
    pub fn new(
        name: impl Into<String>,
        keys: Vec<EntityYear>,
        columns: Vec<Column>,
    ) -> Result<Self, CodError> {
        let name = name.into();
        if let Some(column) = columns.iter().find(|c| c.cells.len() != keys.len()) {
            return Err(CodError::invalid_input(format!(
                "table '{name}': column '{}' has {} cells, expected {}",
                column.name,
                column.cells.len(),
                keys.len()
            )));
        }
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx].iter().any(|other| other.name == column.name) {
                return Err(CodError::data_integrity(format!(
                    "table '{name}': duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self {
            name,
            keys,
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[EntityYear] {
        &self.keys
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.keys.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn value_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|column| column.kind == ColumnKind::Value)
    }

    /// True when any value column of row `row` is missing.
    pub fn row_is_incomplete(&self, row: usize) -> bool {
        self.value_columns().any(|column| column.cells[row].is_missing())
    }

    /// Number of rows with at least one missing value cell.
    pub fn incomplete_row_count(&self) -> usize {
        (0..self.n_rows())
            .filter(|&row| self.row_is_incomplete(row))
            .count()
    }

    /// Share of rows with at least one missing value cell.
    pub fn incomplete_row_share(&self) -> f64 {
        if self.keys.is_empty() {
            return 0.0;
        }
        self.incomplete_row_count() as f64 / self.n_rows() as f64
    }

    /// Returns a copy without the named column.
    pub fn without_column(&self, name: &str) -> Result<Self, CodError> {
        if self.column(name).is_none() {
            return Err(CodError::invalid_input(format!(
                "table '{}' has no column '{name}'",
                self.name
            )));
        }
        let columns = self
            .columns
            .iter()
            .filter(|column| column.name != name)
            .cloned()
            .collect();
        Self::new(self.name.clone(), self.keys.clone(), columns)
    }

    /// Returns a copy with `column` appended.
    pub fn with_column(&self, column: Column) -> Result<Self, CodError> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self::new(self.name.clone(), self.keys.clone(), columns)
    }

    /// Returns a copy keeping only rows for which `keep` returns true.
    pub fn retain_rows(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let kept: Vec<usize> = (0..self.n_rows()).filter(|&row| keep(row)).collect();
        let keys = kept.iter().map(|&row| self.keys[row].clone()).collect();
        let columns = self
            .columns
            .iter()
            .map(|column| Column {
                name: column.name.clone(),
                kind: column.kind.clone(),
                cells: kept.iter().map(|&row| column.cells[row]).collect(),
            })
            .collect();
        Self {
            name: self.name.clone(),
            keys,
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, Column, ColumnKind, RawCell, RawTable, Table};
    use crate::EntityYear;

    fn sample_table() -> Table {
        Table::new(
            "sample",
            vec![
                EntityYear::new("A", 2000),
                EntityYear::new("B", 2000),
                EntityYear::new("C", 2000),
                EntityYear::new("D", 2000),
            ],
            vec![
                Column::value(
                    "x",
                    vec![Cell::Value(1.0), Cell::Missing, Cell::Value(3.0), Cell::Value(4.0)],
                ),
                Column::value(
                    "y",
                    vec![Cell::Value(0.0), Cell::Value(2.0), Cell::Missing, Cell::Missing],
                ),
            ],
        )
        .expect("sample table should be valid")
    }

    #[test]
    fn raw_cell_distinguishes_zero_from_blank() {
        assert_eq!(
            RawCell::Number(0.0).to_cell().expect("zero parses"),
            Cell::Value(0.0)
        );
        assert_eq!(
            RawCell::Text("  ".to_string()).to_cell().expect("blank parses"),
            Cell::Missing
        );
        assert_eq!(
            RawCell::Text("2.5".to_string()).to_cell().expect("text number parses"),
            Cell::Value(2.5)
        );
        assert!(RawCell::Text("n/a".to_string()).to_cell().is_err());
        assert!(RawCell::Number(f64::NAN).to_cell().is_err());
    }

    #[test]
    fn raw_table_value_columns_skip_key_columns() {
        let raw = RawTable::new(
            "t",
            vec![
                "Entity".to_string(),
                "Code".to_string(),
                "Year".to_string(),
                "Malaria".to_string(),
                "Drowning".to_string(),
            ],
            vec![],
        );
        assert_eq!(raw.value_columns(), vec!["Malaria", "Drowning"]);
        assert_eq!(raw.column_index("Year"), Some(2));
    }

    #[test]
    fn missing_statistics_are_per_column_and_per_row() {
        let table = sample_table();
        let x = table.column("x").expect("x exists");
        let y = table.column("y").expect("y exists");
        assert_eq!(x.missing_count(), 1);
        assert!((y.missing_rate() - 0.5).abs() < 1e-12);
        assert_eq!(table.incomplete_row_count(), 3);
        assert!((table.incomplete_row_share() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn transformations_return_new_tables() {
        let table = sample_table();
        let without_y = table.without_column("y").expect("y can be dropped");
        assert_eq!(without_y.columns().len(), 1);
        assert_eq!(table.columns().len(), 2);

        let complete = table.retain_rows(|row| !table.row_is_incomplete(row));
        assert_eq!(complete.keys(), &[EntityYear::new("A", 2000)]);
        assert_eq!(table.n_rows(), 4);
    }

    #[test]
    fn indicator_columns_are_not_value_columns() {
        let table = sample_table()
            .with_column(Column {
                name: "y_missing".to_string(),
                kind: ColumnKind::MissingIndicator {
                    source: "y".to_string(),
                },
                cells: vec![Cell::Value(0.0), Cell::Value(0.0), Cell::Value(1.0), Cell::Value(1.0)],
            })
            .expect("indicator column fits");
        let names: Vec<&str> = table.value_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn new_rejects_ragged_and_duplicate_columns() {
        let keys = vec![EntityYear::new("A", 2000)];
        let ragged = Table::new("t", keys.clone(), vec![Column::value("x", vec![])]);
        assert!(ragged.is_err());

        let duplicate = Table::new(
            "t",
            keys,
            vec![
                Column::value("x", vec![Cell::Value(1.0)]),
                Column::value("x", vec![Cell::Value(2.0)]),
            ],
        );
        let err = duplicate.expect_err("duplicate column names must fail");
        assert!(err.to_string().contains("duplicate column name"));
    }
}
