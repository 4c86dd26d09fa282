// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{
    CodError, Diagnostics, EntityYear, NormalizedMatrix, RowExclusion, Table, Warning,
};

/// Output of compositional normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct Composition {
    pub matrix: NormalizedMatrix,
    pub excluded: Vec<(EntityYear, RowExclusion)>,
    pub diagnostics: Diagnostics,
}

/// Converts per-cause counts into per-record proportions.
///
/// Uses every value column of `table` as a cause; indicator columns are
/// ignored. Rows with a zero total, a negative count or a missing count are
/// excluded and reported as warnings rather than carried as undefined values.
pub fn normalize_composition(table: &Table) -> Result<Composition, CodError> {
    let mut diagnostics = Diagnostics::for_stage("composition");
    diagnostics.rows_in = table.n_rows();

    let causes: Vec<&str> = table.value_columns().map(|c| c.name.as_str()).collect();
    if causes.is_empty() {
        return Err(CodError::data_integrity(format!(
            "table '{}' has no cause columns to normalize",
            table.name()
        )));
    }

    let mut keys = Vec::with_capacity(table.n_rows());
    let mut values = Vec::with_capacity(table.n_rows() * causes.len());
    let mut excluded = vec![];
    let mut counts = Vec::with_capacity(causes.len());

    for (row, key) in table.keys().iter().enumerate() {
        counts.clear();
        let mut exclusion = None;
        for column in table.value_columns() {
            match column.cells[row].value() {
                None => {
                    exclusion = Some(RowExclusion::MissingCount {
                        cause: column.name.clone(),
                    });
                    break;
                }
                Some(count) if count < 0.0 => {
                    exclusion = Some(RowExclusion::NegativeCount {
                        cause: column.name.clone(),
                    });
                    break;
                }
                Some(count) => counts.push(count),
            }
        }

        let total: f64 = counts.iter().sum();
        if exclusion.is_none() && total <= 0.0 {
            exclusion = Some(RowExclusion::ZeroTotal);
        }
        if let Some(reason) = exclusion {
            diagnostics.warn(Warning::Normalization {
                key: key.clone(),
                reason: reason.clone(),
            });
            excluded.push((key.clone(), reason));
            continue;
        }

        values.extend(counts.iter().map(|count| count / total));
        keys.push(key.clone());
    }

    if keys.is_empty() {
        return Err(CodError::data_integrity(format!(
            "table '{}' has no rows with a positive total",
            table.name()
        )));
    }

    diagnostics.rows_out = keys.len();
    tracing::info!(
        dataset = %table.name(),
        rows = keys.len(),
        excluded = excluded.len(),
        causes = causes.len(),
        "compositional normalization complete"
    );

    let causes = causes.into_iter().map(str::to_string).collect();
    let matrix = NormalizedMatrix::new(keys, causes, values)?;
    Ok(Composition {
        matrix,
        excluded,
        diagnostics,
    })
}
