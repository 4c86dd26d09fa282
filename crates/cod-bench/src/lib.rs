// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Seeded synthetic panels shared by the benchmarks.

use cod_core::{Cell, CodError, Column, EntityYear, MemberKey, NormalizedMatrix, PointMatrix, Table};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `n` points in `d` dimensions drawn around `centers` well-separated centers.
pub fn blob_points(n: usize, d: usize, centers: usize, seed: u64) -> Result<PointMatrix, CodError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(n * d);
    for idx in 0..n {
        let center = (idx % centers.max(1)) as f64 * 10.0;
        values.extend((0..d).map(|_| center + rng.gen_range(-1.0..1.0)));
    }
    PointMatrix::new(
        (0..n).map(|idx| MemberKey::Cause(format!("p{idx}"))).collect(),
        (0..d).map(|dim| format!("d{dim}")).collect(),
        values,
    )
}

/// Record keys for `n` rows: 200 entities per year.
pub fn panel_keys(n: usize) -> Vec<EntityYear> {
    (0..n)
        .map(|idx| EntityYear::new(format!("E{}", idx % 200), 1990 + (idx / 200) as i32))
        .collect()
}

/// Random compositions over `causes` causes.
pub fn composition(n: usize, causes: usize, seed: u64) -> Result<NormalizedMatrix, CodError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(n * causes);
    for _ in 0..n {
        let counts: Vec<f64> = (0..causes).map(|_| rng.gen_range(1.0..100.0)).collect();
        let total: f64 = counts.iter().sum();
        values.extend(counts.iter().map(|c| c / total));
    }
    NormalizedMatrix::new(
        panel_keys(n),
        (0..causes).map(|c| format!("cause{c}")).collect(),
        values,
    )
}

/// Covariate table over the first `n` panel keys with `columns` columns and
/// roughly `missing_rate` of cells missing.
pub fn covariate_table(
    name: &str,
    n: usize,
    columns: usize,
    missing_rate: f64,
    seed: u64,
) -> Result<Table, CodError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let columns = (0..columns)
        .map(|col| {
            let cells = (0..n)
                .map(|_| {
                    if rng.gen_bool(missing_rate) {
                        Cell::Missing
                    } else {
                        Cell::Value(rng.gen_range(0.0..1.0e4))
                    }
                })
                .collect();
            Column::value(format!("{name}_{col}"), cells)
        })
        .collect();
    Table::new(name, panel_keys(n), columns)
}
