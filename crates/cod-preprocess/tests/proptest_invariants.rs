// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{Cell, Column, EntityYear, ROW_SUM_TOLERANCE, RawCell, RawTable, Table};
use cod_preprocess::{ExclusionList, KeyNormalizer, normalize_composition};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use std::collections::BTreeSet;

const MIN_PROPTEST_CASES: u32 = 512;
const ENTITIES: [&str; 5] = ["Chad", "Peru", "World", "USSR", "Wales"];

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn exclusions() -> ExclusionList {
    ExclusionList {
        aggregates: BTreeSet::from(["World".to_string()]),
        dissolved: BTreeSet::from(["USSR".to_string()]),
        subdivisions: BTreeSet::from(["Wales".to_string()]),
    }
}

fn count_table(rows: &[Vec<Option<f64>>], n_causes: usize) -> Table {
    let keys = (0..rows.len())
        .map(|i| EntityYear::new(format!("E{i}"), 1990))
        .collect();
    let columns = (0..n_causes)
        .map(|j| {
            Column::value(
                format!("cause{j}"),
                rows.iter()
                    .map(|row| row[j].map_or(Cell::Missing, Cell::Value))
                    .collect(),
            )
        })
        .collect();
    Table::new("deaths", keys, columns).expect("generated table should be valid")
}

fn row_strategy(n_causes: usize) -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(
        prop_oneof![
            8 => (0.0f64..1.0e6).prop_map(Some),
            1 => Just(Some(0.0)),
            1 => Just(None),
        ],
        n_causes,
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn retained_rows_sum_to_one_and_undefined_rows_are_absent(
        (n_causes, rows) in (1usize..6).prop_flat_map(|d| {
            (Just(d), prop::collection::vec(row_strategy(d), 1..40))
        }),
    ) {
        let table = count_table(&rows, n_causes);
        let defined: Vec<bool> = rows
            .iter()
            .map(|row| row.iter().all(Option::is_some) && row.iter().flatten().sum::<f64>() > 0.0)
            .collect();

        match normalize_composition(&table) {
            Ok(composition) => {
                let matrix = &composition.matrix;
                prop_assert_eq!(matrix.n_rows(), defined.iter().filter(|d| **d).count());
                prop_assert_eq!(
                    matrix.n_rows() + composition.excluded.len(),
                    rows.len()
                );
                for row in 0..matrix.n_rows() {
                    let sum: f64 = matrix.row(row).iter().sum();
                    prop_assert!((sum - 1.0).abs() <= ROW_SUM_TOLERANCE, "row {} sums to {}", row, sum);
                    prop_assert!(matrix.row(row).iter().all(|p| (0.0..=1.0).contains(p)));
                }
                for (key, _) in &composition.excluded {
                    prop_assert!(matrix.row_index(key).is_none());
                }
            }
            Err(err) => {
                prop_assert!(defined.iter().all(|d| !d), "unexpected error: {}", err);
            }
        }
    }

    #[test]
    fn normalized_keys_are_unique_and_never_excluded(
        rows in prop::collection::vec((0usize..ENTITIES.len(), 1990i32..2000, 0.0f64..100.0), 1..60),
    ) {
        let mut seen = BTreeSet::new();
        let raw_rows: Vec<Vec<RawCell>> = rows
            .iter()
            .filter(|(entity, year, _)| seen.insert((*entity, *year)))
            .map(|(entity, year, value)| {
                vec![
                    RawCell::Text(ENTITIES[*entity].to_string()),
                    RawCell::Text("XX".to_string()),
                    RawCell::Number(f64::from(*year)),
                    RawCell::Number(*value),
                ]
            })
            .collect();
        let raw = RawTable::new(
            "deaths",
            vec!["Entity".to_string(), "Code".to_string(), "Year".to_string(), "Stroke".to_string()],
            raw_rows,
        );
        let normalizer = KeyNormalizer::new(exclusions());
        let list = exclusions();

        match normalizer.normalize(&raw, None) {
            Ok(normalized) => {
                let keys = normalized.table.keys();
                let unique: BTreeSet<&EntityYear> = keys.iter().collect();
                prop_assert_eq!(unique.len(), keys.len());
                prop_assert!(keys.iter().all(|key| list.reason_for(&key.entity).is_none()));
                prop_assert_eq!(keys.len() + normalized.dropped.len(), raw.rows.len());
            }
            Err(err) => {
                let all_excluded = raw.rows.iter().all(|row| {
                    row[0].as_text().is_some_and(|entity| list.reason_for(entity).is_some())
                });
                prop_assert!(all_excluded, "unexpected error: {}", err);
            }
        }
    }

    #[test]
    fn duplicate_keys_always_fail(
        year in 1950i32..2020,
        a in 0.0f64..10.0,
        b in 0.0f64..10.0,
    ) {
        let row = |value: f64| {
            vec![
                RawCell::Text("Chad".to_string()),
                RawCell::Number(f64::from(year)),
                RawCell::Number(value),
            ]
        };
        let raw = RawTable::new(
            "deaths",
            vec!["Entity".to_string(), "Year".to_string(), "Stroke".to_string()],
            vec![row(a), row(b)],
        );
        let err = KeyNormalizer::default()
            .normalize(&raw, None)
            .expect_err("duplicate keys should fail");
        prop_assert!(err.to_string().contains("duplicate key"));
    }
}
