// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_core::{CodError, MemberKey, NormalizedMatrix, PointMatrix, mean, non_constant_std};

/// Which axis of the record-by-cause matrix is clustered.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClusterMode {
    /// Points are causes; each record is standardized across causes first.
    Variable,
    /// Points are records; each cause is standardized across records.
    Observation,
}

impl ClusterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Observation => "observation",
        }
    }
}

/// Builds the scaled point matrix for `mode`.
pub fn scaled_points(matrix: &NormalizedMatrix, mode: ClusterMode) -> Result<PointMatrix, CodError> {
    let records = matrix.to_record_points();
    match mode {
        ClusterMode::Observation => standardize_columns(&records),
        ClusterMode::Variable => {
            let scaled = standardize_rows(&records)?;
            scaled.transpose(
                matrix
                    .causes()
                    .iter()
                    .cloned()
                    .map(MemberKey::Cause)
                    .collect(),
                matrix.keys().iter().map(ToString::to_string).collect(),
            )
        }
    }
}

/// Z-scores every point across its dimensions. Constant points become zeros.
pub fn standardize_rows(points: &PointMatrix) -> Result<PointMatrix, CodError> {
    let values = points.points().flat_map(zscore).collect();
    PointMatrix::new(points.labels().to_vec(), points.dims().to_vec(), values)
}

/// Z-scores every dimension across points. Constant dimensions become zeros.
pub fn standardize_columns(points: &PointMatrix) -> Result<PointMatrix, CodError> {
    let (n, d) = (points.n_points(), points.n_dims());
    let mut values = vec![0.0; n * d];
    for col in 0..d {
        let column: Vec<f64> = points.points().map(|point| point[col]).collect();
        for (row, z) in zscore(&column).into_iter().enumerate() {
            values[row * d + col] = z;
        }
    }
    PointMatrix::new(points.labels().to_vec(), points.dims().to_vec(), values)
}

fn zscore(values: &[f64]) -> Vec<f64> {
    let mu = mean(values).unwrap_or(0.0);
    match non_constant_std(values) {
        Some(sd) => values.iter().map(|v| (v - mu) / sd).collect(),
        None => vec![0.0; values.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterMode, scaled_points, standardize_columns};
    use cod_core::{EntityYear, MemberKey, NormalizedMatrix, mean, sample_std};

    fn matrix() -> NormalizedMatrix {
        NormalizedMatrix::new(
            vec![
                EntityYear::new("A", 2000),
                EntityYear::new("B", 2000),
                EntityYear::new("C", 2000),
            ],
            vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
            vec![0.1, 0.3, 0.6, 0.2, 0.2, 0.6, 0.5, 0.4, 0.1],
        )
        .expect("matrix is valid")
    }

    #[test]
    fn observation_mode_standardizes_each_cause() {
        let points = scaled_points(&matrix(), ClusterMode::Observation).expect("scaling works");
        assert_eq!(points.n_points(), 3);
        assert_eq!(points.labels()[0], MemberKey::Record(EntityYear::new("A", 2000)));
        for col in 0..3 {
            let column: Vec<f64> = points.points().map(|p| p[col]).collect();
            assert!(mean(&column).expect("mean").abs() < 1e-12);
            assert!((sample_std(&column).expect("sd") - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn variable_mode_points_are_causes_over_records() {
        let points = scaled_points(&matrix(), ClusterMode::Variable).expect("scaling works");
        assert_eq!(points.n_points(), 3);
        assert_eq!(points.n_dims(), 3);
        assert_eq!(points.labels()[1], MemberKey::Cause("c2".to_string()));
        assert_eq!(points.dims()[2], "C (2000)");
        // Each record (now a dimension) has zero mean across causes.
        for col in 0..3 {
            let column: Vec<f64> = points.points().map(|p| p[col]).collect();
            assert!(mean(&column).expect("mean").abs() < 1e-12);
        }
    }

    #[test]
    fn constant_dimensions_scale_to_zero() {
        let m = NormalizedMatrix::new(
            vec![EntityYear::new("A", 2000), EntityYear::new("B", 2000)],
            vec!["c1".to_string(), "c2".to_string()],
            vec![0.5, 0.5, 0.5, 0.5],
        )
        .expect("matrix is valid");
        let scaled = standardize_columns(&m.to_record_points()).expect("scaling works");
        assert!(scaled.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn tiny_but_varying_dimensions_are_standardized() {
        let m = NormalizedMatrix::new(
            vec![
                EntityYear::new("A", 2000),
                EntityYear::new("B", 2000),
                EntityYear::new("C", 2000),
            ],
            vec!["rare".to_string(), "rest".to_string()],
            vec![1e-7, 1.0 - 1e-7, 2e-7, 1.0 - 2e-7, 3e-7, 1.0 - 3e-7],
        )
        .expect("matrix is valid");
        let scaled = standardize_columns(&m.to_record_points()).expect("scaling works");
        let rare: Vec<f64> = scaled.points().map(|p| p[0]).collect();
        assert!((rare[0] + 1.0).abs() < 1e-6, "rare={rare:?}");
        assert!((rare[2] - 1.0).abs() < 1e-6, "rare={rare:?}");
        assert!((sample_std(&rare).expect("sd") - 1.0).abs() < 1e-6);
    }
}
