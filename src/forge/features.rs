//! Per-atom input features.
//!
//! The density model consumes a fixed-width feature vector for every atom
//! slot. How those vectors are computed from geometry is left to a
//! [`FeatureExtractor`]; [`PrecomputedFeatures`] wraps vectors produced
//! elsewhere.

use super::batch::Labels;
use super::error::Error;
use ndarray::{Array3, ArrayView3};

/// Maps labels and coordinates of a padded batch to `(N, A, D)` features.
///
/// Implementations must not depend on padding slots and must leave the
/// labels untouched.
pub trait FeatureExtractor: Send + Sync {
    /// Width `D` of every feature vector.
    fn feature_width(&self) -> usize;

    fn extract(&self, labels: &Labels, coordinates: ArrayView3<'_, f64>)
    -> Result<Array3<f64>, Error>;
}

/// Features computed outside this crate for one specific batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecomputedFeatures {
    features: Array3<f64>,
}

impl PrecomputedFeatures {
    pub fn new(features: Array3<f64>) -> Self {
        Self { features }
    }

    /// Stacks per-molecule `(atoms, D)` rows into a zero-padded `(N, A, D)`
    /// tensor. Molecule `i` must supply exactly `atom_counts[i]` rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if a molecule has a different number of rows
    /// than atoms, rows differ in width, or a molecule has more atoms than
    /// `max_atoms`.
    pub fn from_rows(
        rows: &[Vec<Vec<f64>>],
        atom_counts: &[usize],
        max_atoms: usize,
    ) -> Result<Self, Error> {
        if rows.len() != atom_counts.len() {
            return Err(Error::shape(
                "features",
                format!(
                    "{} feature blocks for {} molecules",
                    rows.len(),
                    atom_counts.len()
                ),
            ));
        }
        let width = rows
            .iter()
            .flat_map(|mol| mol.iter())
            .map(Vec::len)
            .next()
            .unwrap_or(0);
        let mut features = Array3::zeros((rows.len(), max_atoms, width));
        for (example, (mol, &count)) in rows.iter().zip(atom_counts).enumerate() {
            if mol.len() != count {
                return Err(Error::shape(
                    "features",
                    format!(
                        "molecule {} has {} feature rows for {} atoms",
                        example,
                        mol.len(),
                        count
                    ),
                ));
            }
            if count > max_atoms {
                return Err(Error::shape(
                    "features",
                    format!(
                        "molecule {} has {} atoms for {} atom slots",
                        example, count, max_atoms
                    ),
                ));
            }
            for (slot, row) in mol.iter().enumerate() {
                if row.len() != width {
                    return Err(Error::shape(
                        "features",
                        format!(
                            "molecule {} atom {} has {} features, expected {}",
                            example,
                            slot,
                            row.len(),
                            width
                        ),
                    ));
                }
                for (k, &v) in row.iter().enumerate() {
                    features[(example, slot, k)] = v;
                }
            }
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> ArrayView3<'_, f64> {
        self.features.view()
    }
}

impl FeatureExtractor for PrecomputedFeatures {
    fn feature_width(&self) -> usize {
        self.features.dim().2
    }

    fn extract(
        &self,
        labels: &Labels,
        coordinates: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        let (n, a, _) = self.features.dim();
        if labels.shape() != (n, a) || coordinates.dim() != (n, a, 3) {
            return Err(Error::shape(
                "features",
                format!(
                    "precomputed features are {:?} but the batch is {:?}",
                    self.features.dim(),
                    labels.shape()
                ),
            ));
        }
        Ok(self.features.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn from_rows_pads_short_molecules() {
        let rows = vec![
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            vec![vec![5.0, 6.0]],
        ];
        let f = PrecomputedFeatures::from_rows(&rows, &[2, 1], 2).unwrap();
        assert_eq!(f.feature_width(), 2);
        assert_eq!(
            f.features(),
            array![[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [0.0, 0.0]]]
        );
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let rows = vec![vec![vec![1.0, 2.0], vec![3.0]]];
        assert!(PrecomputedFeatures::from_rows(&rows, &[2], 2).is_err());
        let rows = vec![vec![vec![1.0], vec![3.0], vec![4.0]]];
        assert!(PrecomputedFeatures::from_rows(&rows, &[3], 2).is_err());
    }

    #[test]
    fn from_rows_requires_one_row_per_atom() {
        let rows = vec![
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            vec![vec![5.0, 6.0]],
        ];
        let err = PrecomputedFeatures::from_rows(&rows, &[2, 2], 2).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
        assert!(err.to_string().contains("molecule 1"));
        assert!(PrecomputedFeatures::from_rows(&rows, &[2], 2).is_err());
    }

    #[test]
    fn extract_checks_batch_shape() {
        let labels = Labels::from_sentinel(array![[6i64, 1]].view().into_dyn()).unwrap();
        let f = PrecomputedFeatures::new(Array3::ones((1, 2, 4)));
        assert!(f.extract(&labels, Array3::zeros((1, 2, 3)).view()).is_ok());

        let other = Labels::from_sentinel(array![[6i64, 1, 1]].view().into_dyn()).unwrap();
        assert!(matches!(
            f.extract(&other, Array3::zeros((1, 3, 3)).view()),
            Err(Error::Shape { .. })
        ));
    }
}
