//! Partition of predicted electrons over atoms.
//!
//! Bond functions are split between their two endpoints, so the per-atom
//! charges of an example sum to the example's total predicted charge.

use super::batch::Connectivity;
use super::error::Error;
use ndarray::{Array2, ArrayView3, Axis, s};

/// Partitions the predicted electron count over atoms.
///
/// An atom receives `Σ integral·coefficient` over its own functions. Each
/// valid bond `(a, b)` credits the first half of its columns to `a` and the
/// second half to `b`, matching the forward/reversed layout of bond
/// coefficients. Padding atoms get zero.
///
/// # Errors
///
/// Returns [`Error::Shape`] if integrals and coefficients differ in shape,
/// the bond block is not `(N, B, 2k)` for the connectivity's `(N, B)`, or
/// the atom block's `N` differs.
pub fn atomic_charges(
    atom_integrals: ArrayView3<'_, f64>,
    bond_integrals: ArrayView3<'_, f64>,
    atom_coeffs: ArrayView3<'_, f64>,
    bond_coeffs: ArrayView3<'_, f64>,
    connectivity: &Connectivity,
) -> Result<Array2<f64>, Error> {
    if atom_integrals.dim() != atom_coeffs.dim() || bond_integrals.dim() != bond_coeffs.dim() {
        return Err(Error::shape(
            "atomic charges",
            "integrals and coefficients must have identical shapes",
        ));
    }
    let (n, a, _) = atom_coeffs.dim();
    let (bond_examples, b, width) = bond_coeffs.dim();
    if (bond_examples, b) != connectivity.shape() || bond_examples != n || width % 2 != 0 {
        return Err(Error::shape(
            "atomic charges",
            format!(
                "bond block {:?} does not fit connectivity {:?} with {} examples",
                bond_coeffs.dim(),
                connectivity.shape(),
                n
            ),
        ));
    }
    let half = width / 2;

    let mut charges = (&atom_integrals * &atom_coeffs).sum_axis(Axis(2));
    let bond_terms = &bond_integrals * &bond_coeffs;

    for example in 0..n {
        for (slot, i, j) in connectivity.bonds_of(example) {
            if i >= a || j >= a {
                return Err(Error::invalid_index(example, slot, i.max(j) as i64));
            }
            charges[(example, i)] += bond_terms.slice(s![example, slot, ..half]).sum();
            charges[(example, j)] += bond_terms.slice(s![example, slot, half..]).sum();
        }
    }
    Ok(charges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::batch::Labels;
    use ndarray::array;

    fn make_connectivity() -> Connectivity {
        let labels = Labels::from_sentinel(array![[6i64, 1, 1]].view().into_dyn()).unwrap();
        Connectivity::from_sentinel(
            array![[[0i64, 1], [2, 0], [-1, -1]]].view().into_dyn(),
            &labels,
        )
        .unwrap()
    }

    #[test]
    fn bond_halves_go_to_their_endpoints() {
        let conn = make_connectivity();
        let atom_i = array![[[1.0, 1.0], [1.0, 0.0], [1.0, 0.0]]];
        let atom_c = array![[[2.0, 1.0], [0.5, 9.0], [0.5, 9.0]]];
        let bond_i = Array2::ones((3, 2)).into_shape_with_order((1, 3, 2)).unwrap();
        let bond_c = array![[[0.1, 0.2], [0.3, 0.4], [5.0, 5.0]]];

        let q = atomic_charges(
            atom_i.view(),
            bond_i.view(),
            atom_c.view(),
            bond_c.view(),
            &conn,
        )
        .unwrap();

        assert!((q[(0, 0)] - (3.0 + 0.1 + 0.4)).abs() < 1e-12);
        assert!((q[(0, 1)] - (0.5 + 0.2)).abs() < 1e-12);
        assert!((q[(0, 2)] - (0.5 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn charges_sum_to_total_prediction() {
        let conn = make_connectivity();
        let atom_i = array![[[1.0, 2.0], [0.5, 0.5], [0.5, 0.5]]];
        let atom_c = array![[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]];
        let bond_i = array![[[0.5, 0.5], [0.5, 0.5], [0.0, 0.0]]];
        let bond_c = array![[[0.2, 0.2], [0.4, 0.4], [0.0, 0.0]]];

        let q = atomic_charges(
            atom_i.view(),
            bond_i.view(),
            atom_c.view(),
            bond_c.view(),
            &conn,
        )
        .unwrap();
        let total = (&atom_i * &atom_c).sum() + (&bond_i * &bond_c).sum();
        assert!((q.sum() - total).abs() < 1e-12);
    }

    #[test]
    fn odd_bond_width_is_rejected() {
        let conn = make_connectivity();
        let atoms = ndarray::Array3::zeros((1, 3, 1));
        let bonds = ndarray::Array3::zeros((1, 3, 3));
        assert!(matches!(
            atomic_charges(atoms.view(), bonds.view(), atoms.view(), bonds.view(), &conn),
            Err(Error::Shape { .. })
        ));
    }
}
