//! Uniform rescaling to the target charge.
//!
//! Every coefficient of an example is multiplied by one factor, chosen so the
//! integrated charge matches the target exactly.

use super::kkt::{check_charges, check_pair, flatten_example};
use crate::forge::error::Error;
use ndarray::{Array3, ArrayView1, ArrayView3, Axis};

/// Rescales every coefficient of an example by `charge / (a·c)`.
///
/// Unlike the KKT projection this keeps the relative shape of the
/// coefficient vector, at the cost of moving it further.
///
/// # Errors
///
/// Returns [`Error::Shape`] for misaligned inputs and
/// [`Error::DegenerateConstraint`] when an example's predicted charge is zero
/// or not finite.
pub fn scale_normalize(
    atom_coeffs: ArrayView3<'_, f64>,
    bond_coeffs: ArrayView3<'_, f64>,
    atom_integrals: ArrayView3<'_, f64>,
    bond_integrals: ArrayView3<'_, f64>,
    charges: ArrayView1<'_, f64>,
) -> Result<(Array3<f64>, Array3<f64>), Error> {
    check_pair("scale normalizer atoms", atom_coeffs, atom_integrals)?;
    check_pair("scale normalizer bonds", bond_coeffs, bond_integrals)?;
    let n = atom_coeffs.dim().0;
    if bond_coeffs.dim().0 != n {
        return Err(Error::shape(
            "scale normalizer",
            format!(
                "{} examples of atom coefficients but {} of bond coefficients",
                n,
                bond_coeffs.dim().0
            ),
        ));
    }
    check_charges("scale normalizer", n, charges)?;

    let mut atoms = atom_coeffs.to_owned();
    let mut bonds = bond_coeffs.to_owned();
    for ex in 0..n {
        let predicted: f64 = flatten_example(atom_coeffs, ex)
            .zip(flatten_example(atom_integrals, ex))
            .chain(flatten_example(bond_coeffs, ex).zip(flatten_example(bond_integrals, ex)))
            .map(|(c, a)| c * a)
            .sum();
        if predicted == 0.0 || !predicted.is_finite() {
            return Err(Error::degenerate(
                ex,
                format!("predicted charge {} cannot be rescaled", predicted),
            ));
        }
        let factor = charges[ex] / predicted;
        atoms.index_axis_mut(Axis(0), ex).mapv_inplace(|c| c * factor);
        bonds.index_axis_mut(Axis(0), ex).mapv_inplace(|c| c * factor);
    }
    Ok((atoms, bonds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rescales_to_target_charge() {
        let atom_c = array![[[1.0], [2.0]]];
        let atom_i = array![[[1.0], [1.0]]];
        let bond_c = array![[[1.0, 1.0]]];
        let bond_i = array![[[0.5, 0.5]]];

        let (atoms, bonds) = scale_normalize(
            atom_c.view(),
            bond_c.view(),
            atom_i.view(),
            bond_i.view(),
            array![8.0].view(),
        )
        .unwrap();

        // predicted = 1 + 2 + 0.5 + 0.5 = 4
        assert_eq!(atoms, array![[[2.0], [4.0]]]);
        assert_eq!(bonds, array![[[2.0, 2.0]]]);
    }

    #[test]
    fn zero_prediction_is_degenerate() {
        let zeros = Array3::zeros((1, 1, 1));
        let ones = Array3::ones((1, 1, 1));
        assert!(matches!(
            scale_normalize(
                zeros.view(),
                zeros.view(),
                ones.view(),
                ones.view(),
                array![1.0].view()
            ),
            Err(Error::DegenerateConstraint { example: 0, .. })
        ));
    }
}
