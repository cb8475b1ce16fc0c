//! Equality-constrained least squares via the KKT system.
//!
//! For one example with raw coefficients `c` (length `F`) and a `k x F`
//! constraint matrix `A` with targets `q`, the nearest point to `c` on
//! `A x = q` solves
//!
//! ```text
//! [ 2 I_F  -A^T ] [x]   [2c]
//! [   A     0   ] [λ] = [ q]
//! ```
//!
//! The multipliers `λ` are discarded.

use crate::forge::error::Error;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array3, ArrayView1, ArrayView3, Axis};
use rayon::prelude::*;

/// Relative residual above which a solution is rejected.
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Projects `coefficients` onto `{x : constraints · x = targets}`.
///
/// Each row of `constraints` is one linear constraint of width
/// `coefficients.len()`.
///
/// # Errors
///
/// Returns [`Error::Shape`] for inconsistent widths and
/// [`Error::DegenerateConstraint`] (labelled with `example`) when a
/// constraint row is all zeros, the KKT matrix is singular, or the solution
/// misses its targets.
pub fn project(
    example: usize,
    coefficients: &[f64],
    constraints: &DMatrix<f64>,
    targets: &[f64],
) -> Result<Vec<f64>, Error> {
    let f = coefficients.len();
    let k = constraints.nrows();
    if constraints.ncols() != f || targets.len() != k || k == 0 {
        return Err(Error::shape(
            "constraint system",
            format!(
                "{}x{} constraints and {} targets for {} coefficients",
                k,
                constraints.ncols(),
                targets.len(),
                f
            ),
        ));
    }

    for (r, row) in constraints.row_iter().enumerate() {
        if row.dot(&row) == 0.0 {
            return Err(Error::degenerate(
                example,
                format!("constraint row {} has zero norm", r),
            ));
        }
    }

    let mut kkt = DMatrix::<f64>::zeros(f + k, f + k);
    kkt.view_mut((0, 0), (f, f)).fill_with_identity();
    kkt.view_mut((0, 0), (f, f)).scale_mut(2.0);
    kkt.view_mut((0, f), (f, k)).copy_from(&(-constraints.transpose()));
    kkt.view_mut((f, 0), (k, f)).copy_from(constraints);

    let rhs = DVector::from_iterator(
        f + k,
        coefficients
            .iter()
            .map(|c| 2.0 * c)
            .chain(targets.iter().copied()),
    );

    let solution = kkt
        .lu()
        .solve(&rhs)
        .ok_or_else(|| Error::degenerate(example, "singular KKT system"))?;
    let x = solution.rows(0, f).into_owned();

    let achieved = constraints * &x;
    for (r, (&got, &want)) in achieved.iter().zip(targets).enumerate() {
        let residual = (got - want).abs();
        if !residual.is_finite() || residual > RESIDUAL_TOLERANCE * want.abs().max(1.0) {
            return Err(Error::degenerate(
                example,
                format!(
                    "constraint {} reached {} instead of {}",
                    r, got, want
                ),
            ));
        }
    }

    Ok(x.iter().copied().collect())
}

/// Flattens example `ex` of a `(N, S, F)` tensor row-major.
pub(super) fn flatten_example(x: ArrayView3<'_, f64>, ex: usize) -> impl Iterator<Item = f64> + '_ {
    x.index_axis_move(Axis(0), ex).into_iter().copied()
}

pub(super) fn check_pair(
    context: &'static str,
    coefficients: ArrayView3<'_, f64>,
    integrals: ArrayView3<'_, f64>,
) -> Result<(), Error> {
    if coefficients.dim() != integrals.dim() {
        return Err(Error::shape(
            context,
            format!(
                "coefficients are {:?} but integrals are {:?}",
                coefficients.dim(),
                integrals.dim()
            ),
        ));
    }
    Ok(())
}

pub(super) fn check_charges(
    context: &'static str,
    examples: usize,
    charges: ArrayView1<'_, f64>,
) -> Result<(), Error> {
    if charges.len() != examples {
        return Err(Error::shape(
            context,
            format!("{} charge targets for {} examples", charges.len(), examples),
        ));
    }
    Ok(())
}

/// Normalizes atom and bond coefficients jointly so that, per example,
/// `Σ atom_integrals·atom_coeffs + Σ bond_integrals·bond_coeffs = charge`,
/// moving the coefficients as little as possible.
///
/// Returns tensors with the input shapes. Examples are solved in parallel;
/// the batch fails if any example fails.
///
/// # Errors
///
/// Returns [`Error::Shape`] if coefficient and integral shapes differ, the
/// atom and bond blocks disagree on `N`, or `charges` is not length `N`;
/// [`Error::DegenerateConstraint`] as in [`project`].
pub fn normalize(
    atom_coeffs: ArrayView3<'_, f64>,
    bond_coeffs: ArrayView3<'_, f64>,
    atom_integrals: ArrayView3<'_, f64>,
    bond_integrals: ArrayView3<'_, f64>,
    charges: ArrayView1<'_, f64>,
) -> Result<(Array3<f64>, Array3<f64>), Error> {
    check_pair("normalizer atoms", atom_coeffs, atom_integrals)?;
    check_pair("normalizer bonds", bond_coeffs, bond_integrals)?;
    let n = atom_coeffs.dim().0;
    if bond_coeffs.dim().0 != n {
        return Err(Error::shape(
            "normalizer",
            format!(
                "{} examples of atom coefficients but {} of bond coefficients",
                n,
                bond_coeffs.dim().0
            ),
        ));
    }
    check_charges("normalizer", n, charges)?;

    let (_, atom_slots, atom_width) = atom_coeffs.dim();
    let atom_len = atom_slots * atom_width;

    let solutions = (0..n)
        .into_par_iter()
        .map(|ex| {
            let c: Vec<f64> = flatten_example(atom_coeffs, ex)
                .chain(flatten_example(bond_coeffs, ex))
                .collect();
            let a = DMatrix::from_row_iterator(
                1,
                c.len(),
                flatten_example(atom_integrals, ex).chain(flatten_example(bond_integrals, ex)),
            );
            project(ex, &c, &a, &[charges[ex]])
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut atoms = Array3::zeros(atom_coeffs.raw_dim());
    let mut bonds = Array3::zeros(bond_coeffs.raw_dim());
    for (ex, x) in solutions.iter().enumerate() {
        let (xa, xb) = x.split_at(atom_len);
        for (o, v) in atoms.index_axis_mut(Axis(0), ex).iter_mut().zip(xa) {
            *o = *v;
        }
        for (o, v) in bonds.index_axis_mut(Axis(0), ex).iter_mut().zip(xb) {
            *o = *v;
        }
    }

    tracing::debug!(examples = n, "normalized coefficients against charge targets");
    Ok((atoms, bonds))
}

/// Atom-only variant of [`normalize`].
pub fn normalize_atoms(
    atom_coeffs: ArrayView3<'_, f64>,
    atom_integrals: ArrayView3<'_, f64>,
    charges: ArrayView1<'_, f64>,
) -> Result<Array3<f64>, Error> {
    check_pair("normalizer atoms", atom_coeffs, atom_integrals)?;
    let n = atom_coeffs.dim().0;
    check_charges("normalizer", n, charges)?;

    let solutions = (0..n)
        .into_par_iter()
        .map(|ex| {
            let c: Vec<f64> = flatten_example(atom_coeffs, ex).collect();
            let a = DMatrix::from_row_iterator(1, c.len(), flatten_example(atom_integrals, ex));
            project(ex, &c, &a, &[charges[ex]])
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut atoms = Array3::zeros(atom_coeffs.raw_dim());
    for (ex, x) in solutions.iter().enumerate() {
        for (o, v) in atoms.index_axis_mut(Axis(0), ex).iter_mut().zip(x) {
            *o = *v;
        }
    }
    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};
    use proptest::prelude::*;

    fn dot3(a: ArrayView3<'_, f64>, b: ArrayView3<'_, f64>, ex: usize) -> f64 {
        flatten_example(a, ex)
            .zip(flatten_example(b, ex))
            .map(|(x, y)| x * y)
            .sum()
    }

    #[test]
    fn projects_onto_single_constraint() {
        let a = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 0.0]);
        let x = project(0, &[1.0, 1.0, 5.0], &a, &[8.0]).unwrap();
        // x* = c + a (Q - a·c) / (a·a) = c + a * 1
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
        assert!((x[2] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn zero_constraint_is_degenerate() {
        let a = DMatrix::zeros(1, 2);
        assert!(matches!(
            project(4, &[1.0, 2.0], &a, &[1.0]),
            Err(Error::DegenerateConstraint { example: 4, .. })
        ));
    }

    #[test]
    fn dependent_constraints_are_degenerate() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        assert!(matches!(
            project(0, &[0.0, 0.0], &a, &[1.0, 3.0]),
            Err(Error::DegenerateConstraint { .. })
        ));
    }

    #[test]
    fn batch_normalization_conserves_each_charge() {
        let atom_c = array![[[1.0, 0.5], [2.0, 0.1]], [[0.3, 0.3], [0.0, 0.0]]];
        let atom_i = array![[[1.0, 2.0], [1.0, 2.0]], [[3.0, 1.0], [0.0, 0.0]]];
        let bond_c = array![[[0.2, 0.2, 0.1, 0.1]], [[0.0, 0.0, 0.0, 0.0]]];
        let bond_i = array![[[0.5, 0.5, 0.5, 0.5]], [[0.0, 0.0, 0.0, 0.0]]];
        let charges = array![8.0, 1.0];

        let (atoms, bonds) = normalize(
            atom_c.view(),
            bond_c.view(),
            atom_i.view(),
            bond_i.view(),
            charges.view(),
        )
        .unwrap();

        for ex in 0..2 {
            let total = dot3(atoms.view(), atom_i.view(), ex) + dot3(bonds.view(), bond_i.view(), ex);
            assert!((total - charges[ex]).abs() <= 1e-5 * charges[ex]);
        }
        // Zero-integral slots are left alone.
        assert!(atoms[(1, 1, 0)].abs() < 1e-12);
        assert!(bonds.index_axis(Axis(0), 1).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn one_degenerate_example_fails_the_batch() {
        let c = Array3::ones((2, 1, 2));
        let mut i = Array3::ones((2, 1, 2));
        i.index_axis_mut(Axis(0), 1).fill(0.0);
        assert!(matches!(
            normalize_atoms(c.view(), i.view(), array![1.0, 1.0].view()),
            Err(Error::DegenerateConstraint { example: 1, .. })
        ));
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let c = Array3::ones((2, 1, 2));
        let i = Array3::ones((2, 1, 3));
        assert!(matches!(
            normalize_atoms(c.view(), i.view(), array![1.0, 1.0].view()),
            Err(Error::Shape { .. })
        ));
        let i = Array3::ones((2, 1, 2));
        assert!(matches!(
            normalize_atoms(c.view(), i.view(), array![1.0].view()),
            Err(Error::Shape { .. })
        ));
    }

    proptest! {
        #[test]
        fn matches_closed_form_nearest_point(
            entries in prop::collection::vec((-3.0f64..3.0, 0.1f64..2.0), 1..12),
            charge in 0.5f64..20.0,
        ) {
            let f = entries.len();
            let c = Array1::from_iter(entries.iter().map(|e| e.0));
            let a = Array1::from_iter(entries.iter().map(|e| e.1));
            let atom_c = c.clone().into_shape_with_order((1, 1, f)).unwrap();
            let atom_i = a.clone().into_shape_with_order((1, 1, f)).unwrap();

            let x = normalize_atoms(atom_c.view(), atom_i.view(), array![charge].view()).unwrap();

            let expected = &c + &(&a * ((charge - a.dot(&c)) / a.dot(&a)));
            for (got, want) in x.iter().zip(expected.iter()) {
                prop_assert!((got - want).abs() <= 1e-8 * (1.0 + want.abs()));
            }
            let total: f64 = x.iter().zip(a.iter()).map(|(x, a)| x * a).sum();
            prop_assert!((total - charge).abs() <= 1e-5 * charge);
        }
    }
}
