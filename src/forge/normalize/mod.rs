//! Charge normalization of predicted coefficients.
//!
//! Predicted coefficients `c` and their basis-function integrals `a` define a
//! predicted electron count `a·c` per example. The normalizers adjust `c` so
//! that this count equals a known target:
//!
//! - [`normalize`] / [`normalize_atoms`] — nearest point under the linear
//!   constraint (KKT projection)
//! - [`scale_normalize`] — uniform rescaling
//! - [`normalize_segments`] — one constraint per atom segment

mod kkt;
mod scale;
mod segment;

pub use kkt::{normalize, normalize_atoms, project};
pub use scale::scale_normalize;
pub use segment::{SegmentCharge, normalize_segments, segment_charges};

use super::config::NormalizationMethod;
use super::error::Error;
use ndarray::{Array1, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

/// Sums per-atom charge targets `(N, A)` into per-example targets.
pub fn total_charges(per_atom: ArrayView2<'_, f64>) -> Array1<f64> {
    per_atom.sum_axis(Axis(1))
}

/// Applies the configured normalization to atom and bond coefficients.
///
/// # Errors
///
/// Propagates the errors of the selected normalizer;
/// [`NormalizationMethod::None`] never fails.
pub fn apply(
    method: NormalizationMethod,
    atom_coeffs: ArrayView3<'_, f64>,
    bond_coeffs: ArrayView3<'_, f64>,
    atom_integrals: ArrayView3<'_, f64>,
    bond_integrals: ArrayView3<'_, f64>,
    charges: ArrayView1<'_, f64>,
) -> Result<(Array3<f64>, Array3<f64>), Error> {
    match method {
        NormalizationMethod::None => Ok((atom_coeffs.to_owned(), bond_coeffs.to_owned())),
        NormalizationMethod::Kkt => normalize(
            atom_coeffs,
            bond_coeffs,
            atom_integrals,
            bond_integrals,
            charges,
        ),
        NormalizationMethod::Scale => scale_normalize(
            atom_coeffs,
            bond_coeffs,
            atom_integrals,
            bond_integrals,
            charges,
        ),
    }
}
