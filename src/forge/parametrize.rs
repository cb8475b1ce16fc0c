//! Coefficient assignment for persisted basis-function descriptors.
//!
//! A density basis is stored as a flat list of [`FunctionDescriptor`]s. Each
//! descriptor names the atom it is centered on, its position in that atom's
//! (or bond's) coefficient block, and its integral. The [`Parametrizer`]
//! scatters the integrals into the model's tensor layout, predicts
//! normalized coefficients for the molecule, and writes them back into the
//! descriptors.

use super::batch::PaddedBatch;
use super::error::Error;
use super::features::FeatureExtractor;
use super::model::DensityModel;
use crate::model::molecule::Molecule;
use ndarray::{Array3, array};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a basis function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    /// Fixed core density; its integral is subtracted from the target.
    Core,
    /// Isotropic function owned by one atom.
    Iso,
    /// Anisotropic function on a bond, centered on one of its endpoints.
    Aniso,
}

/// One basis function of a molecule's density expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub kind: FunctionKind,
    /// Atom the function is centered on.
    pub center: usize,
    /// Other endpoint of the bond for anisotropic functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond: Option<usize>,
    /// Position within the atom's or bond direction's coefficient block.
    #[serde(default)]
    pub slot: usize,
    /// Integral of the function over all space.
    pub integral: f64,
    #[serde(default)]
    pub coefficient: Option<f64>,
}

/// An anisotropic function whose `(center, bond)` pair is not a bond of the
/// molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnmatchedBond {
    /// Position of the function in the descriptor list.
    pub function: usize,
    pub center: usize,
    pub bond: Option<usize>,
}

impl fmt::Display for UnmatchedBond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bond {
            Some(other) => write!(
                f,
                "function {} on atom {} references missing bond {}-{}",
                self.function, self.center, self.center, other
            ),
            None => write!(
                f,
                "anisotropic function {} on atom {} has no bond partner",
                self.function, self.center
            ),
        }
    }
}

/// Result of parametrizing one molecule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parametrization {
    /// Input descriptors with coefficients filled in.
    pub functions: Vec<FunctionDescriptor>,
    /// Electron count the non-core functions were normalized to.
    pub target: f64,
    pub warnings: Vec<UnmatchedBond>,
}

/// Where a descriptor's value lives in the model tensors.
#[derive(Debug, Clone, Copy)]
enum Placement {
    Core,
    Atom { atom: usize, column: usize },
    Bond { bond: usize, column: usize },
    Unmatched,
}

/// Fills descriptor coefficients from a [`DensityModel`].
#[derive(Debug, Clone, Copy)]
pub struct Parametrizer<'m> {
    model: &'m DensityModel,
}

impl<'m> Parametrizer<'m> {
    pub fn new(model: &'m DensityModel) -> Self {
        Self { model }
    }

    /// Predicts coefficients for `functions` of `molecule`.
    ///
    /// The charge target is `Σ Z − net charge − Σ core integrals`. An
    /// anisotropic function is matched to the first bond joining its
    /// `center` and `bond`; a forward match uses the first half of the bond
    /// block, a reversed match the second half. Unmatched functions keep no
    /// coefficient and are reported as warnings. Core coefficients are left
    /// as given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] for a center outside the molecule,
    /// [`Error::Shape`] for a slot outside its coefficient block, and any
    /// error of [`DensityModel::predict`].
    pub fn parametrize<E>(
        &self,
        extractor: &E,
        molecule: &Molecule,
        functions: &[FunctionDescriptor],
    ) -> Result<Parametrization, Error>
    where
        E: FeatureExtractor + ?Sized,
    {
        let atom_width = self.model.atom_functions();
        let half = self.model.bond_functions() / 2;

        let mut target = molecule.electron_count();
        let mut atom_integrals = Array3::zeros((1, molecule.atom_count(), atom_width));
        let mut bond_integrals =
            Array3::zeros((1, molecule.bond_count(), self.model.bond_functions()));
        let mut warnings = Vec::new();

        let placements = functions
            .iter()
            .enumerate()
            .map(|(idx, fun)| self.place(molecule, idx, fun, atom_width, half))
            .collect::<Result<Vec<_>, _>>()?;

        for ((idx, fun), placement) in functions.iter().enumerate().zip(&placements) {
            match *placement {
                Placement::Core => target -= fun.integral,
                Placement::Atom { atom, column } => atom_integrals[(0, atom, column)] = fun.integral,
                Placement::Bond { bond, column } => bond_integrals[(0, bond, column)] = fun.integral,
                Placement::Unmatched => {
                    let warning = UnmatchedBond {
                        function: idx,
                        center: fun.center,
                        bond: fun.bond,
                    };
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        let batch = PaddedBatch::from_molecules(std::slice::from_ref(molecule))?;
        let out = self.model.predict(
            extractor,
            &batch,
            atom_integrals.view(),
            bond_integrals.view(),
            array![target].view(),
        )?;

        let functions = functions
            .iter()
            .zip(&placements)
            .map(|(fun, placement)| {
                let mut fun = fun.clone();
                match *placement {
                    Placement::Core => {}
                    Placement::Atom { atom, column } => {
                        fun.coefficient = Some(out.atoms[(0, atom, column)]);
                    }
                    Placement::Bond { bond, column } => {
                        fun.coefficient = Some(out.bonds[(0, bond, column)]);
                    }
                    Placement::Unmatched => fun.coefficient = None,
                }
                fun
            })
            .collect();

        tracing::debug!(
            functions = placements.len(),
            unmatched = warnings.len(),
            target,
            "parametrized molecule"
        );

        Ok(Parametrization {
            functions,
            target,
            warnings,
        })
    }

    fn place(
        &self,
        molecule: &Molecule,
        idx: usize,
        fun: &FunctionDescriptor,
        atom_width: usize,
        half: usize,
    ) -> Result<Placement, Error> {
        if fun.center >= molecule.atom_count() {
            return Err(Error::invalid_index(0, idx, fun.center as i64));
        }
        let check_slot = |width: usize| {
            if fun.slot < width {
                Ok(())
            } else {
                Err(Error::shape(
                    "function descriptors",
                    format!(
                        "function {} uses slot {} of a {}-wide block",
                        idx, fun.slot, width
                    ),
                ))
            }
        };

        match fun.kind {
            FunctionKind::Core => Ok(Placement::Core),
            FunctionKind::Iso => {
                check_slot(atom_width)?;
                Ok(Placement::Atom {
                    atom: fun.center,
                    column: fun.slot,
                })
            }
            FunctionKind::Aniso => {
                check_slot(half)?;
                let Some(other) = fun.bond else {
                    return Ok(Placement::Unmatched);
                };
                let matched = molecule
                    .bonds
                    .iter()
                    .enumerate()
                    .find(|(_, bond)| bond.joins(fun.center, other))
                    .map(|(b, bond)| (b, if bond.i == fun.center { 0 } else { half }));
                Ok(match matched {
                    Some((bond, offset)) => Placement::Bond {
                        bond,
                        column: offset + fun.slot,
                    },
                    None => Placement::Unmatched,
                })
            }
        }
    }
}
