//! Padded batch representation for the prediction pipeline.
//!
//! A batch stacks `N` molecules into fixed-size arrays: `(N, A)` atom labels,
//! `(N, B, 2)` bond connectivity and `(N, A, 3)` coordinates, where `A` and
//! `B` are the largest atom and bond counts of the batch. Unused slots are
//! marked by an explicit validity mask. The `-1` sentinel convention is only
//! used at the boundary ([`Labels::from_sentinel`],
//! [`Connectivity::from_sentinel`] and their `to_sentinel` inverses).

use super::error::Error;
use crate::model::molecule::Molecule;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3, s};

/// Per-atom element codes (atomic numbers) with a padding mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    codes: Array2<u8>,
    valid: Array2<bool>,
}

impl Labels {
    /// Builds labels from a rank-2 tensor using `-1` for padding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if the tensor is not rank 2, and
    /// [`Error::UnknownCategory`] for codes that are neither `-1` nor a
    /// positive atomic number below 256.
    pub fn from_sentinel(labels: ArrayViewD<'_, i64>) -> Result<Self, Error> {
        let labels = labels.into_dimensionality::<Ix2>().map_err(|_| {
            Error::shape("labels", "expected a rank-2 (examples, atoms) tensor")
        })?;

        let mut codes = Array2::zeros(labels.raw_dim());
        let mut valid = Array2::from_elem(labels.raw_dim(), false);
        for (&code, (c, v)) in labels.iter().zip(codes.iter_mut().zip(valid.iter_mut())) {
            match code {
                -1 => {}
                1..=255 => {
                    *c = code as u8;
                    *v = true;
                }
                other => return Err(Error::UnknownCategory { code: other }),
            }
        }

        Ok(Self { codes, valid })
    }

    /// Converts back to the `-1` padding convention.
    pub fn to_sentinel(&self) -> Array2<i64> {
        let mut out = Array2::from_elem(self.codes.raw_dim(), -1i64);
        for ((o, &c), &v) in out.iter_mut().zip(self.codes.iter()).zip(self.valid.iter()) {
            if v {
                *o = i64::from(c);
            }
        }
        out
    }

    /// `(examples, atom slots)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    #[inline]
    pub fn get(&self, example: usize, slot: usize) -> Option<u8> {
        match self.valid.get((example, slot)) {
            Some(&true) => Some(self.codes[(example, slot)]),
            _ => None,
        }
    }

    /// All slots in row-major order, `None` for padding.
    pub fn iter_flat(&self) -> impl Iterator<Item = Option<u8>> + '_ {
        self.codes
            .iter()
            .zip(self.valid.iter())
            .map(|(&c, &v)| v.then_some(c))
    }

    pub fn valid(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    /// Number of real atoms in each example.
    pub fn atom_counts(&self) -> Vec<usize> {
        self.valid
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|&&v| v).count())
            .collect()
    }
}

/// Per-bond pairs of local atom slots with a padding mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Connectivity {
    pairs: Array3<usize>,
    valid: Array2<bool>,
}

impl Connectivity {
    /// Builds connectivity from a rank-3 `(examples, bonds, 2)` tensor using
    /// `(-1, -1)` for padding slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] for a wrong rank, a last axis other than 2,
    /// or an example count differing from `labels`; and
    /// [`Error::InvalidIndex`] for half-padded pairs, out-of-range indices,
    /// or endpoints that point at padding atoms.
    pub fn from_sentinel(
        connectivity: ArrayViewD<'_, i64>,
        labels: &Labels,
    ) -> Result<Self, Error> {
        let connectivity = connectivity.into_dimensionality::<Ix3>().map_err(|_| {
            Error::shape("connectivity", "expected a rank-3 (examples, bonds, 2) tensor")
        })?;
        let (n_examples, n_bonds, width) = connectivity.dim();
        let (label_examples, n_atoms) = labels.shape();
        if width != 2 {
            return Err(Error::shape(
                "connectivity",
                format!("expected 2 endpoints per bond, got {}", width),
            ));
        }
        if n_examples != label_examples {
            return Err(Error::shape(
                "connectivity",
                format!(
                    "{} examples in connectivity but {} in labels",
                    n_examples, label_examples
                ),
            ));
        }

        let mut pairs = Array3::zeros((n_examples, n_bonds, 2));
        let mut valid = Array2::from_elem((n_examples, n_bonds), false);

        for example in 0..n_examples {
            for slot in 0..n_bonds {
                let a = connectivity[(example, slot, 0)];
                let b = connectivity[(example, slot, 1)];
                if a == -1 && b == -1 {
                    continue;
                }
                for &end in &[a, b] {
                    if end < 0 || end as u64 >= n_atoms as u64 {
                        return Err(Error::invalid_index(example, slot, end));
                    }
                    if labels.get(example, end as usize).is_none() {
                        return Err(Error::invalid_index(example, slot, end));
                    }
                }
                pairs[(example, slot, 0)] = a as usize;
                pairs[(example, slot, 1)] = b as usize;
                valid[(example, slot)] = true;
            }
        }

        Ok(Self { pairs, valid })
    }

    /// Converts back to the `(-1, -1)` padding convention.
    pub fn to_sentinel(&self) -> Array3<i64> {
        let (n, b, _) = self.pairs.dim();
        let mut out = Array3::from_elem((n, b, 2), -1i64);
        for ((example, slot), &v) in self.valid.indexed_iter() {
            if v {
                out[(example, slot, 0)] = self.pairs[(example, slot, 0)] as i64;
                out[(example, slot, 1)] = self.pairs[(example, slot, 1)] as i64;
            }
        }
        out
    }

    /// Returns a copy with the two endpoints of every bond swapped.
    pub fn reversed(&self) -> Self {
        let mut pairs = self.pairs.clone();
        pairs.invert_axis(Axis(2));
        Self {
            pairs: pairs.as_standard_layout().to_owned(),
            valid: self.valid.clone(),
        }
    }

    /// `(examples, bond slots)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.valid.dim()
    }

    #[inline]
    pub fn get(&self, example: usize, slot: usize) -> Option<(usize, usize)> {
        match self.valid.get((example, slot)) {
            Some(&true) => Some((
                self.pairs[(example, slot, 0)],
                self.pairs[(example, slot, 1)],
            )),
            _ => None,
        }
    }

    /// Bonds of one example as `(slot, i, j)`.
    pub fn bonds_of(&self, example: usize) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.shape().1).filter_map(move |slot| {
            self.get(example, slot).map(|(i, j)| (slot, i, j))
        })
    }
}

/// A padded batch of molecules ready for prediction.
#[derive(Debug, Clone)]
pub struct PaddedBatch {
    pub labels: Labels,
    pub connectivity: Connectivity,
    /// Cartesian coordinates `(examples, atoms, 3)`; zero for padding atoms.
    pub coordinates: Array3<f64>,
}

impl PaddedBatch {
    /// Assembles a batch from already padded parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if the coordinates are not `(N, A, 3)` for
    /// the `(N, A)` of `labels`, or connectivity has a different `N`.
    pub fn new(
        labels: Labels,
        connectivity: Connectivity,
        coordinates: Array3<f64>,
    ) -> Result<Self, Error> {
        let (n, a) = labels.shape();
        if coordinates.dim() != (n, a, 3) {
            return Err(Error::shape(
                "coordinates",
                format!("expected ({}, {}, 3), got {:?}", n, a, coordinates.dim()),
            ));
        }
        if connectivity.shape().0 != n {
            return Err(Error::shape(
                "connectivity",
                format!("expected {} examples, got {}", n, connectivity.shape().0),
            ));
        }
        Ok(Self {
            labels,
            connectivity,
            coordinates,
        })
    }

    /// Stacks molecules into a padded batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] for an empty molecule list and
    /// [`Error::InvalidIndex`] if a bond references an atom outside its
    /// molecule.
    pub fn from_molecules(molecules: &[Molecule]) -> Result<Self, Error> {
        if molecules.is_empty() {
            return Err(Error::shape("batch", "at least one molecule is required"));
        }

        let n = molecules.len();
        let max_atoms = molecules.iter().map(Molecule::atom_count).max().unwrap_or(0);
        let max_bonds = molecules.iter().map(Molecule::bond_count).max().unwrap_or(0);

        let mut codes = Array2::zeros((n, max_atoms));
        let mut atom_valid = Array2::from_elem((n, max_atoms), false);
        let mut coordinates = Array3::zeros((n, max_atoms, 3));
        let mut pairs = Array3::zeros((n, max_bonds, 2));
        let mut bond_valid = Array2::from_elem((n, max_bonds), false);

        for (example, mol) in molecules.iter().enumerate() {
            for (slot, atom) in mol.atoms.iter().enumerate() {
                codes[(example, slot)] = atom.element.atomic_number();
                atom_valid[(example, slot)] = true;
                coordinates
                    .slice_mut(s![example, slot, ..])
                    .assign(&ndarray::aview1(&atom.position));
            }
            for (slot, bond) in mol.bonds.iter().enumerate() {
                for end in [bond.i, bond.j] {
                    if end >= mol.atom_count() {
                        return Err(Error::invalid_index(example, slot, end as i64));
                    }
                }
                pairs[(example, slot, 0)] = bond.i;
                pairs[(example, slot, 1)] = bond.j;
                bond_valid[(example, slot)] = true;
            }
        }

        Ok(Self {
            labels: Labels {
                codes,
                valid: atom_valid,
            },
            connectivity: Connectivity {
                pairs,
                valid: bond_valid,
            },
            coordinates,
        })
    }

    #[inline]
    pub fn example_count(&self) -> usize {
        self.labels.shape().0
    }

    #[inline]
    pub fn max_atoms(&self) -> usize {
        self.labels.shape().1
    }

    #[inline]
    pub fn max_bonds(&self) -> usize {
        self.connectivity.shape().1
    }

    pub fn coordinates(&self) -> ArrayView3<'_, f64> {
        self.coordinates.view()
    }

    /// Returns a copy with `extra` all-padding examples appended.
    ///
    /// Slot counts are unchanged; the new examples contain no atoms or bonds.
    pub fn with_padding_examples(&self, extra: usize) -> Self {
        let (n, a) = self.labels.shape();
        let b = self.max_bonds();

        let mut codes = Array2::zeros((n + extra, a));
        codes.slice_mut(s![..n, ..]).assign(&self.labels.codes);
        let mut atom_valid = Array2::from_elem((n + extra, a), false);
        atom_valid.slice_mut(s![..n, ..]).assign(&self.labels.valid);

        let mut pairs = Array3::zeros((n + extra, b, 2));
        pairs.slice_mut(s![..n, .., ..]).assign(&self.connectivity.pairs);
        let mut bond_valid = Array2::from_elem((n + extra, b), false);
        bond_valid
            .slice_mut(s![..n, ..])
            .assign(&self.connectivity.valid);

        let mut coordinates = Array3::zeros((n + extra, a, 3));
        coordinates
            .slice_mut(s![..n, .., ..])
            .assign(&self.coordinates);

        Self {
            labels: Labels {
                codes,
                valid: atom_valid,
            },
            connectivity: Connectivity {
                pairs,
                valid: bond_valid,
            },
            coordinates,
        }
    }
}
