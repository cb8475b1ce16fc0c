use super::atom::Atom;
use serde::{Deserialize, Serialize};

/// A covalent bond between two atoms of the same molecule.
///
/// The endpoints keep the order they were given in; routing treats
/// `(i, j)` and `(j, i)` as different ordered pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bond {
    pub i: usize,
    pub j: usize,
}

impl Bond {
    pub fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }

    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            i: self.j,
            j: self.i,
        }
    }

    /// Returns `true` if the bond joins `a` and `b` in either orientation.
    #[inline]
    pub fn joins(&self, a: usize, b: usize) -> bool {
        (self.i == a && self.j == b) || (self.i == b && self.j == a)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    #[serde(default)]
    pub bonds: Vec<Bond>,
    /// Net formal charge in elementary charge units.
    #[serde(default)]
    pub net_charge: f64,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    #[inline]
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Number of electrons: the sum of atomic numbers minus the net charge.
    pub fn electron_count(&self) -> f64 {
        let nuclear: f64 = self
            .atoms
            .iter()
            .map(|a| f64::from(a.element.atomic_number()))
            .sum();
        nuclear - self.net_charge
    }
}
