//! Layer widths of the three network families.

use crate::forge::error::Error;
use crate::forge::predictor::validate_widths;
use serde::{Deserialize, Serialize};

/// Layer widths `[w0, ..., wk]` of the common, atom and bond networks.
///
/// The common networks map extractor features to a shared per-atom
/// representation; atom networks map that representation to per-atom
/// coefficients; bond networks map `[f(a), f(b), pair features]` to per-bond
/// coefficients for one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub common: Vec<usize>,
    pub atom: Vec<usize>,
    pub bond: Vec<usize>,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            common: vec![96, 36, 6],
            atom: vec![6, 2],
            bond: vec![22, 2],
        }
    }
}

impl Architecture {
    /// Width of the shared per-atom representation.
    #[inline]
    pub fn common_width(&self) -> usize {
        self.common.last().copied().unwrap_or(0)
    }

    /// Checks that the three families chain together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] for malformed widths, an atom
    /// input other than the common output, or a bond input other than
    /// `2 * common output + pair_features`.
    pub fn validate(&self, pair_features: usize) -> Result<(), Error> {
        validate_widths(&self.common)?;
        validate_widths(&self.atom)?;
        validate_widths(&self.bond)?;

        let shared = self.common_width();
        if self.atom[0] != shared {
            return Err(Error::InvalidArchitecture(format!(
                "atom networks take {} inputs but the common networks produce {}",
                self.atom[0], shared
            )));
        }
        if self.bond[0] != 2 * shared + pair_features {
            return Err(Error::InvalidArchitecture(format!(
                "bond networks take {} inputs, expected 2 x {} + {} pair features",
                self.bond[0], shared, pair_features
            )));
        }
        Ok(())
    }

    /// Per-atom coefficient count.
    #[inline]
    pub fn atom_functions(&self) -> usize {
        self.atom.last().copied().unwrap_or(0)
    }

    /// Per-bond coefficient count after forward and reversed outputs are
    /// concatenated.
    #[inline]
    pub fn bond_functions(&self) -> usize {
        2 * self.bond.last().copied().unwrap_or(0)
    }
}
