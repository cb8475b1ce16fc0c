//! Per-bond geometric features.
//!
//! Each bond is described by a radial Gaussian expansion of its length,
//! damped by a cosine cutoff:
//!
//! ```text
//! g_k(d) = exp(-eta_k * (d - s_k)^2) * f_c(d)
//! f_c(d) = 0.5 * cos(pi * d / R_c) + 0.5   for d <= R_c, else 0
//! ```

use super::batch::Connectivity;
use super::error::Error;
use ndarray::{Array3, ArrayView3, s};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const DEFAULT_ETA: f64 = 10.0;
const DEFAULT_SHIFT_STEP: f64 = 0.5;
const DEFAULT_TERMS: usize = 10;
const DEFAULT_CUTOFF: f64 = 6.0;

/// Radial expansion parameters for bond-length features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDistanceFeatures {
    /// Gaussian widths, one per term.
    pub eta: Vec<f64>,
    /// Gaussian centers in length units, one per term.
    pub shifts: Vec<f64>,
    /// Cutoff radius `R_c`.
    pub cutoff: f64,
}

impl Default for PairDistanceFeatures {
    fn default() -> Self {
        Self {
            eta: vec![DEFAULT_ETA; DEFAULT_TERMS],
            shifts: (0..DEFAULT_TERMS)
                .map(|k| k as f64 * DEFAULT_SHIFT_STEP)
                .collect(),
            cutoff: DEFAULT_CUTOFF,
        }
    }
}

impl PairDistanceFeatures {
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if `eta` and `shifts` differ in
    /// length or the cutoff is not positive.
    pub fn new(eta: Vec<f64>, shifts: Vec<f64>, cutoff: f64) -> Result<Self, Error> {
        let features = Self {
            eta,
            shifts,
            cutoff,
        };
        features.validate()?;
        Ok(features)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.eta.len() != self.shifts.len() {
            return Err(Error::InvalidArchitecture(format!(
                "{} pair-feature widths for {} shifts",
                self.eta.len(),
                self.shifts.len()
            )));
        }
        if self.cutoff.is_nan() || self.cutoff <= 0.0 {
            return Err(Error::InvalidArchitecture(format!(
                "pair-feature cutoff must be positive, got {}",
                self.cutoff
            )));
        }
        Ok(())
    }

    /// Number of features per bond.
    #[inline]
    pub fn width(&self) -> usize {
        self.eta.len()
    }

    #[inline]
    pub fn cutoff_fn(&self, d: f64) -> f64 {
        if d <= self.cutoff {
            0.5 * (PI * d / self.cutoff).cos() + 0.5
        } else {
            0.0
        }
    }

    /// Expansion of a single distance.
    pub fn expand(&self, d: f64) -> impl Iterator<Item = f64> + '_ {
        let fc = self.cutoff_fn(d);
        self.eta
            .iter()
            .zip(&self.shifts)
            .map(move |(&eta, &shift)| (-eta * (d - shift).powi(2)).exp() * fc)
    }

    /// Computes `(N, B, K)` features for every bond slot; padding slots are
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] unless `coordinates` is `(N, A, 3)` with the
    /// connectivity's `N`, and [`Error::InvalidIndex`] for bond endpoints
    /// beyond `A`.
    pub fn compute(
        &self,
        connectivity: &Connectivity,
        coordinates: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        let (n, b) = connectivity.shape();
        let (coord_examples, a, dim) = coordinates.dim();
        if coord_examples != n || dim != 3 {
            return Err(Error::shape(
                "pair features",
                format!(
                    "coordinates are {:?}, expected ({}, _, 3)",
                    coordinates.dim(),
                    n
                ),
            ));
        }

        let mut out = Array3::zeros((n, b, self.width()));
        for example in 0..n {
            for (slot, i, j) in connectivity.bonds_of(example) {
                if i >= a || j >= a {
                    return Err(Error::invalid_index(example, slot, i.max(j) as i64));
                }
                let ri = coordinates.slice(s![example, i, ..]);
                let rj = coordinates.slice(s![example, j, ..]);
                let d = ri
                    .iter()
                    .zip(rj.iter())
                    .map(|(p, q)| (p - q).powi(2))
                    .sum::<f64>()
                    .sqrt();
                for (o, v) in out.slice_mut(s![example, slot, ..]).iter_mut().zip(self.expand(d)) {
                    *o = v;
                }
            }
        }
        Ok(out)
    }
}
