//! Charge normalization method selection.

use serde::{Deserialize, Serialize};

/// How raw coefficients are made to reproduce the target charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    /// Raw predictions are returned unchanged.
    None,

    /// Nearest point on the charge-conserving hyperplane (KKT projection).
    #[default]
    Kkt,

    /// Uniform rescaling by `target / predicted`.
    Scale,
}
