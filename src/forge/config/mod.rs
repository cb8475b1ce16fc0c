//! Configuration types for density prediction.
//!
//! This module defines the structures that control how a
//! [`DensityModel`](crate::DensityModel) is built and how its output is
//! normalized. A configuration is plain data and is usually read from TOML
//! (see [`load_config`](crate::load_config)).
//!
//! # Overview
//!
//! - [`ModelConfig`] — Main configuration struct
//! - [`Architecture`] — Layer widths of the network families
//! - [`NormalizationMethod`] — Charge normalization selection
//! - [`Statistics`] — Output de-normalization per category

mod architecture;
mod normalization;

pub use architecture::Architecture;
pub use normalization::NormalizationMethod;

use super::error::Error;
use super::geometry::PairDistanceFeatures;
use super::predictor::OutputStats;
use super::route::ElementSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output statistics of trained networks.
///
/// Common and atom statistics are keyed by element symbol (`"C"`), bond
/// statistics by concatenated pair symbols (`"CH"`). When a table is present,
/// categories missing from it are built as untrained networks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub common: Option<HashMap<String, OutputStats>>,
    #[serde(default)]
    pub atom: Option<HashMap<String, OutputStats>>,
    #[serde(default)]
    pub bond: Option<HashMap<String, OutputStats>>,
}

/// Main configuration for a density model.
///
/// # Examples
///
/// ```
/// use density_forge::{ModelConfig, NormalizationMethod};
///
/// let config = ModelConfig {
///     normalization: NormalizationMethod::Scale,
///     seed: 7,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Network layer widths.
    pub architecture: Architecture,

    /// Allowed atomic numbers. Any order; categories follow atomic number.
    pub elements: Vec<u8>,

    /// Radial expansion used for per-bond geometric features.
    pub pair_features: PairDistanceFeatures,

    /// Normalization applied by [`DensityModel::predict`](crate::DensityModel::predict).
    pub normalization: NormalizationMethod,

    /// Seed for weight initialization.
    pub seed: u64,

    /// Optional output statistics.
    pub statistics: Option<Statistics>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::default(),
            elements: vec![1, 6, 7, 8],
            pair_features: PairDistanceFeatures::default(),
            normalization: NormalizationMethod::Kkt,
            seed: 0,
            statistics: None,
        }
    }
}

impl ModelConfig {
    /// Checks element set, pair features and architecture together.
    pub fn validate(&self) -> Result<(), Error> {
        ElementSet::new(&self.elements)?;
        self.pair_features.validate()?;
        self.architecture.validate(self.pair_features.width())
    }

    pub fn element_set(&self) -> Result<ElementSet, Error> {
        ElementSet::new(&self.elements)
    }
}
