//! A pure Rust library for predicting electron-density expansion coefficients
//! of molecules with element-specific neural networks.
//! It routes the atoms and bonds of padded molecular batches to per-element
//! and per-element-pair regressors, then normalizes the predicted
//! coefficients so that their integral reproduces the molecule's electron count.
//!
//! # Features
//!
//! - **Categorical routing** — Each atom goes to the network of its element,
//!   each bond to the network of its ordered endpoint pair, with one batched
//!   call per category
//! - **Charge normalization** — Nearest-point (KKT) projection onto the
//!   charge-conserving hyperplane, uniform rescaling, or per-segment targets
//! - **Bond geometry** — Radial Gaussian features of bond lengths with a
//!   cosine cutoff
//! - **Parametrization** — Fills coefficients of a persisted basis-function
//!   list for a single molecule
//!
//! # Quick Start
//!
//! The main entry point is [`DensityModel`], built from a [`ModelConfig`]:
//!
//! ```
//! use density_forge::{Atom, Bond, Element, Molecule};
//! use density_forge::{DensityModel, ForgeError, ModelConfig, PaddedBatch, PrecomputedFeatures};
//! use ndarray::{Array3, array};
//!
//! // Water (H₂O)
//! let mut water = Molecule::new();
//! water.atoms.push(Atom::new(Element::O, [ 0.000, 0.000, 0.000]));
//! water.atoms.push(Atom::new(Element::H, [ 0.957, 0.000, 0.000]));
//! water.atoms.push(Atom::new(Element::H, [-0.240, 0.927, 0.000]));
//! water.bonds.push(Bond::new(0, 1));
//! water.bonds.push(Bond::new(0, 2));
//!
//! let model = DensityModel::new(&ModelConfig::default())?;
//! let batch = PaddedBatch::from_molecules(&[water.clone()])?;
//!
//! // Per-atom features normally come from an upstream extractor.
//! let features = PrecomputedFeatures::new(Array3::from_elem((1, 3, model.feature_width()), 0.1));
//!
//! // Basis-function integrals, laid out like the coefficients.
//! let atom_integrals = Array3::from_elem((1, 3, model.atom_functions()), 1.0);
//! let bond_integrals = Array3::from_elem((1, 2, model.bond_functions()), 0.5);
//! let charges = array![water.electron_count()];
//!
//! let coefficients = model.predict(
//!     &features,
//!     &batch,
//!     atom_integrals.view(),
//!     bond_integrals.view(),
//!     charges.view(),
//! )?;
//!
//! let total = (&coefficients.atoms * &atom_integrals).sum()
//!     + (&coefficients.bonds * &bond_integrals).sum();
//! assert!((total - 10.0).abs() < 1e-6);
//! # Ok::<(), ForgeError>(())
//! ```
//!
//! # Module Organization
//!
//! - [`DensityModel`] — End-to-end prediction pipeline
//! - [`ElementRouter`] / [`PairRouter`] — Category routing of atoms and bonds
//! - [`normalize`] / [`scale_normalize`] / [`normalize_segments`] — Charge
//!   normalization
//! - [`Parametrizer`] — Coefficients for persisted basis functions
//! - [`load_config`] — Configuration from TOML
//!
//! # Data Types
//!
//! ## Input Structures
//!
//! - [`Molecule`] — Atoms, bonds and net charge
//! - [`Atom`] — Single atom with element and Cartesian coordinates
//! - [`Bond`] — Ordered pair of atom indices
//! - [`Element`] — Chemical element (H through Kr)
//! - [`PaddedBatch`] — Padded labels, connectivity and coordinates
//!
//! ## Output Structures
//!
//! - [`Coefficients`] — Per-atom and per-bond coefficients
//! - [`Parametrization`] — Descriptors with coefficients and warnings
//! - [`SegmentCharge`] — Target and predicted charge of a segment
//!
//! ## Configuration
//!
//! - [`ModelConfig`] — Architecture, elements, pair features, normalization
//! - [`Architecture`] — Layer widths of the network families
//! - [`NormalizationMethod`] — None, KKT, or scale normalization
//! - [`Statistics`] — Output de-normalization per category

mod forge;
mod model;

pub use model::atom::Atom;
pub use model::molecule::{Bond, Molecule};
pub use model::types::{Element, ParseElementError};

pub use forge::{
    Architecture, CategoryRouter, Coefficients, Connectivity, DensityModel, ElementRouter,
    ElementSet, FeatureExtractor, FeedForward, FlatIndex, FunctionDescriptor, FunctionKind,
    Labels, Linear, ModelConfig, ModelWeights, NormalizationMethod, OutputStats, PaddedBatch,
    PairDistanceFeatures, PairRouter, Parametrization, Parametrizer, Predictor,
    PrecomputedFeatures, RouteGroup, RoutePlan, SegmentCharge, Statistics, UnmatchedBond,
    atomic_charges, celu, default_config, forge, load_config, normalize, normalize_atoms,
    normalize_segments, project, scale_normalize, segment_charges, total_charges,
};

pub use forge::Error as ForgeError;
