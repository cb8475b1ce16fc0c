//! Core data structures representing molecules.
//!
//! This module provides the foundational types that flow through `density-forge`:
//!
//! - [`atom`] – Minimal atom representation with element and Cartesian coordinates.
//! - [`types`] – Periodic table elements.
//! - [`molecule`] – Molecules with atoms, bonds, and a net formal charge.
//!
//! Molecules are stacked into padded batches by [`crate::PaddedBatch`] before
//! they reach the prediction pipeline.

pub mod atom;
pub mod molecule;
pub mod types;
