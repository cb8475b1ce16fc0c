//! Per-segment charge normalization.
//!
//! Atoms are grouped into segments (for instance fragments of a complex),
//! each with its own target charge. Every segment present in an example
//! contributes one row to that example's constraint matrix.

use super::kkt::{check_pair, project};
use crate::forge::error::Error;
use nalgebra::DMatrix;
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Target and predicted charge of one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCharge {
    pub example: usize,
    pub segment: usize,
    pub target: f64,
    pub predicted: f64,
}

/// Atom slots of each present segment of one example, by segment id.
type SegmentSlots = BTreeMap<usize, Vec<usize>>;

fn collect_segments(
    coeffs: ArrayView3<'_, f64>,
    segments: ArrayView2<'_, i64>,
    charges: ArrayView2<'_, f64>,
) -> Result<Vec<SegmentSlots>, Error> {
    let (n, a, _) = coeffs.dim();
    if segments.dim() != (n, a) {
        return Err(Error::shape(
            "segments",
            format!("segment ids are {:?}, expected ({}, {})", segments.dim(), n, a),
        ));
    }
    if charges.nrows() != n {
        return Err(Error::shape(
            "segments",
            format!("{} rows of segment charges for {} examples", charges.nrows(), n),
        ));
    }
    let segment_count = charges.ncols();

    segments
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(ex, row)| {
            let mut slots = SegmentSlots::new();
            for (slot, &id) in row.iter().enumerate() {
                match id {
                    -1 => {}
                    s if s >= 0 && (s as u64) < segment_count as u64 => {
                        slots.entry(s as usize).or_default().push(slot);
                    }
                    s => return Err(Error::invalid_index(ex, slot, s)),
                }
            }
            Ok(slots)
        })
        .collect()
}

/// Normalizes `(N, A, F)` atom coefficients so that every segment of every
/// example reproduces its target charge.
///
/// `segments` is `(N, A)` with a segment id per atom and `-1` for atoms in no
/// segment; `charges` is `(N, S)`. Atoms outside every segment are left
/// unchanged.
///
/// # Errors
///
/// Returns [`Error::Shape`] for misaligned inputs, [`Error::InvalidIndex`]
/// for segment ids outside `-1..S`, and [`Error::DegenerateConstraint`] when
/// a segment's integrals are all zero.
pub fn normalize_segments(
    coeffs: ArrayView3<'_, f64>,
    integrals: ArrayView3<'_, f64>,
    segments: ArrayView2<'_, i64>,
    charges: ArrayView2<'_, f64>,
) -> Result<Array3<f64>, Error> {
    check_pair("segment normalizer", coeffs, integrals)?;
    let groups = collect_segments(coeffs, segments, charges)?;
    let (_, _, width) = coeffs.dim();

    let solutions = groups
        .par_iter()
        .enumerate()
        .map(|(ex, slots)| {
            let c: Vec<f64> = coeffs.index_axis(Axis(0), ex).iter().copied().collect();
            if slots.is_empty() {
                return Ok(c);
            }
            let ints = integrals.index_axis(Axis(0), ex);
            let mut constraints = DMatrix::zeros(slots.len(), c.len());
            let mut targets = Vec::with_capacity(slots.len());
            for (row, (&segment, atoms)) in slots.iter().enumerate() {
                for &atom in atoms {
                    for f in 0..width {
                        constraints[(row, atom * width + f)] = ints[(atom, f)];
                    }
                }
                targets.push(charges[(ex, segment)]);
            }
            project(ex, &c, &constraints, &targets)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Array3::zeros(coeffs.raw_dim());
    for (ex, x) in solutions.iter().enumerate() {
        for (o, v) in out.index_axis_mut(Axis(0), ex).iter_mut().zip(x) {
            *o = *v;
        }
    }
    Ok(out)
}

/// Reports target and predicted charge of every present segment, ordered by
/// example then segment id.
pub fn segment_charges(
    coeffs: ArrayView3<'_, f64>,
    integrals: ArrayView3<'_, f64>,
    segments: ArrayView2<'_, i64>,
    charges: ArrayView2<'_, f64>,
) -> Result<Vec<SegmentCharge>, Error> {
    check_pair("segment charges", coeffs, integrals)?;
    let groups = collect_segments(coeffs, segments, charges)?;

    let mut report = Vec::new();
    for (ex, slots) in groups.iter().enumerate() {
        for (&segment, atoms) in slots {
            let predicted = atoms
                .iter()
                .map(|&atom| {
                    coeffs
                        .slice(ndarray::s![ex, atom, ..])
                        .dot(&integrals.slice(ndarray::s![ex, atom, ..]))
                })
                .sum();
            report.push(SegmentCharge {
                example: ex,
                segment,
                target: charges[(ex, segment)],
                predicted,
            });
        }
    }
    Ok(report)
}
