use anyhow::{Context, Result, bail};
use density_forge::{
    DensityModel, Molecule, NormalizationMethod, PaddedBatch, PrecomputedFeatures, atomic_charges,
};
use ndarray::{Array1, Array3, ArrayView3, Axis, s};
use serde::{Deserialize, Serialize};

use super::{ensure_input, output_label};
use crate::cli::PredictArgs;
use crate::config::build_model;
use crate::display::{
    Context as DisplayContext, Phase, Progress, print_batch_info, print_charge_balance,
};
use crate::io::{read_json, write_json};

#[derive(Deserialize)]
struct PredictInput {
    molecules: Vec<MoleculeEntry>,
}

#[derive(Deserialize)]
struct MoleculeEntry {
    #[serde(flatten)]
    molecule: Molecule,
    /// One feature row per atom.
    features: Vec<Vec<f64>>,
    /// One row of atom function integrals per atom.
    atom_integrals: Vec<Vec<f64>>,
    /// One row of bond function integrals per bond (forward then reversed).
    #[serde(default)]
    bond_integrals: Vec<Vec<f64>>,
    /// Overrides the electron count derived from elements and net charge.
    #[serde(default)]
    electrons: Option<f64>,
}

#[derive(Serialize)]
struct PredictOutput {
    normalization: NormalizationMethod,
    molecules: Vec<MoleculeCoefficients>,
}

#[derive(Serialize)]
struct MoleculeCoefficients {
    atoms: Vec<Vec<f64>>,
    bonds: Vec<Vec<f64>>,
    electrons: f64,
    predicted: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    atomic_charges: Option<Vec<f64>>,
}

pub fn run_predict(args: PredictArgs, ctx: DisplayContext) -> Result<()> {
    ensure_input(&args.io, "predict")?;

    let mut progress = Progress::new(ctx.interactive);

    progress.begin(Phase::Read);
    let input: PredictInput = read_json(args.io.input.as_deref())?;
    if input.molecules.is_empty() {
        bail!("Input contains no molecules");
    }
    let molecules: Vec<Molecule> = input.molecules.iter().map(|e| e.molecule.clone()).collect();
    let batch = PaddedBatch::from_molecules(&molecules).context("Failed to batch molecules")?;
    progress.set_molecules(molecules.len());
    progress.end(
        Phase::Read,
        &[format!(
            "Pad {} molecules to {} atoms × {} bonds",
            molecules.len(),
            batch.max_atoms(),
            batch.max_bonds()
        )],
    );

    if ctx.interactive {
        print_batch_info(&molecules);
    }

    progress.begin(Phase::Model);
    let model = build_model(&args.model)?;
    progress.end(
        Phase::Model,
        &[
            format!("{} features per atom", model.feature_width()),
            format!(
                "{} atom / {} bond functions",
                model.atom_functions(),
                model.bond_functions()
            ),
            format!("Normalization: {:?}", model.normalization()),
        ],
    );

    progress.begin(Phase::Predict);
    let inputs = BatchInputs::assemble(&input.molecules, &batch, &model)?;
    let coefficients = model
        .predict(
            &inputs.features,
            &batch,
            inputs.atom_integrals.view(),
            inputs.bond_integrals.view(),
            inputs.electrons.view(),
        )
        .context("Prediction failed")?;

    let predicted = per_example_total(coefficients.atoms.view(), inputs.atom_integrals.view())
        + per_example_total(coefficients.bonds.view(), inputs.bond_integrals.view());
    let charges = if args.atomic_charges {
        Some(
            atomic_charges(
                inputs.atom_integrals.view(),
                inputs.bond_integrals.view(),
                coefficients.atoms.view(),
                coefficients.bonds.view(),
                &batch.connectivity,
            )
            .context("Failed to partition charges")?,
        )
    } else {
        None
    };
    progress.end(Phase::Predict, &[]);

    if ctx.interactive {
        let rows: Vec<(f64, f64)> = inputs
            .electrons
            .iter()
            .copied()
            .zip(predicted.iter().copied())
            .collect();
        print_charge_balance(&rows);
    }

    progress.begin(Phase::Write);
    let output = PredictOutput {
        normalization: model.normalization(),
        molecules: molecules
            .iter()
            .enumerate()
            .map(|(example, mol)| MoleculeCoefficients {
                atoms: rows_of(coefficients.atoms.view(), example, mol.atom_count()),
                bonds: rows_of(coefficients.bonds.view(), example, mol.bond_count()),
                electrons: inputs.electrons[example],
                predicted: predicted[example],
                atomic_charges: charges
                    .as_ref()
                    .map(|q| q.slice(s![example, ..mol.atom_count()]).to_vec()),
            })
            .collect(),
    };
    write_json(args.io.output.as_deref(), &output)?;
    progress.end(
        Phase::Write,
        &[format!("Write coefficients → {}", output_label(&args.io))],
    );

    progress.finish("Prediction complete");
    Ok(())
}

/// Padded tensors assembled from per-molecule rows.
struct BatchInputs {
    features: PrecomputedFeatures,
    atom_integrals: Array3<f64>,
    bond_integrals: Array3<f64>,
    electrons: Array1<f64>,
}

impl BatchInputs {
    fn assemble(
        entries: &[MoleculeEntry],
        batch: &PaddedBatch,
        model: &DensityModel,
    ) -> Result<Self> {
        let atom_counts: Vec<usize> = entries.iter().map(|e| e.molecule.atom_count()).collect();
        let bond_counts: Vec<usize> = entries.iter().map(|e| e.molecule.bond_count()).collect();

        let feature_rows: Vec<Vec<Vec<f64>>> =
            entries.iter().map(|e| e.features.clone()).collect();
        let features =
            PrecomputedFeatures::from_rows(&feature_rows, &atom_counts, batch.max_atoms())
                .context("Invalid feature rows")?;

        let atom_rows: Vec<&[Vec<f64>]> =
            entries.iter().map(|e| e.atom_integrals.as_slice()).collect();
        let bond_rows: Vec<&[Vec<f64>]> =
            entries.iter().map(|e| e.bond_integrals.as_slice()).collect();

        let atom_integrals = pad_rows(
            "atom_integrals",
            &atom_rows,
            &atom_counts,
            batch.max_atoms(),
            model.atom_functions(),
        )?;
        let bond_integrals = pad_rows(
            "bond_integrals",
            &bond_rows,
            &bond_counts,
            batch.max_bonds(),
            model.bond_functions(),
        )?;

        let electrons = entries
            .iter()
            .map(|e| e.electrons.unwrap_or_else(|| e.molecule.electron_count()))
            .collect();

        Ok(Self {
            features,
            atom_integrals,
            bond_integrals,
            electrons,
        })
    }
}

/// Stacks per-molecule rows into a zero-padded `(N, slots, width)` tensor,
/// requiring exactly one row of `width` values per atom or bond.
fn pad_rows(
    field: &str,
    rows: &[&[Vec<f64>]],
    counts: &[usize],
    slots: usize,
    width: usize,
) -> Result<Array3<f64>> {
    let mut out = Array3::zeros((rows.len(), slots, width));
    for (example, (mol_rows, &count)) in rows.iter().zip(counts).enumerate() {
        if mol_rows.len() != count {
            bail!(
                "Molecule {} has {} {} rows, expected {}",
                example,
                mol_rows.len(),
                field,
                count
            );
        }
        for (slot, row) in mol_rows.iter().enumerate() {
            if row.len() != width {
                bail!(
                    "Molecule {} {} row {} has {} values, expected {}",
                    example,
                    field,
                    slot,
                    row.len(),
                    width
                );
            }
            for (k, &v) in row.iter().enumerate() {
                out[(example, slot, k)] = v;
            }
        }
    }
    Ok(out)
}

fn per_example_total(coeffs: ArrayView3<'_, f64>, integrals: ArrayView3<'_, f64>) -> Array1<f64> {
    (&coeffs * &integrals).sum_axis(Axis(2)).sum_axis(Axis(1))
}

/// Unpadded rows `0..count` of one example.
fn rows_of(values: ArrayView3<'_, f64>, example: usize, count: usize) -> Vec<Vec<f64>> {
    values
        .slice(s![example, ..count, ..])
        .outer_iter()
        .map(|row| row.to_vec())
        .collect()
}
