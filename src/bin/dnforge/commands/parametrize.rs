use anyhow::{Context, Result, bail};
use density_forge::{FunctionDescriptor, Molecule, Parametrizer, PrecomputedFeatures};
use serde::Deserialize;

use super::{ensure_input, output_label};
use crate::cli::ParametrizeArgs;
use crate::config::build_model;
use crate::display::{Context as DisplayContext, Phase, Progress, print_parametrization};
use crate::io::{read_json, write_json};

#[derive(Deserialize)]
struct ParametrizeInput {
    molecule: Molecule,
    /// One feature row per atom.
    features: Vec<Vec<f64>>,
    functions: Vec<FunctionDescriptor>,
}

pub fn run_parametrize(args: ParametrizeArgs, ctx: DisplayContext) -> Result<()> {
    ensure_input(&args.io, "parametrize")?;

    let mut progress = Progress::new(ctx.interactive);

    progress.begin(Phase::Read);
    let input: ParametrizeInput = read_json(args.io.input.as_deref())?;
    let atoms = input.molecule.atom_count();
    let features =
        PrecomputedFeatures::from_rows(std::slice::from_ref(&input.features), &[atoms], atoms)
            .context("Invalid feature rows")?;
    progress.set_molecules(1);
    progress.end(
        Phase::Read,
        &[
            format!(
                "{} atoms, {} bonds",
                input.molecule.atom_count(),
                input.molecule.bond_count()
            ),
            format!("{} basis functions", input.functions.len()),
        ],
    );

    progress.begin(Phase::Model);
    let model = build_model(&args.model)?;
    progress.end(
        Phase::Model,
        &[format!("Normalization: {:?}", model.normalization())],
    );

    progress.begin(Phase::Predict);
    let result = Parametrizer::new(&model)
        .parametrize(&features, &input.molecule, &input.functions)
        .context("Parametrization failed")?;
    if args.strict && !result.warnings.is_empty() {
        bail!(
            "{} unmatched bond functions, first: {}",
            result.warnings.len(),
            result.warnings[0]
        );
    }
    let substeps: Vec<String> = result.warnings.iter().map(|w| w.to_string()).collect();
    progress.end(Phase::Predict, &substeps);

    if ctx.interactive {
        print_parametrization(&result);
    }

    progress.begin(Phase::Write);
    write_json(args.io.output.as_deref(), &result)?;
    progress.end(
        Phase::Write,
        &[format!("Write functions → {}", output_label(&args.io))],
    );

    progress.finish("Parametrization complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use density_forge::FunctionKind;

    #[test]
    fn input_document_parses_descriptors() {
        let json = r#"{
            "molecule": {
                "atoms": [
                    {"element": "C", "position": [0.0, 0.0, 0.0]},
                    {"element": "H", "position": [1.09, 0.0, 0.0]}
                ],
                "bonds": [{"i": 0, "j": 1}]
            },
            "features": [[0.1, 0.2], [0.3, 0.4]],
            "functions": [
                {"kind": "core", "center": 0, "integral": 2.0},
                {"kind": "iso", "center": 1, "slot": 1, "integral": 1.0},
                {"kind": "aniso", "center": 1, "bond": 0, "integral": 0.5}
            ]
        }"#;
        let input: ParametrizeInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.functions.len(), 3);
        assert_eq!(input.functions[0].kind, FunctionKind::Core);
        assert_eq!(input.functions[1].slot, 1);
        assert_eq!(input.functions[2].bond, Some(0));
        assert!(input.functions.iter().all(|f| f.coefficient.is_none()));
    }
}
