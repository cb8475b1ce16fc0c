mod batch;
mod charges;
mod config;
mod error;
mod features;
mod geometry;
mod index;
mod model;
mod normalize;
mod parametrize;
mod params;
mod predictor;
mod route;

pub use batch::{Connectivity, Labels, PaddedBatch};
pub use charges::atomic_charges;
pub use config::{Architecture, ModelConfig, NormalizationMethod, Statistics};
pub use error::Error;
pub use features::{FeatureExtractor, PrecomputedFeatures};
pub use geometry::PairDistanceFeatures;
pub use index::FlatIndex;
pub use model::{Coefficients, DensityModel, ModelWeights};
pub use normalize::{
    SegmentCharge, normalize, normalize_atoms, normalize_segments, project, scale_normalize,
    segment_charges, total_charges,
};
pub use parametrize::{
    FunctionDescriptor, FunctionKind, Parametrization, Parametrizer, UnmatchedBond,
};
pub use params::{default_config, load_config};
pub use predictor::{FeedForward, Linear, OutputStats, Predictor, celu};
pub use route::{CategoryRouter, ElementRouter, ElementSet, PairRouter, RouteGroup, RoutePlan};

use crate::model::molecule::Molecule;

/// Builds a model from `config` and predicts normalized coefficients for
/// `molecules`, using each molecule's electron count as its charge target.
///
/// `features` must be `(N, A, D)` for the padded batch of `molecules`;
/// integrals must match the model's coefficient layout.
pub fn forge<E>(
    molecules: &[Molecule],
    extractor: &E,
    atom_integrals: ndarray::ArrayView3<'_, f64>,
    bond_integrals: ndarray::ArrayView3<'_, f64>,
    config: &ModelConfig,
) -> Result<Coefficients, Error>
where
    E: FeatureExtractor + ?Sized,
{
    let model = DensityModel::new(config)?;
    let batch = PaddedBatch::from_molecules(molecules)?;
    let charges: ndarray::Array1<f64> = molecules.iter().map(Molecule::electron_count).collect();
    model.predict(
        extractor,
        &batch,
        atom_integrals,
        bond_integrals,
        charges.view(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::atom::Atom;
    use crate::model::molecule::Bond;
    use crate::model::types::Element;
    use ndarray::{Array3, Axis, s};

    fn make_water() -> Molecule {
        let mut mol = Molecule::new();
        mol.atoms.push(Atom::new(Element::O, [0.0, 0.0, 0.0]));
        mol.atoms.push(Atom::new(Element::H, [0.96, 0.0, 0.0]));
        mol.atoms.push(Atom::new(Element::H, [-0.24, 0.93, 0.0]));
        mol.bonds.push(Bond::new(0, 1));
        mol.bonds.push(Bond::new(0, 2));
        mol
    }

    fn make_ammonium() -> Molecule {
        let mut mol = Molecule::new();
        mol.atoms.push(Atom::new(Element::N, [0.0, 0.0, 0.0]));
        mol.atoms.push(Atom::new(Element::H, [1.01, 0.0, 0.0]));
        mol.bonds.push(Bond::new(1, 0));
        mol.net_charge = 1.0;
        mol
    }

    #[test]
    fn forge_conserves_each_molecule_electron_count() {
        let config = ModelConfig::default();
        let molecules = [make_water(), make_ammonium()];
        let width = config.architecture.common[0];
        let rows: Vec<Vec<Vec<f64>>> = molecules
            .iter()
            .map(|m| {
                (0..m.atom_count())
                    .map(|a| (0..width).map(|k| ((a + k) % 7) as f64 * 0.05).collect())
                    .collect()
            })
            .collect();
        let features = PrecomputedFeatures::from_rows(&rows, &[3, 2], 3).unwrap();

        let mut atom_integrals = Array3::ones((2, 3, config.architecture.atom_functions()));
        atom_integrals.slice_mut(s![1, 2, ..]).fill(0.0);
        let mut bond_integrals =
            Array3::from_elem((2, 2, config.architecture.bond_functions()), 0.25);
        bond_integrals.slice_mut(s![1, 1, ..]).fill(0.0);

        let out = forge(
            &molecules,
            &features,
            atom_integrals.view(),
            bond_integrals.view(),
            &config,
        )
        .unwrap();

        let totals = (&out.atoms * &atom_integrals).sum_axis(Axis(2)).sum_axis(Axis(1))
            + (&out.bonds * &bond_integrals).sum_axis(Axis(2)).sum_axis(Axis(1));
        assert!((totals[0] - 10.0).abs() < 1e-8);
        // N + H minus one for the positive charge
        assert!((totals[1] - 7.0).abs() < 1e-8);
        assert!(out.atoms.slice(s![1, 2, ..]).iter().all(|&v| v == 0.0));
        assert!(out.bonds.slice(s![1, 1, ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn forge_rejects_features_of_the_wrong_width() {
        let features = PrecomputedFeatures::new(Array3::zeros((1, 3, 4)));
        let config = ModelConfig::default();
        let result = forge(
            &[make_water()],
            &features,
            Array3::ones((1, 3, 2)).view(),
            Array3::ones((1, 2, 4)).view(),
            &config,
        );
        assert!(matches!(result, Err(Error::Shape { .. })));
    }
}
