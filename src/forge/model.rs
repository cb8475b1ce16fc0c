//! End-to-end density coefficient model.
//!
//! The pipeline for a padded batch is:
//!
//! 1. per-atom features from a [`FeatureExtractor`]
//! 2. common element networks → shared per-atom representation
//! 3. atom element networks → per-atom coefficients
//! 4. radial bond-length features from coordinates
//! 5. pair networks over forward and reversed bonds → per-bond coefficients
//! 6. charge normalization
//!
//! Pair networks are direction-dependent. Step 5 therefore evaluates every
//! bond in both directions and concatenates the two outputs on the last axis,
//! so the first half of a bond's coefficients belongs to its first endpoint
//! and the second half to its second endpoint.

use super::batch::{Connectivity, Labels, PaddedBatch};
use super::config::{ModelConfig, NormalizationMethod};
use super::error::Error;
use super::features::FeatureExtractor;
use super::geometry::PairDistanceFeatures;
use super::normalize;
use super::predictor::FeedForward;
use super::route::{ElementRouter, PairRouter};
use ndarray::{Array3, ArrayView1, ArrayView3, Axis, concatenate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Per-atom and per-bond coefficients of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    /// `(N, A, Fa)`
    pub atoms: Array3<f64>,
    /// `(N, B, 2 Fb)`
    pub bonds: Array3<f64>,
}

/// All network weights of a [`DensityModel`], in category order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub common: Vec<FeedForward>,
    pub atom: Vec<FeedForward>,
    pub bond: Vec<FeedForward>,
}

/// Predicts density coefficients for padded molecular batches.
#[derive(Debug, Clone)]
pub struct DensityModel {
    common: ElementRouter,
    atoms: ElementRouter,
    bonds: PairRouter,
    pair_features: PairDistanceFeatures,
    normalization: NormalizationMethod,
}

impl DensityModel {
    /// Builds a model with freshly initialized networks.
    ///
    /// Weights are drawn from a `StdRng` seeded with `config.seed`; output
    /// statistics from `config.statistics` are attached per category.
    pub fn new(config: &ModelConfig) -> Result<Self, Error> {
        config.validate()?;
        let elements = config.element_set()?;
        let arch = &config.architecture;
        let stats = config.statistics.as_ref();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let common = ElementRouter::random(
            elements.clone(),
            &arch.common,
            stats.and_then(|s| s.common.as_ref()),
            &mut rng,
        )?;
        let atoms = ElementRouter::random(
            elements.clone(),
            &arch.atom,
            stats.and_then(|s| s.atom.as_ref()),
            &mut rng,
        )?;
        let bonds = PairRouter::random(
            elements,
            &arch.bond,
            stats.and_then(|s| s.bond.as_ref()),
            &mut rng,
        )?;

        Self::from_parts(
            common,
            atoms,
            bonds,
            config.pair_features.clone(),
            config.normalization,
        )
    }

    /// Assembles a model from existing routers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if the routers use different
    /// element sets or their widths do not chain.
    pub fn from_parts(
        common: ElementRouter,
        atoms: ElementRouter,
        bonds: PairRouter,
        pair_features: PairDistanceFeatures,
        normalization: NormalizationMethod,
    ) -> Result<Self, Error> {
        if common.elements() != atoms.elements() || common.elements() != bonds.elements() {
            return Err(Error::InvalidArchitecture(
                "common, atom and bond routers must share one element set".to_string(),
            ));
        }
        pair_features.validate()?;
        let shared = common.output_width();
        if atoms.input_width() != shared {
            return Err(Error::InvalidArchitecture(format!(
                "atom networks take {} inputs but the common networks produce {}",
                atoms.input_width(),
                shared
            )));
        }
        if bonds.input_width() != 2 * shared + pair_features.width() {
            return Err(Error::InvalidArchitecture(format!(
                "bond networks take {} inputs, expected 2 x {} + {}",
                bonds.input_width(),
                shared,
                pair_features.width()
            )));
        }
        Ok(Self {
            common,
            atoms,
            bonds,
            pair_features,
            normalization,
        })
    }

    /// Width of the per-atom features the model expects.
    pub fn feature_width(&self) -> usize {
        self.common.input_width()
    }

    pub fn atom_functions(&self) -> usize {
        self.atoms.output_width()
    }

    pub fn bond_functions(&self) -> usize {
        2 * self.bonds.output_width()
    }

    pub fn normalization(&self) -> NormalizationMethod {
        self.normalization
    }

    /// Shared per-atom representation `(N, A, common out)`.
    pub fn forward_common(
        &self,
        labels: &Labels,
        features: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        self.common.route(labels, features)
    }

    /// Raw per-atom coefficients `(N, A, Fa)`.
    pub fn forward_atoms(
        &self,
        labels: &Labels,
        common: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        self.atoms.route(labels, common)
    }

    /// Bond-length features `(N, B, K)`.
    pub fn forward_pairs(
        &self,
        connectivity: &Connectivity,
        coordinates: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        self.pair_features.compute(connectivity, coordinates)
    }

    /// Raw per-bond coefficients `(N, B, 2 Fb)`: forward outputs followed by
    /// outputs for the reversed bonds.
    pub fn forward_bonds(
        &self,
        labels: &Labels,
        connectivity: &Connectivity,
        common: ArrayView3<'_, f64>,
        pairs: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        let forward = self
            .bonds
            .route(labels, connectivity, common, Some(pairs))?;
        let reversed = self
            .bonds
            .route(labels, &connectivity.reversed(), common, Some(pairs))?;
        concatenate(Axis(2), &[forward.view(), reversed.view()])
            .map_err(|e| Error::shape("bond coefficients", e.to_string()))
    }

    /// Runs the networks without normalization.
    pub fn predict_raw<E>(&self, extractor: &E, batch: &PaddedBatch) -> Result<Coefficients, Error>
    where
        E: FeatureExtractor + ?Sized,
    {
        if extractor.feature_width() != self.feature_width() {
            return Err(Error::shape(
                "features",
                format!(
                    "extractor produces {} features but the model expects {}",
                    extractor.feature_width(),
                    self.feature_width()
                ),
            ));
        }
        let features = extractor.extract(&batch.labels, batch.coordinates())?;
        let common = self.forward_common(&batch.labels, features.view())?;
        let atoms = self.forward_atoms(&batch.labels, common.view())?;
        let pairs = self.forward_pairs(&batch.connectivity, batch.coordinates())?;
        let bonds = self.forward_bonds(
            &batch.labels,
            &batch.connectivity,
            common.view(),
            pairs.view(),
        )?;

        tracing::debug!(
            examples = batch.example_count(),
            atoms = batch.max_atoms(),
            bonds = batch.max_bonds(),
            "predicted raw coefficients"
        );
        Ok(Coefficients { atoms, bonds })
    }

    /// Runs the networks and normalizes against per-example `charges`.
    ///
    /// `atom_integrals` and `bond_integrals` must have the shapes of the
    /// atom and bond coefficients.
    pub fn predict<E>(
        &self,
        extractor: &E,
        batch: &PaddedBatch,
        atom_integrals: ArrayView3<'_, f64>,
        bond_integrals: ArrayView3<'_, f64>,
        charges: ArrayView1<'_, f64>,
    ) -> Result<Coefficients, Error>
    where
        E: FeatureExtractor + ?Sized,
    {
        let raw = self.predict_raw(extractor, batch)?;
        let (atoms, bonds) = normalize::apply(
            self.normalization,
            raw.atoms.view(),
            raw.bonds.view(),
            atom_integrals,
            bond_integrals,
            charges,
        )?;
        Ok(Coefficients { atoms, bonds })
    }

    /// Copies out all network weights.
    pub fn weights(&self) -> ModelWeights {
        ModelWeights {
            common: self.common.router().predictors().to_vec(),
            atom: self.atoms.router().predictors().to_vec(),
            bond: self.bonds.router().predictors().to_vec(),
        }
    }

    /// Replaces all network weights.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Weights`] unless every family has one network per
    /// category with the current layer widths. The model is unchanged on
    /// error.
    pub fn set_weights(&mut self, weights: ModelWeights) -> Result<(), Error> {
        check_family("common", self.common.router().predictors(), &weights.common)?;
        check_family("atom", self.atoms.router().predictors(), &weights.atom)?;
        check_family("bond", self.bonds.router().predictors(), &weights.bond)?;

        let elements = self.common.elements().clone();
        let weights_err = |e: Error| Error::Weights(e.to_string());
        let common = ElementRouter::new(elements.clone(), weights.common).map_err(weights_err)?;
        let atoms = ElementRouter::new(elements.clone(), weights.atom).map_err(weights_err)?;
        let bonds = PairRouter::new(elements, weights.bond).map_err(weights_err)?;

        self.common = common;
        self.atoms = atoms;
        self.bonds = bonds;
        Ok(())
    }

    /// Builder form of [`set_weights`](Self::set_weights).
    pub fn with_weights(mut self, weights: ModelWeights) -> Result<Self, Error> {
        self.set_weights(weights)?;
        Ok(self)
    }
}

fn check_family(family: &str, current: &[FeedForward], networks: &[FeedForward]) -> Result<(), Error> {
    if networks.len() != current.len() {
        return Err(Error::Weights(format!(
            "{} {} networks given, the model has {}",
            networks.len(),
            family,
            current.len()
        )));
    }
    let widths = current.first().map(FeedForward::widths).unwrap_or_default();
    if let Some((idx, net)) = networks
        .iter()
        .enumerate()
        .find(|(_, net)| net.widths() != widths)
    {
        return Err(Error::Weights(format!(
            "{} network {} has widths {:?}, expected {:?}",
            family,
            idx,
            net.widths(),
            widths
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::features::PrecomputedFeatures;
    use crate::forge::predictor::{Linear, Predictor};
    use crate::forge::route::ElementSet;
    use crate::model::atom::Atom;
    use crate::model::molecule::{Bond, Molecule};
    use crate::model::types::Element;
    use ndarray::{Array, Array1, Array2, array, s};

    fn single_layer(weight: Array2<f64>, bias: Array1<f64>) -> FeedForward {
        FeedForward::from_layers(vec![Linear::new(weight, bias).unwrap()]).unwrap()
    }

    fn make_hydrogen_cyanide() -> Molecule {
        let mut mol = Molecule::new();
        mol.atoms.push(Atom::new(Element::H, [0.0, 0.0, -1.06]));
        mol.atoms.push(Atom::new(Element::C, [0.0, 0.0, 0.0]));
        mol.atoms.push(Atom::new(Element::N, [0.0, 0.0, 1.16]));
        mol.bonds.push(Bond::new(0, 1));
        mol.bonds.push(Bond::new(1, 2));
        mol
    }

    fn make_methylidyne() -> Molecule {
        let mut mol = Molecule::new();
        mol.atoms.push(Atom::new(Element::C, [0.0, 0.0, 0.0]));
        mol.atoms.push(Atom::new(Element::H, [1.12, 0.0, 0.0]));
        mol.bonds.push(Bond::new(0, 1));
        mol
    }

    /// Identity common networks, atom networks returning `[sum, z]` and
    /// bond networks summing their input plus the pair category.
    fn make_fixed_model(elements: &[u8]) -> DensityModel {
        let set = ElementSet::new(elements).unwrap();
        let pair = PairDistanceFeatures::new(vec![1.0], vec![0.0], 6.0).unwrap();

        let common = set
            .atomic_numbers()
            .iter()
            .map(|_| single_layer(Array2::eye(2), Array1::zeros(2)))
            .collect();
        let atoms = set
            .atomic_numbers()
            .iter()
            .map(|&z| single_layer(array![[1.0, 0.0], [1.0, 0.0]], array![0.0, f64::from(z)]))
            .collect();
        let bonds = (0..set.pair_count())
            .map(|c| single_layer(Array2::ones((5, 1)), array![c as f64]))
            .collect();

        DensityModel::from_parts(
            ElementRouter::new(set.clone(), common).unwrap(),
            ElementRouter::new(set.clone(), atoms).unwrap(),
            PairRouter::new(set, bonds).unwrap(),
            pair,
            NormalizationMethod::Kkt,
        )
        .unwrap()
    }

    #[test]
    fn fixed_networks_give_expected_coefficients() {
        let model = make_fixed_model(&[1, 6]);
        let batch = PaddedBatch::from_molecules(&[make_methylidyne()]).unwrap();
        let features = PrecomputedFeatures::new(array![[[1.0, 2.0], [0.5, 0.25]]]);

        let raw = model.predict_raw(&features, &batch).unwrap();

        assert_eq!(raw.atoms, array![[[3.0, 6.0], [0.75, 1.0]]]);

        let fc = model.pair_features.cutoff_fn(1.12);
        let g = (-(1.12f64).powi(2)).exp() * fc;
        // forward C-H is category 1*2+0 = 2, reversed H-C is 0*2+1 = 1
        assert!((raw.bonds[(0, 0, 0)] - (3.75 + g + 2.0)).abs() < 1e-12);
        assert!((raw.bonds[(0, 0, 1)] - (3.75 + g + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn forward_bonds_concatenates_both_directions() {
        let model = DensityModel::new(&ModelConfig::default()).unwrap();
        let batch = PaddedBatch::from_molecules(&[make_hydrogen_cyanide()]).unwrap();
        let common = Array::from_shape_fn((1, 3, 6), |(_, j, k)| (j + k) as f64 * 0.1);
        let pairs = model
            .forward_pairs(&batch.connectivity, batch.coordinates())
            .unwrap();

        let bonds = model
            .forward_bonds(&batch.labels, &batch.connectivity, common.view(), pairs.view())
            .unwrap();
        let reversed = model
            .forward_bonds(
                &batch.labels,
                &batch.connectivity.reversed(),
                common.view(),
                pairs.view(),
            )
            .unwrap();

        assert_eq!(bonds.dim(), (1, 2, 4));
        // Reversing the input swaps the two halves.
        assert_eq!(bonds.slice(s![.., .., ..2]), reversed.slice(s![.., .., 2..]));
        assert_eq!(bonds.slice(s![.., .., 2..]), reversed.slice(s![.., .., ..2]));
    }

    #[test]
    fn predict_conserves_charge_and_ignores_padding_examples() {
        let model = DensityModel::new(&ModelConfig {
            seed: 3,
            ..Default::default()
        })
        .unwrap();
        let batch =
            PaddedBatch::from_molecules(&[make_hydrogen_cyanide(), make_methylidyne()]).unwrap();
        let features = PrecomputedFeatures::new(Array::from_shape_fn((2, 3, 96), |(i, j, k)| {
            ((i * 7 + j * 3 + k) % 11) as f64 * 0.05
        }));

        let atom_i = Array3::from_elem((2, 3, 2), 0.5);
        let bond_i = Array3::from_elem((2, 2, 4), 0.25);
        let charges = array![14.0, 7.0];
        let out = model
            .predict(&features, &batch, atom_i.view(), bond_i.view(), charges.view())
            .unwrap();
        for ex in 0..2 {
            let total = (&out.atoms.index_axis(Axis(0), ex) * &atom_i.index_axis(Axis(0), ex))
                .sum()
                + (&out.bonds.index_axis(Axis(0), ex) * &bond_i.index_axis(Axis(0), ex)).sum();
            assert!((total - charges[ex]).abs() <= 1e-5 * charges[ex]);
        }

        let raw = model.predict_raw(&features, &batch).unwrap();
        let padded = batch.with_padding_examples(2);
        let mut padded_features = Array3::zeros((4, 3, 96));
        padded_features
            .slice_mut(s![..2, .., ..])
            .assign(&features.features());
        let raw_padded = model
            .predict_raw(&PrecomputedFeatures::new(padded_features), &padded)
            .unwrap();
        assert_eq!(raw_padded.atoms.slice(s![..2, .., ..]), raw.atoms);
        assert_eq!(raw_padded.bonds.slice(s![..2, .., ..]), raw.bonds);
        assert!(raw_padded.atoms.slice(s![2.., .., ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn extractor_width_must_match() {
        let model = DensityModel::new(&ModelConfig::default()).unwrap();
        let batch = PaddedBatch::from_molecules(&[make_methylidyne()]).unwrap();
        let features = PrecomputedFeatures::new(Array3::zeros((1, 2, 12)));
        assert!(matches!(
            model.predict_raw(&features, &batch),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn unknown_element_is_rejected() {
        let model = make_fixed_model(&[1, 6]);
        let batch = PaddedBatch::from_molecules(&[make_hydrogen_cyanide()]).unwrap();
        let features = PrecomputedFeatures::new(Array3::zeros((1, 3, 2)));
        assert!(matches!(
            model.predict_raw(&features, &batch),
            Err(Error::UnknownCategory { code: 7 })
        ));
    }

    #[test]
    fn weights_round_trip_and_validate() {
        let source = DensityModel::new(&ModelConfig {
            seed: 9,
            ..Default::default()
        })
        .unwrap();
        let weights = source.weights();
        let json = serde_json::to_string(&weights).unwrap();
        let loaded: ModelWeights = serde_json::from_str(&json).unwrap();

        let target = DensityModel::new(&ModelConfig::default())
            .unwrap()
            .with_weights(loaded)
            .unwrap();
        assert_eq!(target.weights(), weights);

        let mut short = weights.clone();
        short.bond.pop();
        let mut model = DensityModel::new(&ModelConfig::default()).unwrap();
        assert!(matches!(model.set_weights(short), Err(Error::Weights(_))));

        let mut wrong = weights;
        wrong.atom[0] = FeedForward::random(&[6, 3], &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(matches!(model.set_weights(wrong), Err(Error::Weights(_))));
    }

    #[test]
    fn malformed_stored_weights_fail_to_load() {
        let weights = DensityModel::new(&ModelConfig::default()).unwrap().weights();
        let value = serde_json::to_value(&weights).unwrap();

        let mut trimmed = value.clone();
        let bias = &mut trimmed["common"][0]["layers"][0]["bias"];
        bias["data"].as_array_mut().unwrap().pop();
        bias["dim"] = serde_json::json!([35]);
        assert!(serde_json::from_value::<ModelWeights>(trimmed).is_err());

        let mut stats = value;
        stats["atom"][1]["stats"] = serde_json::json!({ "mean": [0.0], "std": [1.0] });
        assert!(serde_json::from_value::<ModelWeights>(stats).is_err());
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let set = ElementSet::new(&[1, 6]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let common = ElementRouter::random(set.clone(), &[4, 3], None, &mut rng).unwrap();
        let atoms = ElementRouter::random(set.clone(), &[2, 2], None, &mut rng).unwrap();
        let bonds = PairRouter::random(set, &[16, 2], None, &mut rng).unwrap();
        assert!(matches!(
            DensityModel::from_parts(
                common,
                atoms,
                bonds,
                PairDistanceFeatures::default(),
                NormalizationMethod::None
            ),
            Err(Error::InvalidArchitecture(_))
        ));
        assert_eq!(
            make_fixed_model(&[1, 6]).bonds.router().predictor(0).map(Predictor::input_width),
            Some(5)
        );
    }
}
