use super::{CategoryRouter, ElementSet};
use crate::forge::batch::Labels;
use crate::forge::error::Error;
use crate::forge::predictor::{FeedForward, OutputStats, Predictor, build_networks};
use ndarray::{Array3, ArrayView3, ArrayViewD, Ix3};
use rand::rngs::StdRng;
use std::collections::HashMap;

/// Routes per-atom feature vectors to the predictor of the atom's element.
#[derive(Debug, Clone)]
pub struct ElementRouter<P = FeedForward> {
    elements: ElementSet,
    router: CategoryRouter<P>,
}

impl ElementRouter<FeedForward> {
    /// Builds randomly initialized networks of `widths` for every element.
    ///
    /// `stats` is keyed by element symbol; see
    /// [`build_networks`](crate::forge::predictor::build_networks).
    pub fn random(
        elements: ElementSet,
        widths: &[usize],
        stats: Option<&HashMap<String, OutputStats>>,
        rng: &mut StdRng,
    ) -> Result<Self, Error> {
        let networks = build_networks(elements.symbols(), widths, stats, rng)?;
        Self::new(elements, networks)
    }
}

impl<P: Predictor> ElementRouter<P> {
    /// Creates a router with one predictor per element, in category order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if the predictor count differs
    /// from the element count or the predictors disagree on widths.
    pub fn new(elements: ElementSet, predictors: Vec<P>) -> Result<Self, Error> {
        if predictors.len() != elements.len() {
            return Err(Error::InvalidArchitecture(format!(
                "{} element predictors for {} elements",
                predictors.len(),
                elements.len()
            )));
        }
        Ok(Self {
            elements,
            router: CategoryRouter::new(predictors)?,
        })
    }

    pub fn elements(&self) -> &ElementSet {
        &self.elements
    }

    pub fn router(&self) -> &CategoryRouter<P> {
        &self.router
    }

    pub fn input_width(&self) -> usize {
        self.router.input_width()
    }

    pub fn output_width(&self) -> usize {
        self.router.output_width()
    }

    /// Predicts `(N, A, out)` from `(N, A, D)` atom features.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if the features' leading dimensions differ
    /// from the labels or their width differs from the predictor input, and
    /// [`Error::UnknownCategory`] for elements outside the set.
    pub fn route(&self, labels: &Labels, features: ArrayView3<'_, f64>) -> Result<Array3<f64>, Error> {
        let (n, a, d) = features.dim();
        if (n, a) != labels.shape() {
            return Err(Error::shape(
                "element router",
                format!(
                    "features are ({}, {}, _) but labels are {:?}",
                    n,
                    a,
                    labels.shape()
                ),
            ));
        }

        let categories = labels
            .iter_flat()
            .map(|code| code.map(|z| self.elements.category(z)).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        let flat = features
            .to_shape((n * a, d))
            .map_err(|e| Error::shape("element router", e.to_string()))?;
        let y = self.router.route(&categories, flat.view())?;

        y.into_shape_with_order((n, a, self.output_width()))
            .map_err(|e| Error::shape("element router", e.to_string()))
    }

    /// Boundary variant taking `-1`-padded labels of any rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] unless labels are rank 2 and features rank 3.
    pub fn route_sentinel(
        &self,
        labels: ArrayViewD<'_, i64>,
        features: ArrayViewD<'_, f64>,
    ) -> Result<Array3<f64>, Error> {
        let labels = Labels::from_sentinel(labels)?;
        let features = features.into_dimensionality::<Ix3>().map_err(|_| {
            Error::shape(
                "element router",
                "expected rank-3 (examples, atoms, features) input",
            )
        })?;
        self.route(&labels, features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::predictor::Linear;
    use ndarray::{Array, Array2, IxDyn, array, s};
    use rand::SeedableRng;

    fn scaled(factor: f64) -> Linear {
        Linear::new(array![[factor, 0.0], [0.0, factor]], array![0.0, 1.0]).unwrap()
    }

    fn make_router() -> ElementRouter<Linear> {
        ElementRouter::new(ElementSet::new(&[1, 6]).unwrap(), vec![scaled(1.0), scaled(10.0)])
            .unwrap()
    }

    fn labels(raw: Array2<i64>) -> Labels {
        Labels::from_sentinel(raw.view().into_dyn()).unwrap()
    }

    #[test]
    fn routes_each_atom_to_its_element() {
        let router = make_router();
        let labels = labels(array![[6, 1, -1], [1, 1, 6]]);
        let features = Array::from_shape_fn((2, 3, 2), |(i, j, k)| (i * 6 + j * 2 + k) as f64);

        let y = router.route(&labels, features.view()).unwrap();

        assert_eq!(y.dim(), (2, 3, 2));
        assert_eq!(y.slice(s![0, 0, ..]), array![0.0, 11.0]);
        assert_eq!(y.slice(s![0, 1, ..]), array![2.0, 4.0]);
        assert_eq!(y.slice(s![0, 2, ..]), array![0.0, 0.0]);
        assert_eq!(y.slice(s![1, 2, ..]), array![100.0, 111.0]);
    }

    #[test]
    fn unknown_element_fails_before_prediction() {
        let router = make_router();
        let labels = labels(array![[6, 8]]);
        let features = Array3::zeros((1, 2, 2));
        assert!(matches!(
            router.route(&labels, features.view()),
            Err(Error::UnknownCategory { code: 8 })
        ));
    }

    #[test]
    fn shape_errors_at_boundary() {
        let router = make_router();
        let labels = labels(array![[6, 1]]);
        assert!(matches!(
            router.route(&labels, Array3::zeros((1, 3, 2)).view()),
            Err(Error::Shape { .. })
        ));
        assert!(matches!(
            router.route(&labels, Array3::zeros((1, 2, 5)).view()),
            Err(Error::Shape { .. })
        ));

        let flat_features = Array::<f64, _>::zeros(IxDyn(&[2, 2]));
        let raw_labels = array![[6i64, 1]];
        assert!(matches!(
            router.route_sentinel(raw_labels.view().into_dyn(), flat_features.view()),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn padding_examples_do_not_change_outputs() {
        let router = ElementRouter::random(
            ElementSet::new(&[1, 6, 7, 8]).unwrap(),
            &[4, 3, 2],
            None,
            &mut StdRng::seed_from_u64(11),
        )
        .unwrap();
        let original = labels(array![[8, 1, 1], [6, 7, -1]]);
        let features = Array::from_shape_fn((2, 3, 4), |(i, j, k)| ((i + 1) * (j + 2)) as f64 - k as f64 * 0.3);
        let y = router.route(&original, features.view()).unwrap();

        let extended = labels(array![[8, 1, 1], [6, 7, -1], [-1, -1, -1]]);
        let mut extended_features = Array3::zeros((3, 3, 4));
        extended_features.slice_mut(s![..2, .., ..]).assign(&features);
        let y_ext = router.route(&extended, extended_features.view()).unwrap();

        assert_eq!(y_ext.slice(s![..2, .., ..]), y);
        assert!(y_ext.slice(s![2, .., ..]).iter().all(|&v| v == 0.0));
    }
}
