use super::{CategoryRouter, ElementSet};
use crate::forge::batch::{Connectivity, Labels};
use crate::forge::error::Error;
use crate::forge::index::FlatIndex;
use crate::forge::predictor::{FeedForward, OutputStats, Predictor, build_networks};
use ndarray::{Array2, Array3, ArrayView3, s};
use rand::rngs::StdRng;
use std::collections::HashMap;

/// Routes bonds to the predictor of their ordered endpoint element pair.
///
/// The input row of a bond `(a, b)` is `[f(a), f(b), aux]`, where `f` is the
/// per-atom feature vector and `aux` the optional per-bond feature. The router
/// is not symmetric: `(a, b)` and `(b, a)` use different categories and a
/// different feature order.
#[derive(Debug, Clone)]
pub struct PairRouter<P = FeedForward> {
    elements: ElementSet,
    router: CategoryRouter<P>,
}

impl PairRouter<FeedForward> {
    /// Builds randomly initialized networks of `widths` for every ordered
    /// element pair. `stats` is keyed by concatenated symbols (`"CH"`).
    pub fn random(
        elements: ElementSet,
        widths: &[usize],
        stats: Option<&HashMap<String, OutputStats>>,
        rng: &mut StdRng,
    ) -> Result<Self, Error> {
        let names: Vec<String> = elements.pair_symbols().collect();
        let networks = build_networks(names, widths, stats, rng)?;
        Self::new(elements, networks)
    }
}

impl<P: Predictor> PairRouter<P> {
    /// Creates a router with one predictor per ordered pair, in pair-category
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if the predictor count is not
    /// the square of the element count or the predictors disagree on widths.
    pub fn new(elements: ElementSet, predictors: Vec<P>) -> Result<Self, Error> {
        if predictors.len() != elements.pair_count() {
            return Err(Error::InvalidArchitecture(format!(
                "{} pair predictors for {} element pairs",
                predictors.len(),
                elements.pair_count()
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

    /// Predicts `(N, B, out)` for every bond slot of `connectivity`.
    ///
    /// `atom_features` is `(N, A, D)` aligned with `labels`; `pair_features`,
    /// if given, is `(N, B, K)` aligned with `connectivity`. Padding bonds
    /// yield zero rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] for misaligned tensors or when `2D + K`
    /// differs from the predictor input width, [`Error::InvalidIndex`] for a
    /// bond whose endpoint is a padding atom of `labels`, and
    /// [`Error::UnknownCategory`] for elements outside the set.
    pub fn route(
        &self,
        labels: &Labels,
        connectivity: &Connectivity,
        atom_features: ArrayView3<'_, f64>,
        pair_features: Option<ArrayView3<'_, f64>>,
    ) -> Result<Array3<f64>, Error> {
        let (n, a, d) = atom_features.dim();
        let (bond_examples, b) = connectivity.shape();
        if (n, a) != labels.shape() {
            return Err(Error::shape(
                "pair router",
                format!(
                    "atom features are ({}, {}, _) but labels are {:?}",
                    n,
                    a,
                    labels.shape()
                ),
            ));
        }
        if bond_examples != n {
            return Err(Error::shape(
                "pair router",
                format!("{} examples in connectivity but {} in labels", bond_examples, n),
            ));
        }
        let k = match pair_features {
            Some(aux) if (aux.dim().0, aux.dim().1) != (n, b) => {
                return Err(Error::shape(
                    "pair router",
                    format!(
                        "pair features are {:?} but connectivity is ({}, {})",
                        aux.dim(),
                        n,
                        b
                    ),
                ));
            }
            Some(aux) => aux.dim().2,
            None => 0,
        };
        let width = 2 * d + k;
        if width != self.input_width() {
            return Err(Error::shape(
                "pair router",
                format!(
                    "bond input is 2 x {} + {} = {} wide but predictors expect {}",
                    d,
                    k,
                    width,
                    self.input_width()
                ),
            ));
        }

        let atoms = FlatIndex::new(n, a);
        let bonds = FlatIndex::new(n, b);
        let atom_rows = atom_features
            .to_shape((atoms.len(), d))
            .map_err(|e| Error::shape("pair router", e.to_string()))?;

        let mut categories = vec![None; bonds.len()];
        let mut x = Array2::zeros((bonds.len(), width));

        for example in 0..n {
            for (slot, i, j) in connectivity.bonds_of(example) {
                let (Some(zi), Some(zj)) = (labels.get(example, i), labels.get(example, j)) else {
                    let end = if labels.get(example, i).is_none() { i } else { j };
                    return Err(Error::invalid_index(example, slot, end as i64));
                };
                let (Some(gi), Some(gj), Some(g)) = (
                    atoms.global(example, Some(i)),
                    atoms.global(example, Some(j)),
                    bonds.global(example, Some(slot)),
                ) else {
                    return Err(Error::invalid_index(example, slot, i.max(j) as i64));
                };

                categories[g] = Some(self.elements.pair_category(zi, zj)?);

                let mut row = x.row_mut(g);
                row.slice_mut(s![..d]).assign(&atom_rows.row(gi));
                row.slice_mut(s![d..2 * d]).assign(&atom_rows.row(gj));
                if let Some(aux) = pair_features {
                    row.slice_mut(s![2 * d..]).assign(&aux.slice(s![example, slot, ..]));
                }
            }
        }

        let y = self.router.route(&categories, x.view())?;
        y.into_shape_with_order((n, b, self.output_width()))
            .map_err(|e| Error::shape("pair router", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::predictor::Linear;
    use ndarray::{Array, Array1, array};
    use rand::SeedableRng;

    fn labels(raw: Array2<i64>) -> Labels {
        Labels::from_sentinel(raw.view().into_dyn()).unwrap()
    }

    fn connectivity(raw: Array3<i64>, labels: &Labels) -> Connectivity {
        Connectivity::from_sentinel(raw.view().into_dyn(), labels).unwrap()
    }

    /// Sums the input row and adds the pair category, so both the routed
    /// category and the gathered features are visible in the output.
    fn summing(category: usize, width: usize) -> Linear {
        Linear::new(Array2::ones((width, 1)), array![category as f64]).unwrap()
    }

    fn hc_router(width: usize) -> PairRouter<Linear> {
        let elements = ElementSet::new(&[1, 6]).unwrap();
        let predictors = (0..4).map(|c| summing(c, width)).collect();
        PairRouter::new(elements, predictors).unwrap()
    }

    #[test]
    fn gathers_endpoint_features_and_routes_by_pair() {
        let router = hc_router(4);
        // example 0: C0-H1, H1-C0; example 1: C0-C1, padding
        let labels = labels(array![[6, 1], [6, 6]]);
        let conn = connectivity(array![[[0, 1], [1, 0]], [[0, 1], [-1, -1]]], &labels);
        let features = array![[[1.0, 2.0], [10.0, 20.0]], [[100.0, 200.0], [1000.0, 2000.0]]];

        let y = router.route(&labels, &conn, features.view(), None).unwrap();

        assert_eq!(y.dim(), (2, 2, 1));
        // CH = category 2, HC = category 1, CC = category 3
        assert_eq!(y[(0, 0, 0)], 33.0 + 2.0);
        assert_eq!(y[(0, 1, 0)], 33.0 + 1.0);
        assert_eq!(y[(1, 0, 0)], 3300.0 + 3.0);
        assert_eq!(y[(1, 1, 0)], 0.0);
    }

    #[test]
    fn appends_pair_features_after_both_endpoints() {
        let elements = ElementSet::new(&[1, 6]).unwrap();
        // Only the last input column (the aux feature) passes through.
        let pick_aux = || {
            let mut w = Array2::zeros((5, 1));
            w[(4, 0)] = 1.0;
            Linear::new(w, Array1::zeros(1)).unwrap()
        };
        let router = PairRouter::new(elements, (0..4).map(|_| pick_aux()).collect()).unwrap();

        let labels = labels(array![[6, 1, 1]]);
        let conn = connectivity(array![[[0, 1], [0, 2]]], &labels);
        let features = Array3::ones((1, 3, 2));
        let aux = array![[[0.25], [0.75]]];

        let y = router
            .route(&labels, &conn, features.view(), Some(aux.view()))
            .unwrap();
        assert_eq!(y, array![[[0.25], [0.75]]]);
    }

    #[test]
    fn forward_and_reversed_routing_swap_roles() {
        let router = PairRouter::random(
            ElementSet::new(&[1, 6, 8]).unwrap(),
            &[6, 4, 2],
            None,
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();
        let labels = labels(array![[8, 1, 6]]);
        let conn = connectivity(array![[[0, 1], [2, 0]]], &labels);
        let features = Array::from_shape_fn((1, 3, 3), |(_, j, k)| (j * 3 + k) as f64 * 0.1);

        let forward = router.route(&labels, &conn, features.view(), None).unwrap();
        let reversed = router
            .route(&labels, &conn.reversed(), features.view(), None)
            .unwrap();

        // Routing the swapped bond equals routing the swapped pair directly.
        let direct = connectivity(array![[[1, 0], [0, 2]]], &labels);
        let expected = router.route(&labels, &direct, features.view(), None).unwrap();
        assert_eq!(reversed, expected);
        assert_ne!(forward, reversed);
    }

    #[test]
    fn rejects_width_and_alignment_errors() {
        let router = hc_router(4);
        let labels = labels(array![[6, 1]]);
        let conn = connectivity(array![[[0, 1]]], &labels);

        let narrow = Array3::zeros((1, 2, 1));
        assert!(matches!(
            router.route(&labels, &conn, narrow.view(), None),
            Err(Error::Shape { .. })
        ));

        let features = Array3::zeros((1, 2, 2));
        let aux = Array3::zeros((1, 1, 1));
        assert!(matches!(
            router.route(&labels, &conn, features.view(), Some(aux.view())),
            Err(Error::Shape { .. })
        ));

        let misaligned = Array3::zeros((1, 2, 0));
        assert!(matches!(
            router.route(&labels, &conn, features.view(), Some(misaligned.view())),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn bond_to_atom_padded_in_other_labels_is_rejected() {
        let router = hc_router(4);
        let full = labels(array![[6, 1]]);
        let conn = connectivity(array![[[0, 1]]], &full);
        let partial = labels(array![[6, -1]]);
        assert!(matches!(
            router.route(&partial, &conn, Array3::zeros((1, 2, 2)).view(), None),
            Err(Error::InvalidIndex {
                example: 0,
                slot: 0,
                index: 1
            })
        ));
    }

    #[test]
    fn pair_count_must_match_elements() {
        let elements = ElementSet::new(&[1, 6]).unwrap();
        assert!(matches!(
            PairRouter::new(elements, vec![summing(0, 2); 3]),
            Err(Error::InvalidArchitecture(_))
        ));
    }
}
