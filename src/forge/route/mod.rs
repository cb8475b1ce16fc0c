//! Categorical routing of padded slots to per-category predictors.
//!
//! A [`CategoryRouter`] owns one predictor per category. Routing groups the
//! slots of a flat collection by category, evaluates each category's
//! predictor once on all of its slots, and scatters the results back to the
//! original slot positions. Padding slots produce zero rows.
//!
//! Two specializations wrap the generic router:
//!
//! - [`ElementRouter`] — category is the atom's element
//! - [`PairRouter`] — category is the ordered element pair of a bond's
//!   endpoints; the input row is both endpoint features plus an optional
//!   per-bond geometric feature

mod element;
mod elements;
mod pair;

pub use element::ElementRouter;
pub use elements::ElementSet;
pub use pair::PairRouter;

use super::error::Error;
use super::predictor::Predictor;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Slots sharing one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGroup {
    pub category: usize,
    /// Slot positions in ascending order.
    pub slots: Vec<usize>,
}

/// Partition of a flat slot collection by category.
///
/// Groups are ordered by category and only non-empty categories appear.
/// Every non-padding slot belongs to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    groups: Vec<RouteGroup>,
    padding: Vec<usize>,
    slot_count: usize,
}

impl RoutePlan {
    /// Partitions `categories` (`None` = padding).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCategory`] for a category at or beyond
    /// `category_count`.
    pub fn new(categories: &[Option<usize>], category_count: usize) -> Result<Self, Error> {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); category_count];
        let mut padding = Vec::new();

        for (slot, category) in categories.iter().enumerate() {
            match *category {
                None => padding.push(slot),
                Some(c) if c < category_count => buckets[c].push(slot),
                Some(c) => return Err(Error::UnknownCategory { code: c as i64 }),
            }
        }

        let groups = buckets
            .into_iter()
            .enumerate()
            .filter(|(_, slots)| !slots.is_empty())
            .map(|(category, slots)| RouteGroup { category, slots })
            .collect();

        Ok(Self {
            groups,
            padding,
            slot_count: categories.len(),
        })
    }

    pub fn groups(&self) -> &[RouteGroup] {
        &self.groups
    }

    pub fn padding(&self) -> &[usize] {
        &self.padding
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
}

/// Fixed table of predictors indexed by dense category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRouter<P> {
    predictors: Vec<P>,
}

impl<P: Predictor> CategoryRouter<P> {
    /// Creates a router from one predictor per category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if no predictors are given or
    /// their input/output widths differ.
    pub fn new(predictors: Vec<P>) -> Result<Self, Error> {
        let Some(first) = predictors.first() else {
            return Err(Error::InvalidArchitecture(
                "a router needs at least one category".to_string(),
            ));
        };
        let (input, output) = (first.input_width(), first.output_width());
        if let Some(idx) = predictors
            .iter()
            .position(|p| p.input_width() != input || p.output_width() != output)
        {
            return Err(Error::InvalidArchitecture(format!(
                "predictor {} is {}->{}, expected {}->{}",
                idx,
                predictors[idx].input_width(),
                predictors[idx].output_width(),
                input,
                output
            )));
        }
        Ok(Self { predictors })
    }

    #[inline]
    pub fn category_count(&self) -> usize {
        self.predictors.len()
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.predictors[0].input_width()
    }

    #[inline]
    pub fn output_width(&self) -> usize {
        self.predictors[0].output_width()
    }

    pub fn predictors(&self) -> &[P] {
        &self.predictors
    }

    pub fn predictor(&self, category: usize) -> Option<&P> {
        self.predictors.get(category)
    }

    /// Routes each row of `features` to the predictor of its category.
    ///
    /// Row `k` of the result is the prediction for row `k` of the input;
    /// padding rows are zero. Categories are evaluated in parallel, each with
    /// a single predictor call over all of its rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if the number of categories and rows differ
    /// or the feature width is not the predictors' input width, and
    /// [`Error::UnknownCategory`] for out-of-range categories. Both are
    /// raised before any predictor runs.
    pub fn route(
        &self,
        categories: &[Option<usize>],
        features: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, Error> {
        if categories.len() != features.nrows() {
            return Err(Error::shape(
                "category router",
                format!(
                    "{} category codes for {} feature rows",
                    categories.len(),
                    features.nrows()
                ),
            ));
        }
        if features.ncols() != self.input_width() {
            return Err(Error::shape(
                "category router",
                format!(
                    "feature width {} does not match predictor input width {}",
                    features.ncols(),
                    self.input_width()
                ),
            ));
        }

        let plan = RoutePlan::new(categories, self.category_count())?;
        self.route_planned(&plan, features)
    }

    fn route_planned(
        &self,
        plan: &RoutePlan,
        features: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, Error> {
        let output_width = self.output_width();

        let predictions: Vec<Array2<f64>> = plan
            .groups()
            .par_iter()
            .map(|group| {
                let x = features.select(Axis(0), &group.slots);
                self.predictors[group.category].predict(x.view())
            })
            .collect();

        let mut y = Array2::zeros((plan.slot_count(), output_width));
        for (group, prediction) in plan.groups().iter().zip(predictions) {
            if prediction.dim() != (group.slots.len(), output_width) {
                return Err(Error::shape(
                    "category router",
                    format!(
                        "predictor for category {} returned {:?}, expected ({}, {})",
                        group.category,
                        prediction.dim(),
                        group.slots.len(),
                        output_width
                    ),
                ));
            }
            for (row, &slot) in prediction.axis_iter(Axis(0)).zip(&group.slots) {
                y.row_mut(slot).assign(&row);
            }
        }

        tracing::debug!(
            slots = plan.slot_count(),
            categories = plan.groups().len(),
            padding = plan.padding().len(),
            "routed slots to category predictors"
        );

        Ok(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::predictor::Linear;
    use ndarray::{Array1, array};
    use proptest::prelude::*;

    /// `y = x * scale + category`, so the category that produced a row is
    /// visible in the output.
    fn tagged(category: usize, scale: f64, width: usize) -> Linear {
        Linear::new(
            Array2::from_diag(&Array1::from_elem(width, scale)),
            Array1::from_elem(width, category as f64),
        )
        .unwrap()
    }

    fn make_router(categories: usize) -> CategoryRouter<Linear> {
        CategoryRouter::new(
            (0..categories)
                .map(|c| tagged(c, (c + 2) as f64, 2))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn plan_partitions_slots_by_category() {
        let plan = RoutePlan::new(&[Some(2), None, Some(0), Some(2), None], 3).unwrap();
        assert_eq!(
            plan.groups(),
            &[
                RouteGroup {
                    category: 0,
                    slots: vec![2]
                },
                RouteGroup {
                    category: 2,
                    slots: vec![0, 3]
                },
            ]
        );
        assert_eq!(plan.padding(), &[1, 4]);
        assert_eq!(plan.slot_count(), 5);
    }

    #[test]
    fn plan_rejects_unknown_category() {
        assert!(matches!(
            RoutePlan::new(&[Some(0), Some(3)], 3),
            Err(Error::UnknownCategory { code: 3 })
        ));
    }

    #[test]
    fn route_matches_per_slot_prediction() {
        let router = make_router(3);
        let features = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]];
        let categories = [Some(1), None, Some(0), Some(1)];

        let y = router.route(&categories, features.view()).unwrap();

        assert_eq!(y.row(0), array![4.0, 7.0]);
        assert_eq!(y.row(1), array![0.0, 0.0]);
        assert_eq!(y.row(2), array![10.0, 12.0]);
        assert_eq!(y.row(3), array![22.0, 25.0]);
    }

    #[test]
    fn route_rejects_shape_mismatches_before_predicting() {
        let router = make_router(2);
        let features = Array2::zeros((3, 2));
        assert!(matches!(
            router.route(&[Some(0), Some(1)], features.view()),
            Err(Error::Shape { .. })
        ));
        let wide = Array2::zeros((2, 3));
        assert!(matches!(
            router.route(&[Some(0), Some(1)], wide.view()),
            Err(Error::Shape { .. })
        ));
        assert!(matches!(
            router.route(&[Some(0), Some(5)], Array2::zeros((2, 2)).view()),
            Err(Error::UnknownCategory { code: 5 })
        ));
    }

    #[test]
    fn router_requires_uniform_widths() {
        let result = CategoryRouter::new(vec![tagged(0, 1.0, 2), tagged(1, 1.0, 3)]);
        assert!(matches!(result, Err(Error::InvalidArchitecture(_))));
        assert!(CategoryRouter::<Linear>::new(Vec::new()).is_err());
    }

    #[test]
    fn all_padding_yields_zeros() {
        let router = make_router(2);
        let y = router
            .route(&[None, None], array![[1.0, 1.0], [2.0, 2.0]].view())
            .unwrap();
        assert_eq!(y, Array2::<f64>::zeros((2, 2)));
    }

    proptest! {
        #[test]
        fn plan_is_disjoint_and_complete(
            categories in prop::collection::vec(prop::option::of(0usize..4), 0..40)
        ) {
            let plan = RoutePlan::new(&categories, 4).unwrap();
            let mut seen = vec![0usize; categories.len()];
            for group in plan.groups() {
                for &slot in &group.slots {
                    prop_assert_eq!(categories[slot], Some(group.category));
                    seen[slot] += 1;
                }
            }
            for &slot in plan.padding() {
                prop_assert_eq!(categories[slot], None);
                seen[slot] += 1;
            }
            prop_assert!(seen.iter().all(|&n| n == 1));
        }

        #[test]
        fn batched_routing_equals_single_slot_routing(
            rows in prop::collection::vec(
                (prop::option::of(0usize..3), -5.0f64..5.0, -5.0f64..5.0),
                1..25,
            )
        ) {
            let router = make_router(3);
            let categories: Vec<Option<usize>> = rows.iter().map(|r| r.0).collect();
            let features = Array2::from_shape_fn((rows.len(), 2), |(i, j)| {
                if j == 0 { rows[i].1 } else { rows[i].2 }
            });

            let batched = router.route(&categories, features.view()).unwrap();
            for (k, category) in categories.iter().enumerate() {
                let single = router
                    .route(&[*category], features.slice(ndarray::s![k..k + 1, ..]))
                    .unwrap();
                prop_assert_eq!(batched.row(k), single.row(0));
            }
        }
    }
}
