//! Category-specific feed-forward regressors.
//!
//! Every atom element and every ordered element pair gets its own
//! [`FeedForward`] network. All networks of one router share the same layer
//! widths, so they are interchangeable behind the [`Predictor`] trait.

use super::error::Error;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pure function from a batch of feature rows to a batch of output rows.
///
/// Implementations must not depend on the number or order of rows: each
/// output row is a function of the matching input row only.
pub trait Predictor: Send + Sync {
    /// Width of each input row.
    fn input_width(&self) -> usize;

    /// Width of each output row.
    fn output_width(&self) -> usize;

    /// Evaluates the predictor on `(rows, input_width)` features.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Array2<f64>;
}

/// Fully connected layer `y = x W + b`.
///
/// Deserialization goes through [`Linear::new`], so a stored layer whose bias
/// does not match its weight is rejected on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LinearRecord")]
pub struct Linear {
    /// `(input, output)` weight matrix.
    weight: Array2<f64>,
    /// `(output,)` bias.
    bias: Array1<f64>,
}

#[derive(Deserialize)]
struct LinearRecord {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl TryFrom<LinearRecord> for Linear {
    type Error = Error;

    fn try_from(record: LinearRecord) -> Result<Self, Error> {
        Self::new(record.weight, record.bias)
    }
}

impl Linear {
    /// Creates a layer, checking that `bias` matches the weight's output width.
    pub fn new(weight: Array2<f64>, bias: Array1<f64>) -> Result<Self, Error> {
        if weight.ncols() != bias.len() {
            return Err(Error::shape(
                "linear layer",
                format!(
                    "weight has {} outputs but bias has {}",
                    weight.ncols(),
                    bias.len()
                ),
            ));
        }
        Ok(Self { weight, bias })
    }

    /// Uniform initialization in `±1/sqrt(fan_in)`.
    pub fn random(input: usize, output: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (input.max(1) as f64).sqrt();
        let weight = Array2::from_shape_fn((input, output), |_| rng.gen_range(-bound..=bound));
        let bias = Array1::from_shape_fn(output, |_| rng.gen_range(-bound..=bound));
        Self { weight, bias }
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub fn forward(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        x.dot(&self.weight) + &self.bias
    }
}

impl Predictor for Linear {
    fn input_width(&self) -> usize {
        self.weight.nrows()
    }

    fn output_width(&self) -> usize {
        self.weight.ncols()
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Array2<f64> {
        self.forward(features)
    }
}

/// Fixed affine de-normalization applied to network outputs: `y * std + mean`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// CELU with `alpha = 1`: `max(0, x) + min(0, exp(x) - 1)`.
#[inline]
pub fn celu(x: f64) -> f64 {
    if x > 0.0 { x } else { x.exp_m1() }
}

/// Multilayer perceptron with CELU activations between layers.
///
/// Stored networks are rebuilt through [`FeedForward::from_layers`] and
/// [`FeedForward::with_stats`] when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeedForwardRecord")]
pub struct FeedForward {
    layers: Vec<Linear>,
    stats: Option<OutputStats>,
    untrained: bool,
}

#[derive(Deserialize)]
struct FeedForwardRecord {
    layers: Vec<Linear>,
    #[serde(default)]
    stats: Option<OutputStats>,
    #[serde(default)]
    untrained: bool,
}

impl TryFrom<FeedForwardRecord> for FeedForward {
    type Error = Error;

    fn try_from(record: FeedForwardRecord) -> Result<Self, Error> {
        let mut net = Self::from_layers(record.layers)?;
        if let Some(stats) = record.stats {
            net = net.with_stats(stats)?;
        }
        if record.untrained {
            net = net.mark_untrained();
        }
        Ok(net)
    }
}

impl FeedForward {
    /// Builds a randomly initialized network for widths `[w0, w1, ..., wk]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if fewer than two widths are
    /// given or any width is zero.
    pub fn random(widths: &[usize], rng: &mut StdRng) -> Result<Self, Error> {
        validate_widths(widths)?;
        let layers = widths
            .windows(2)
            .map(|w| Linear::random(w[0], w[1], rng))
            .collect();
        Ok(Self {
            layers,
            stats: None,
            untrained: false,
        })
    }

    /// Builds a network from explicit layers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] for an empty layer list or
    /// consecutive layers whose widths do not chain.
    pub fn from_layers(layers: Vec<Linear>) -> Result<Self, Error> {
        if layers.is_empty() {
            return Err(Error::InvalidArchitecture(
                "a network needs at least one layer".to_string(),
            ));
        }
        for (idx, pair) in layers.windows(2).enumerate() {
            if pair[0].output_width() != pair[1].input_width() {
                return Err(Error::InvalidArchitecture(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    idx,
                    pair[0].output_width(),
                    idx + 1,
                    pair[1].input_width()
                )));
            }
        }
        Ok(Self {
            layers,
            stats: None,
            untrained: false,
        })
    }

    /// Attaches an output de-normalization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if `mean` or `std` differ from the output width.
    pub fn with_stats(mut self, stats: OutputStats) -> Result<Self, Error> {
        let width = self.output_width();
        if stats.mean.len() != width || stats.std.len() != width {
            return Err(Error::shape(
                "output statistics",
                format!(
                    "expected {} values, got mean {} / std {}",
                    width,
                    stats.mean.len(),
                    stats.std.len()
                ),
            ));
        }
        self.stats = Some(stats);
        Ok(self)
    }

    /// Marks the network as lacking training statistics.
    pub fn mark_untrained(mut self) -> Self {
        self.untrained = true;
        self
    }

    #[inline]
    pub fn is_untrained(&self) -> bool {
        self.untrained
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    pub fn stats(&self) -> Option<&OutputStats> {
        self.stats.as_ref()
    }

    /// Layer widths `[w0, ..., wk]`.
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.layers.len() + 1);
        widths.push(self.input_width());
        widths.extend(self.layers.iter().map(Linear::output_width));
        widths
    }
}

impl Predictor for FeedForward {
    fn input_width(&self) -> usize {
        self.layers.first().map_or(0, Linear::input_width)
    }

    fn output_width(&self) -> usize {
        self.layers.last().map_or(0, Linear::output_width)
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Array2<f64> {
        if self.untrained {
            tracing::warn!(
                rows = features.nrows(),
                "possibly untrained network used for prediction; results may be inconsistent"
            );
        }

        let Some((first, rest)) = self.layers.split_first() else {
            return Array2::zeros((features.nrows(), 0));
        };
        let mut x = first.forward(features);
        for layer in rest {
            x.mapv_inplace(celu);
            x = layer.forward(x.view());
        }

        if let Some(stats) = &self.stats {
            let std = ndarray::aview1(&stats.std);
            let mean = ndarray::aview1(&stats.mean);
            for mut row in x.axis_iter_mut(Axis(0)) {
                row *= &std;
                row += &mean;
            }
        }
        x
    }
}

/// Builds one network per named category.
///
/// With `stats == None` every network is plain. Otherwise a category found
/// in `stats` gets that output de-normalization and a missing one is marked
/// untrained.
pub fn build_networks<'a>(
    names: impl IntoIterator<Item = String>,
    widths: &[usize],
    stats: Option<&'a HashMap<String, OutputStats>>,
    rng: &mut StdRng,
) -> Result<Vec<FeedForward>, Error> {
    names
        .into_iter()
        .map(|name| {
            let net = FeedForward::random(widths, rng)?;
            match stats {
                None => Ok(net),
                Some(table) => match table.get(&name) {
                    Some(s) => net.with_stats(s.clone()),
                    None => Ok(net.mark_untrained()),
                },
            }
        })
        .collect()
}

pub(crate) fn validate_widths(widths: &[usize]) -> Result<(), Error> {
    if widths.len() < 2 {
        return Err(Error::InvalidArchitecture(format!(
            "expected at least input and output widths, got {:?}",
            widths
        )));
    }
    if widths.contains(&0) {
        return Err(Error::InvalidArchitecture(format!(
            "layer widths must be positive, got {:?}",
            widths
        )));
    }
    Ok(())
}
