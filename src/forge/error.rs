//! Error types for density coefficient prediction.
//!
//! This module defines the error type used throughout the forge module.
//! Errors are categorized by source: tensor shape validation, category
//! lookup during routing, constrained normalization, and configuration.

use thiserror::Error;

/// Errors that can occur while routing, predicting, or normalizing.
///
/// Every variant is raised before any partial result is produced; the
/// pipeline never returns a half-filled tensor.
#[derive(Debug, Error)]
pub enum Error {
    /// A tensor has the wrong rank, width, or batch dimension.
    #[error("shape mismatch in {context}: {detail}")]
    Shape {
        /// Where the mismatch was detected.
        context: &'static str,
        /// Description of the expected and actual shapes.
        detail: String,
    },

    /// A category code is not a member of the configured element set.
    ///
    /// Raised before any predictor is invoked.
    #[error("unknown category code {code}: not in the configured element set")]
    UnknownCategory {
        /// The offending atomic number (or −1-style sentinel misuse).
        code: i64,
    },

    /// The charge constraint of an example cannot be satisfied.
    ///
    /// Occurs when an integral vector has zero self-dot-product, or when the
    /// constraint rows are linearly dependent, so the KKT system is singular.
    #[error("degenerate charge constraint for example {example}: {detail}")]
    DegenerateConstraint {
        /// Batch index of the failing example.
        example: usize,
        /// Description of the problem.
        detail: String,
    },

    /// An index does not address a valid slot (a bond endpoint outside the
    /// atoms of its example, or a segment id outside the segment table).
    #[error("invalid index {index} at slot {slot} of example {example}")]
    InvalidIndex {
        /// Batch index of the example.
        example: usize,
        /// Slot holding the index.
        slot: usize,
        /// The offending index.
        index: i64,
    },

    /// Layer widths or element lists do not describe a usable model.
    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    /// Failed to parse a model configuration TOML.
    #[error("failed to parse model configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A weight set does not fit the model it is loaded into.
    #[error("incompatible weights: {0}")]
    Weights(String),
}

impl Error {
    /// Creates a [`Shape`](Error::Shape) error.
    ///
    /// # Arguments
    ///
    /// * `context` — Component or operation that detected the mismatch
    /// * `detail` — Description of the expected and actual shapes
    pub fn shape(context: &'static str, detail: impl Into<String>) -> Self {
        Self::Shape {
            context,
            detail: detail.into(),
        }
    }

    /// Creates a [`DegenerateConstraint`](Error::DegenerateConstraint) error.
    pub fn degenerate(example: usize, detail: impl Into<String>) -> Self {
        Self::DegenerateConstraint {
            example,
            detail: detail.into(),
        }
    }

    /// Creates an [`InvalidIndex`](Error::InvalidIndex) error.
    pub fn invalid_index(example: usize, slot: usize, index: i64) -> Self {
        Self::InvalidIndex {
            example,
            slot,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = Error::shape("element router", "expected width 4, got 3");
        assert_eq!(
            err.to_string(),
            "shape mismatch in element router: expected width 4, got 3"
        );

        let err = Error::degenerate(2, "integral vector is zero");
        assert_eq!(
            err.to_string(),
            "degenerate charge constraint for example 2: integral vector is zero"
        );

        let err = Error::invalid_index(0, 3, -2);
        assert!(matches!(
            err,
            Error::InvalidIndex {
                example: 0,
                slot: 3,
                index: -2
            }
        ));
    }

    #[test]
    fn config_parse_error_converts() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: Error = toml_err.into();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
