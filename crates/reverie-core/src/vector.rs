// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector math and the validation gate for vectors bound into SQL.
//!
//! Every vector that reaches a query string, for reads and writes alike,
//! goes through [`to_safe_vector_literal`]. Storage functions accept only
//! [`VectorLiteral`], so an unvalidated `&[f32]` cannot reach the database.

use std::fmt::Write as _;

use thiserror::Error;

/// A vector that cannot be bound into a query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidVectorError {
    #[error("invalid vector: empty")]
    Empty,

    #[error("invalid vector: component {index} is not finite ({value})")]
    NonFinite { index: usize, value: f32 },

    #[error("invalid vector: expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Validated vector serialized as a JSON array, ready for `vec_f32(?)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLiteral {
    text: String,
    dimensions: usize,
}

impl VectorLiteral {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Fails unless the literal has exactly `expected` components.
    pub fn ensure_dimensions(&self, expected: usize) -> Result<(), InvalidVectorError> {
        if self.dimensions != expected {
            return Err(InvalidVectorError::DimensionMismatch {
                expected,
                actual: self.dimensions,
            });
        }
        Ok(())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when either vector is empty, the lengths differ, or either
/// norm is zero. The result is clamped to `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }

    let sim = dot / denom;
    if !sim.is_finite() {
        return 0.0;
    }
    sim.clamp(-1.0, 1.0) as f32
}

/// Cosine distance, `1 - cosine_similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Validate a vector and render it as a literal safe to bind into SQL.
///
/// Rejects empty vectors and any NaN or infinite component; values are never
/// coerced.
pub fn to_safe_vector_literal(vector: &[f32]) -> Result<VectorLiteral, InvalidVectorError> {
    if vector.is_empty() {
        return Err(InvalidVectorError::Empty);
    }

    let mut text = String::with_capacity(vector.len() * 12 + 2);
    text.push('[');
    for (index, value) in vector.iter().enumerate() {
        if !value.is_finite() {
            return Err(InvalidVectorError::NonFinite {
                index,
                value: *value,
            });
        }
        if index > 0 {
            text.push(',');
        }
        // f32 Display never uses exponent notation, so the output is valid JSON.
        let _ = write!(text, "{value}");
    }
    text.push(']');

    Ok(VectorLiteral {
        text,
        dimensions: vector.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_opposite() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_degenerate_inputs_are_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_distance_complements_similarity() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn literal_renders_json_array() {
        let lit = to_safe_vector_literal(&[0.5, -1.0, 0.0]).unwrap();
        assert_eq!(lit.as_str(), "[0.5,-1,0]");
        assert_eq!(lit.dimensions(), 3);
        let parsed: Vec<f32> = serde_json::from_str(lit.as_str()).unwrap();
        assert_eq!(parsed, vec![0.5, -1.0, 0.0]);
    }

    #[test]
    fn literal_rejects_nan_and_infinity() {
        let err = to_safe_vector_literal(&[0.1, f32::NAN]).unwrap_err();
        assert!(matches!(err, InvalidVectorError::NonFinite { index: 1, .. }));

        let err = to_safe_vector_literal(&[f32::INFINITY]).unwrap_err();
        assert!(matches!(err, InvalidVectorError::NonFinite { index: 0, .. }));

        let err = to_safe_vector_literal(&[1.0, f32::NEG_INFINITY]).unwrap_err();
        assert!(matches!(err, InvalidVectorError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn literal_rejects_empty() {
        assert_eq!(to_safe_vector_literal(&[]), Err(InvalidVectorError::Empty));
    }

    #[test]
    fn literal_tiny_values_stay_json() {
        let lit = to_safe_vector_literal(&[1e-30, 3.4e38]).unwrap();
        let parsed: Vec<f64> = serde_json::from_str(lit.as_str()).unwrap();
        assert!((parsed[0] / 1e-30 - 1.0).abs() < 1e-6);
        assert!((parsed[1] / 3.4e38 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ensure_dimensions_reports_mismatch() {
        let lit = to_safe_vector_literal(&[1.0, 2.0]).unwrap();
        assert!(lit.ensure_dimensions(2).is_ok());
        assert_eq!(
            lit.ensure_dimensions(384),
            Err(InvalidVectorError::DimensionMismatch {
                expected: 384,
                actual: 2
            })
        );
    }

    fn vector_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        (1usize..32).prop_flat_map(|n| {
            (
                prop::collection::vec(-100.0f32..100.0, n),
                prop::collection::vec(-100.0f32..100.0, n),
            )
        })
    }

    proptest! {
        #[test]
        fn cosine_is_symmetric_and_bounded((a, b) in vector_pair()) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((-1.0..=1.0).contains(&ab));
        }

        #[test]
        fn cosine_with_zero_vector_is_zero(a in prop::collection::vec(-100.0f32..100.0, 1..32)) {
            let zero = vec![0.0f32; a.len()];
            prop_assert_eq!(cosine_similarity(&a, &zero), 0.0);
        }

        #[test]
        fn finite_vectors_always_produce_literals(a in prop::collection::vec(-1e6f32..1e6, 1..64)) {
            let lit = to_safe_vector_literal(&a).unwrap();
            prop_assert_eq!(lit.dimensions(), a.len());
        }
    }
}
