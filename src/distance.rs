//! Distance metrics for vector similarity calculation.
//!
//! Every metric is reported as a distance where lower means more similar,
//! so ranking is always ascending regardless of the metric convention.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegcoreError};
use crate::util::simd::{dot_product_simd, l2_squared_simd};

/// Metric declared by a vector field and by the index attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MetricType {
    /// Squared Euclidean distance.
    #[default]
    #[serde(rename = "L2")]
    L2,
    /// Inner product, reported as its negation.
    #[serde(rename = "IP")]
    IP,
}

impl MetricType {
    /// Calculate the distance between two vectors using this metric.
    ///
    /// Callers guarantee equal lengths; use [`MetricType::checked_distance`]
    /// when the inputs are not already validated.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricType::L2 => l2_squared_simd(a, b),
            MetricType::IP => -dot_product_simd(a, b),
        }
    }

    /// Calculate the distance after checking that the dimensions agree.
    pub fn checked_distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(SegcoreError::invalid_argument(format!(
                "Vector dimensions must match for distance calculation: {} != {}",
                a.len(),
                b.len()
            )));
        }
        Ok(self.distance(a, b))
    }

    /// Get the name of this metric.
    pub fn name(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::IP => "IP",
        }
    }

    /// Parse a metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "L2" | "EUCLIDEAN" => Ok(MetricType::L2),
            "IP" | "INNER_PRODUCT" | "DOT_PRODUCT" => Ok(MetricType::IP),
            _ => Err(SegcoreError::parse(format!("Unknown metric type: {s}"))),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_is_squared() {
        let d = MetricType::L2.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert_eq!(d, 25.0);
    }

    #[test]
    fn test_ip_lower_is_more_similar() {
        let q = [1.0, 0.0];
        let near = MetricType::IP.distance(&q, &[2.0, 0.0]);
        let far = MetricType::IP.distance(&q, &[0.5, 0.0]);
        assert!(near < far);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(MetricType::parse_str("l2").unwrap(), MetricType::L2);
        assert_eq!(MetricType::parse_str("IP").unwrap(), MetricType::IP);
        assert!(MetricType::parse_str("HAMMING").is_err());
        assert_eq!(MetricType::IP.to_string(), "IP");
    }

    #[test]
    fn test_checked_distance_rejects_dimension_mismatch() {
        assert!(MetricType::L2.checked_distance(&[1.0], &[1.0, 2.0]).is_err());
    }
}
