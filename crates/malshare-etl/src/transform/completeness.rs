//! Data completeness scoring
//!
//! The score is the weighted share of tracked fields a record carries,
//! rounded to two decimals. Adding a field never lowers it.

use crate::error::{PipelineError, Result};
use crate::models::RawSampleRecord;

/// Fields tracked by the default weights
pub const TRACKED_FIELDS: [&str; 5] = ["SHA256", "MD5", "SHA1", "F_TYPE", "ADDED"];

/// Per-field weights for the completeness score
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessWeights {
    weights: Vec<(String, f64)>,
    total: f64,
}

impl Default for CompletenessWeights {
    /// Equal weight on every [`TRACKED_FIELDS`] entry
    fn default() -> Self {
        Self {
            weights: TRACKED_FIELDS
                .iter()
                .map(|field| (field.to_string(), 1.0))
                .collect(),
            total: TRACKED_FIELDS.len() as f64,
        }
    }
}

impl CompletenessWeights {
    /// Weights must be finite and non-negative with a positive, finite sum
    pub fn new<I, K>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let weights: Vec<(String, f64)> = weights
            .into_iter()
            .map(|(field, weight)| (field.into(), weight))
            .collect();

        if let Some((field, weight)) = weights
            .iter()
            .find(|(_, w)| !w.is_finite() || *w < 0.0)
        {
            return Err(PipelineError::invalid_config(format!(
                "Completeness weight for '{}' must be a non-negative number, got {}",
                field, weight
            )));
        }

        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(PipelineError::invalid_config(
                "Completeness weights must sum to more than 0",
            ));
        }
        if !total.is_finite() {
            return Err(PipelineError::invalid_config(
                "Completeness weights must sum to a finite number",
            ));
        }

        Ok(Self { weights, total })
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.weights.iter().map(|(field, _)| field.as_str())
    }

    /// Score `record`, in `[0, 1]`
    pub fn score(&self, record: &RawSampleRecord) -> f64 {
        let present: f64 = self
            .weights
            .iter()
            .filter(|(field, _)| record.has_value(field))
            .map(|(_, weight)| weight)
            .sum();

        let ratio = (present / self.total).clamp(0.0, 1.0);
        (ratio * 100.0).round() / 100.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value};

    fn record(value: Value) -> RawSampleRecord {
        RawSampleRecord::from_value(value).unwrap()
    }

    fn record_with(fields: &[bool]) -> RawSampleRecord {
        let mut map = Map::new();
        for (field, present) in TRACKED_FIELDS.iter().zip(fields) {
            if *present {
                map.insert(field.to_string(), Value::String("x".to_string()));
            }
        }
        RawSampleRecord::new(map)
    }

    #[test]
    fn test_full_record_scores_one() {
        let raw = record(json!({
            "SHA256": "a", "MD5": "b", "SHA1": "c", "F_TYPE": "d", "ADDED": "e"
        }));
        assert_eq!(CompletenessWeights::default().score(&raw), 1.0);
    }

    #[test]
    fn test_empty_record_scores_zero() {
        assert_eq!(CompletenessWeights::default().score(&RawSampleRecord::default()), 0.0);
    }

    #[test]
    fn test_four_of_five() {
        let raw = record(json!({"SHA256": "a", "MD5": "b", "F_TYPE": "d", "ADDED": "e"}));
        assert_eq!(CompletenessWeights::default().score(&raw), 0.8);
    }

    #[test]
    fn test_blank_fields_do_not_count() {
        let raw = record(json!({"SHA256": "a", "MD5": "", "SHA1": "  "}));
        assert_eq!(CompletenessWeights::default().score(&raw), 0.2);
    }

    #[test]
    fn test_untracked_fields_do_not_count() {
        let raw = record(json!({"SHA256": "a", "SSDEEP": "3:abc", "SOURCES": ["x"]}));
        assert_eq!(CompletenessWeights::default().score(&raw), 0.2);
    }

    #[test]
    fn test_custom_weights_round_to_two_decimals() {
        let weights = CompletenessWeights::new([("SHA256", 2.0), ("MD5", 1.0)]).unwrap();
        let raw = record(json!({"SHA256": "a"}));
        assert_eq!(weights.score(&raw), 0.67);
    }

    #[test]
    fn test_invalid_weights_are_rejected() {
        assert!(CompletenessWeights::new([("SHA256", -1.0)]).is_err());
        assert!(CompletenessWeights::new([("SHA256", f64::NAN)]).is_err());
        assert!(CompletenessWeights::new([("SHA256", 0.0)]).is_err());
        assert!(CompletenessWeights::new(Vec::<(String, f64)>::new()).is_err());
    }

    #[test]
    fn test_overflowing_weight_sum_is_rejected() {
        let err = CompletenessWeights::new([("SHA256", f64::MAX), ("MD5", f64::MAX)]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));

        let weights = CompletenessWeights::new([("SHA256", f64::MAX), ("MD5", 1.0)]).unwrap();
        let score = weights.score(&record(json!({"SHA256": "a", "MD5": "b"})));
        assert_eq!(score, 1.0);
    }

    proptest! {
        #[test]
        fn prop_score_is_within_unit_interval(fields in prop::array::uniform5(any::<bool>())) {
            let score = CompletenessWeights::default().score(&record_with(&fields));
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_adding_a_field_never_lowers_score(
            fields in prop::array::uniform5(any::<bool>()),
            extra in 0usize..5,
            weights in prop::array::uniform5(0.0f64..10.0),
        ) {
            prop_assume!(weights.iter().sum::<f64>() > 0.0);
            let weights = CompletenessWeights::new(
                TRACKED_FIELDS.iter().copied().zip(weights)
            ).unwrap();

            let mut more = fields;
            more[extra] = true;

            prop_assert!(
                weights.score(&record_with(&more)) >= weights.score(&record_with(&fields))
            );
        }
    }
}
