//! Stock reductions for [`Aggregator::categorical_aggregation`](super::Aggregator::categorical_aggregation).
//!
//! Numeric reductions skip values that are not numbers.

use crate::model::PropertyValue;

fn numbers(values: &[PropertyValue]) -> impl Iterator<Item = f64> + '_ {
    values.iter().filter_map(PropertyValue::as_float)
}

/// Arithmetic mean, or `Unknown` when there are no numbers.
pub fn mean(values: &[PropertyValue]) -> PropertyValue {
    let (sum, n) = numbers(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        PropertyValue::Unknown
    } else {
        PropertyValue::Float(sum / n as f64)
    }
}

pub fn sum(values: &[PropertyValue]) -> PropertyValue {
    PropertyValue::Float(numbers(values).sum())
}

/// Number of observed (non-`Unknown`) values.
pub fn count(values: &[PropertyValue]) -> PropertyValue {
    PropertyValue::Integer(values.iter().filter(|v| !v.is_unknown()).count() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_skips_non_numbers() {
        let values = [PropertyValue::Integer(2), PropertyValue::Unknown, PropertyValue::Float(4.0), "x".into()];
        assert_eq!(mean(&values), PropertyValue::Float(3.0));
        assert_eq!(mean(&[PropertyValue::Unknown]), PropertyValue::Unknown);
    }

    #[test]
    fn test_sum_and_count() {
        let values = [PropertyValue::Integer(2), PropertyValue::Unknown, PropertyValue::Integer(5)];
        assert_eq!(sum(&values), PropertyValue::Float(7.0));
        assert_eq!(count(&values), PropertyValue::Integer(2));
    }
}
