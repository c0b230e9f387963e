//! Money arithmetic.
//!
//! Amounts are integers in the smallest currency unit. Every multiplication and
//! summation is overflow-checked and reported as a validation error.

use crate::error::{DomainError, DomainResult};

/// `quantity * unit_price`, rejecting overflow.
pub fn line_total(quantity: u64, unit_price: u64) -> DomainResult<u64> {
    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::validation("line total overflow"))
}

/// Sum of amounts, rejecting overflow.
pub fn sum_amounts<I>(amounts: I) -> DomainResult<u64>
where
    I: IntoIterator<Item = u64>,
{
    amounts.into_iter().try_fold(0u64, |acc, a| {
        acc.checked_add(a)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn overflow_is_a_validation_error() {
        assert!(matches!(line_total(u64::MAX, 2), Err(DomainError::Validation(_))));
        assert!(matches!(sum_amounts([u64::MAX, 1]), Err(DomainError::Validation(_))));
    }

    #[test]
    fn empty_sum_is_zero() {
        assert_eq!(sum_amounts(Vec::new()).unwrap(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn small_amounts_sum_exactly(values in proptest::collection::vec(0u64..1_000_000, 0..50)) {
            let expected: u64 = values.iter().sum();
            prop_assert_eq!(sum_amounts(values).unwrap(), expected);
        }
    }
}
