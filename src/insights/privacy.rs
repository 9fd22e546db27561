//! k-anonymity disclosure guard.
//!
//! Every population-level rule passes its distinct-patient cohort size through
//! this guard before computing anything derived from more than one patient.
//! Single-patient rules never call it.

use super::types::DisclosureError;

/// Minimum distinct patients behind any aggregate statistic.
pub const K_ANONYMITY_FLOOR: usize = 5;

/// Fails when `cohort_size` is below the fixed floor.
pub fn require_k_anonymity(cohort_size: usize, rule_name: &str) -> Result<(), DisclosureError> {
    require_k_anonymity_with_floor(cohort_size, rule_name, K_ANONYMITY_FLOOR)
}

/// Same as [`require_k_anonymity`] with a configured floor. A configured floor
/// can only raise the bar, never lower it below [`K_ANONYMITY_FLOOR`].
pub fn require_k_anonymity_with_floor(
    cohort_size: usize,
    rule_name: &str,
    floor: usize,
) -> Result<(), DisclosureError> {
    let floor = floor.max(K_ANONYMITY_FLOOR);
    if cohort_size < floor {
        tracing::debug!(
            rule = rule_name,
            cohort_size,
            floor,
            "Cohort below k-anonymity floor, suppressing"
        );
        return Err(DisclosureError {
            rule: rule_name.to_string(),
            cohort_size,
            floor,
        });
    }
    Ok(())
}

/// Non-failing form for filtering subgroups.
pub fn meets_k_anonymity(cohort_size: usize, floor: usize) -> bool {
    cohort_size >= floor.max(K_ANONYMITY_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_is_rejected_five_passes() {
        let err = require_k_anonymity(4, "integration-dropout-correlation").unwrap_err();
        assert_eq!(err.cohort_size, 4);
        assert_eq!(err.floor, 5);
        assert_eq!(err.rule, "integration-dropout-correlation");
        assert!(require_k_anonymity(5, "integration-dropout-correlation").is_ok());
    }

    #[test]
    fn configured_floor_cannot_go_below_five() {
        assert!(require_k_anonymity_with_floor(3, "r", 2).is_err());
        assert!(require_k_anonymity_with_floor(7, "r", 8).is_err());
        assert!(require_k_anonymity_with_floor(8, "r", 8).is_ok());
    }

    #[test]
    fn subgroup_filter_matches_guard() {
        assert!(!meets_k_anonymity(4, 5));
        assert!(meets_k_anonymity(5, 5));
        assert!(!meets_k_anonymity(4, 0));
    }
}
