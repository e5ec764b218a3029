//! Early-cancellation penalty policy. The 50% threshold and midpoint
//! valuation are pending product sign-off; swap the functions here if the
//! rule changes.

/// No penalty once the job is at least half done.
pub fn penalty_for(progress: u8, estimated_value: f64) -> Option<f64> {
    if progress >= 50 {
        return None;
    }
    Some(estimated_value)
}

/// Parses a free-form budget such as `"$40-$60"`, `"40 - 60"` or `"$50"` into
/// the midpoint of the range. Anything unparseable yields `None`; callers
/// treat that as a soft failure.
pub fn budget_midpoint(budget: &str) -> Option<f64> {
    let cleaned: String = budget
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();

    let mut parts = cleaned.split('-').filter(|part| !part.is_empty());
    let low: f64 = parts.next()?.parse().ok()?;
    let high: f64 = match parts.next() {
        Some(part) => part.parse().ok()?,
        None => low,
    };

    if parts.next().is_some() || low < 0.0 || high < low {
        return None;
    }

    Some((low + high) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::{budget_midpoint, penalty_for};

    #[test]
    fn dollar_range_midpoint() {
        assert_eq!(budget_midpoint("$40-$60"), Some(50.0));
        assert_eq!(budget_midpoint("40 - 60"), Some(50.0));
        assert_eq!(budget_midpoint("$1,000-$2,000"), Some(1500.0));
    }

    #[test]
    fn single_value_is_its_own_midpoint() {
        assert_eq!(budget_midpoint("$50"), Some(50.0));
        assert_eq!(budget_midpoint("75"), Some(75.0));
    }

    #[test]
    fn malformed_budgets_yield_none() {
        assert_eq!(budget_midpoint("cheap as possible"), None);
        assert_eq!(budget_midpoint(""), None);
        assert_eq!(budget_midpoint("60-40"), None);
        assert_eq!(budget_midpoint("10-20-30"), None);
    }

    #[test]
    fn penalty_only_below_half_progress() {
        assert_eq!(penalty_for(30, 50.0), Some(50.0));
        assert_eq!(penalty_for(49, 50.0), Some(50.0));
        assert_eq!(penalty_for(50, 50.0), None);
        assert_eq!(penalty_for(70, 50.0), None);
    }
}
