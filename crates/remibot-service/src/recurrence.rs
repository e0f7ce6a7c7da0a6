//! Recurrence pattern grammar and calendar arithmetic.
//!
//! Patterns are case-insensitive: the calendar keywords `daily`, `weekly`,
//! `monthly`, `yearly`/`annual`, or a fixed offset `<N><unit>` with unit in
//! s/m/h/d/w. Anything else yields no next occurrence.

use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static INTERVAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([smhdw])$").unwrap());

/// Compute the next execution time from the previous one.
///
/// Month and year steps clamp to the end of shorter months (Jan 31 + 1
/// month lands on the last day of February). Returns None for an
/// unrecognized pattern or an out-of-range result.
pub fn next_execution(pattern: &str, last: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let pattern = pattern.trim().to_ascii_lowercase();
    match pattern.as_str() {
        "daily" => last.checked_add_signed(Duration::days(1)),
        "weekly" => last.checked_add_signed(Duration::days(7)),
        "monthly" => last.checked_add_months(Months::new(1)),
        "yearly" | "annual" => last.checked_add_months(Months::new(12)),
        _ => {
            let caps = INTERVAL_RE.captures(&pattern)?;
            let amount: i64 = caps[1].parse().ok()?;
            let step = match &caps[2] {
                "s" => Duration::try_seconds(amount),
                "m" => Duration::try_minutes(amount),
                "h" => Duration::try_hours(amount),
                "d" => Duration::try_days(amount),
                "w" => Duration::try_days(amount.checked_mul(7)?),
                _ => None,
            }?;
            last.checked_add_signed(step)
        }
    }
}

/// Whether a pattern is part of the recognized grammar.
pub fn is_valid(pattern: &str) -> bool {
    next_execution(pattern, DateTime::<Utc>::UNIX_EPOCH).is_some()
}

/// Human-readable label for a pattern, used in notification messages.
pub fn describe(pattern: &str) -> String {
    match pattern.to_ascii_lowercase().as_str() {
        "daily" => "every day".to_string(),
        "weekly" => "every week".to_string(),
        "monthly" => "every month".to_string(),
        "yearly" | "annual" => "every year".to_string(),
        other => format!("every {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_daily_crosses_year_boundary_exactly() {
        let next = next_execution("daily", at(2024, 12, 31, 23, 0)).unwrap();
        assert_eq!(next, at(2025, 1, 1, 23, 0));
        assert_eq!(next - at(2024, 12, 31, 23, 0), Duration::hours(24));
    }

    #[test]
    fn test_weekly() {
        assert_eq!(
            next_execution("weekly", at(2024, 6, 1, 9, 0)).unwrap(),
            at(2024, 6, 8, 9, 0)
        );
    }

    #[test]
    fn test_monthly_clamps_to_leap_february() {
        assert_eq!(
            next_execution("monthly", at(2024, 1, 31, 10, 0)).unwrap(),
            at(2024, 2, 29, 10, 0)
        );
    }

    #[test]
    fn test_monthly_clamps_to_plain_february() {
        assert_eq!(
            next_execution("monthly", at(2025, 1, 31, 10, 0)).unwrap(),
            at(2025, 2, 28, 10, 0)
        );
    }

    #[test]
    fn test_monthly_keeps_day_when_possible() {
        assert_eq!(
            next_execution("monthly", at(2024, 4, 15, 8, 30)).unwrap(),
            at(2024, 5, 15, 8, 30)
        );
    }

    #[test]
    fn test_yearly_clamps_leap_day() {
        assert_eq!(
            next_execution("yearly", at(2024, 2, 29, 12, 0)).unwrap(),
            at(2025, 2, 28, 12, 0)
        );
        assert_eq!(
            next_execution("annual", at(2024, 3, 1, 12, 0)).unwrap(),
            at(2025, 3, 1, 12, 0)
        );
    }

    #[test]
    fn test_fixed_offsets() {
        let base = at(2024, 6, 1, 9, 0);
        assert_eq!(
            next_execution("10s", base).unwrap(),
            base + Duration::seconds(10)
        );
        assert_eq!(
            next_execution("5m", base).unwrap(),
            base + Duration::minutes(5)
        );
        assert_eq!(
            next_execution("2h", base).unwrap(),
            base + Duration::hours(2)
        );
        assert_eq!(next_execution("3d", base).unwrap(), base + Duration::days(3));
        assert_eq!(
            next_execution("2w", base).unwrap(),
            base + Duration::days(14)
        );
    }

    #[test]
    fn test_case_insensitive_and_trimmed() {
        let base = at(2024, 6, 1, 9, 0);
        assert_eq!(
            next_execution("DAILY", base),
            next_execution("daily", base)
        );
        assert_eq!(next_execution(" 10S ", base), next_execution("10s", base));
    }

    #[test]
    fn test_unrecognized_patterns() {
        let base = at(2024, 6, 1, 9, 0);
        for pattern in ["fortnightly", "", "10x", "s10", "-5m", "1.5h", "10"] {
            assert!(next_execution(pattern, base).is_none(), "{pattern:?}");
            assert!(!is_valid(pattern), "{pattern:?}");
        }
    }

    #[test]
    fn test_huge_amount_does_not_panic() {
        let base = at(2024, 6, 1, 9, 0);
        // Larger than i64 when parsed, or out of chrono's range when added
        assert!(next_execution("99999999999999999999s", base).is_none());
        assert!(next_execution("9223372036854775807w", base).is_none());
    }

    #[test]
    fn test_is_valid() {
        for pattern in ["daily", "weekly", "monthly", "yearly", "annual", "45s", "12h"] {
            assert!(is_valid(pattern), "{pattern:?}");
        }
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe("daily"), "every day");
        assert_eq!(describe("MONTHLY"), "every month");
        assert_eq!(describe("10s"), "every 10s");
    }
}
