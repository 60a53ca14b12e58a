//! Trading-calendar abstraction.
//!
//! Exchange hours and holiday schedules are an external concern; engines
//! consume them through the [`TradingCalendar`] trait and share one instance
//! process-wide (read-only after initialization).

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Calendar queries the engines need when walking corporate-action history.
pub trait TradingCalendar: Send + Sync {
    /// Returns true if the market is open on `date`.
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Returns the most recent trading day strictly before `date`.
    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date - Duration::days(1);
        while !self.is_trading_day(day) {
            day -= Duration::days(1);
        }
        day
    }
}

/// Weekday-based US equity calendar.
///
/// Treats every Monday through Friday as a trading day. Exchange holidays are
/// absorbed downstream: reference-price lookups only consider days that have a
/// close in the unadjusted daily series, so a holiday simply never matches.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsEquityCalendar;

impl TradingCalendar for UsEquityCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekends_are_not_trading_days() {
        let cal = UsEquityCalendar;
        assert!(cal.is_trading_day(date(2020, 8, 28))); // Friday
        assert!(!cal.is_trading_day(date(2020, 8, 29))); // Saturday
        assert!(!cal.is_trading_day(date(2020, 8, 30))); // Sunday
    }

    #[test]
    fn previous_trading_day_skips_weekend() {
        let cal = UsEquityCalendar;
        // Monday 2020-08-31 -> Friday 2020-08-28
        assert_eq!(cal.previous_trading_day(date(2020, 8, 31)), date(2020, 8, 28));
        // Wednesday -> Tuesday
        assert_eq!(cal.previous_trading_day(date(2020, 8, 26)), date(2020, 8, 25));
    }
}
