//! Lookback window computation

use crate::session::MarketSessionClock;
use chrono::{DateTime, Datelike, Days, TimeZone, Utc, Weekday};

/// Start of the history to fetch and its length in whole hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    /// Premarket start on the previous trading day
    pub start: DateTime<Utc>,
    /// Whole hours from `start` to the time the window was computed
    pub hours: u32,
}

/// Window reaching back to premarket start on the previous trading day
///
/// On Mondays the window goes back to Friday; otherwise `lookback_days`
/// calendar days back.
pub fn lookback_window(
    now: DateTime<Utc>,
    clock: &MarketSessionClock,
    lookback_days: u32,
) -> LookbackWindow {
    let tz = clock.timezone();
    let local = now.with_timezone(&tz);

    let days_back = if local.weekday() == Weekday::Mon {
        3
    } else {
        lookback_days
    };

    let date = local
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days_back)))
        .unwrap_or(local.date_naive());
    let anchor_local = date.and_time(clock.boundaries().premarket_start);

    let start = tz
        .from_local_datetime(&anchor_local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| anchor_local.and_utc());

    let hours = (now - start).num_hours().max(0);

    LookbackWindow {
        start,
        hours: u32::try_from(hours).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionBoundaries;

    fn clock() -> MarketSessionClock {
        MarketSessionClock::new(SessionBoundaries::default(), chrono_tz::America::New_York)
    }

    #[test]
    fn test_midweek_goes_back_lookback_days() {
        // Tuesday 09:30 ET
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap();
        let window = lookback_window(now, &clock(), 1);

        // Monday 04:00 ET
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap());
        assert_eq!(window.hours, 29);
    }

    #[test]
    fn test_monday_goes_back_to_friday() {
        // Monday 10:00 ET
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
        let window = lookback_window(now, &clock(), 1);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap());
        assert_eq!(window.hours, 78);
    }

    #[test]
    fn test_monday_ignores_lookback_days() {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
        assert_eq!(
            lookback_window(now, &clock(), 5),
            lookback_window(now, &clock(), 1)
        );
    }

    #[test]
    fn test_anchor_in_future_clamps_to_zero() {
        // Tuesday 03:00 ET, same-day anchor is an hour ahead
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 8, 0, 0).unwrap();
        let window = lookback_window(now, &clock(), 0);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap());
        assert_eq!(window.hours, 0);
    }

    #[test]
    fn test_anchor_uses_session_timezone_offset() {
        // Thursday after the March DST switch, ET is UTC-4
        let now = Utc.with_ymd_and_hms(2025, 3, 13, 13, 30, 0).unwrap();
        let window = lookback_window(now, &clock(), 1);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap());
        assert_eq!(window.hours, 29);
    }
}
