// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local-time quiet window evaluation.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use courier_core::{QuietHours, UserPreferences};
use tracing::warn;

/// The subject's timezone, from their quiet-hours preference. UTC if unset
/// or unknown.
pub fn subject_timezone(preferences: &UserPreferences) -> Tz {
    match preferences
        .quiet_hours
        .as_ref()
        .and_then(|q| q.timezone.as_deref())
    {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = name, "unknown timezone, using UTC");
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}

fn to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Inside a DST gap: the wall clock skips forward, so does the window end.
        LocalResult::None => to_utc(tz, local + Duration::hours(1)),
    }
}

/// If `now` falls inside the quiet window, the instant it ends.
///
/// The window is `[start, end)` in the subject's local time and wraps
/// midnight when `start > end`. An empty window (`start == end`) never
/// matches.
pub fn quiet_window_end(quiet: &QuietHours, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&tz).naive_local();
    let time = local.time();
    let today = local.date();

    let end_date = if quiet.start < quiet.end {
        if time >= quiet.start && time < quiet.end {
            today
        } else {
            return None;
        }
    } else if quiet.start > quiet.end {
        if time >= quiet.start {
            today.succ_opt()?
        } else if time < quiet.end {
            today
        } else {
            return None;
        }
    } else {
        return None;
    };

    Some(to_utc(tz, end_date.and_time(quiet.end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn window(start: (u32, u32), end: (u32, u32), tz: Option<&str>) -> QuietHours {
        QuietHours {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            timezone: tz.map(str::to_string),
        }
    }

    #[test]
    fn overnight_window_ends_next_morning() {
        let q = window((22, 0), (7, 0), None);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        let end = quiet_window_end(&q, Tz::UTC, now).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn overnight_window_after_midnight_ends_same_day() {
        let q = window((22, 0), (7, 0), None);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 3, 30, 0).unwrap();
        let end = quiet_window_end(&q, Tz::UTC, now).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn end_is_exclusive() {
        let q = window((22, 0), (7, 0), None);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        assert!(quiet_window_end(&q, Tz::UTC, now).is_none());
    }

    #[test]
    fn daytime_window() {
        let q = window((12, 0), (14, 0), None);
        let inside = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        assert!(quiet_window_end(&q, Tz::UTC, inside).is_some());
        assert!(quiet_window_end(&q, Tz::UTC, outside).is_none());
    }

    #[test]
    fn evaluated_in_subject_timezone() {
        // 21:30 UTC is 23:30 in Johannesburg (UTC+2), inside 22:00-07:00.
        let q = window((22, 0), (7, 0), Some("Africa/Johannesburg"));
        let prefs = UserPreferences {
            disabled_channels: vec![],
            quiet_hours: Some(q.clone()),
        };
        let tz = subject_timezone(&prefs);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 21, 30, 0).unwrap();
        let end = quiet_window_end(&q, tz, now).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let prefs = UserPreferences {
            disabled_channels: vec![],
            quiet_hours: Some(window((1, 0), (2, 0), Some("Mars/Olympus"))),
        };
        assert_eq!(subject_timezone(&prefs), Tz::UTC);
    }
}
