use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use faultline_core::QuietHours;

/// Whether quiet hours are active for the recipient at `now`.
///
/// `start`/`end` are `HH:MM` in the recipient's timezone; an unknown
/// timezone falls back to UTC. Equal start and end disable the window;
/// `start > end` spans midnight.
#[must_use]
pub fn quiet_hours_active(quiet_hours: &QuietHours, now: DateTime<Utc>) -> bool {
    if !quiet_hours.enabled {
        return false;
    }

    let (Some(start), Some(end)) = (
        parse_minutes(&quiet_hours.start),
        parse_minutes(&quiet_hours.end),
    ) else {
        debug!(
            start = %quiet_hours.start,
            end = %quiet_hours.end,
            "unparsable quiet hours, treating as inactive"
        );
        return false;
    };

    if start == end {
        return false;
    }

    let current = minutes_of_day_in(&quiet_hours.timezone, now);

    if start < end {
        current >= start && current < end
    } else {
        current >= start || current < end
    }
}

/// Parse `HH:MM` into minutes-of-day.
fn parse_minutes(value: &str) -> Option<u32> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// `now` as minutes-of-day in the given timezone, UTC when unparsable.
fn minutes_of_day_in(timezone: &str, now: DateTime<Utc>) -> u32 {
    match timezone.parse::<Tz>() {
        Ok(tz) => {
            let local = now.with_timezone(&tz);
            local.hour() * 60 + local.minute()
        }
        Err(_) => now.hour() * 60 + now.minute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quiet(start: &str, end: &str, timezone: &str) -> QuietHours {
        QuietHours {
            enabled: true,
            start: start.to_owned(),
            end: end.to_owned(),
            timezone: timezone.to_owned(),
        }
    }

    fn at_utc(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn simple_window() {
        let qh = quiet("09:00", "17:00", "UTC");
        assert!(quiet_hours_active(&qh, at_utc(12, 0)));
        assert!(quiet_hours_active(&qh, at_utc(9, 0)));
        assert!(!quiet_hours_active(&qh, at_utc(17, 0)), "end is exclusive");
        assert!(!quiet_hours_active(&qh, at_utc(8, 59)));
    }

    #[test]
    fn midnight_spanning_window() {
        let qh = quiet("22:00", "07:00", "UTC");
        assert!(quiet_hours_active(&qh, at_utc(23, 30)));
        assert!(quiet_hours_active(&qh, at_utc(3, 0)));
        assert!(!quiet_hours_active(&qh, at_utc(8, 0)));
        assert!(!quiet_hours_active(&qh, at_utc(21, 59)));
    }

    #[test]
    fn equal_start_and_end_is_inactive() {
        let qh = quiet("08:00", "08:00", "UTC");
        assert!(!quiet_hours_active(&qh, at_utc(8, 0)));
    }

    #[test]
    fn disabled_is_inactive() {
        let mut qh = quiet("00:00", "23:59", "UTC");
        qh.enabled = false;
        assert!(!quiet_hours_active(&qh, at_utc(12, 0)));
    }

    #[test]
    fn timezone_conversion_applies() {
        // 12:00 UTC is 14:00 in Berlin during DST.
        let qh = quiet("13:30", "15:00", "Europe/Berlin");
        assert!(quiet_hours_active(&qh, at_utc(12, 0)));
        let utc = quiet("13:30", "15:00", "UTC");
        assert!(!quiet_hours_active(&utc, at_utc(12, 0)));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let qh = quiet("11:00", "13:00", "Not/AZone");
        assert!(quiet_hours_active(&qh, at_utc(12, 0)));
    }

    #[test]
    fn unparsable_times_are_inactive() {
        assert!(!quiet_hours_active(&quiet("9am", "17:00", "UTC"), at_utc(12, 0)));
        assert!(!quiet_hours_active(&quiet("25:00", "17:00", "UTC"), at_utc(12, 0)));
    }
}
