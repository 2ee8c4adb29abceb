//! Appointment slot arithmetic
//!
//! Business hours are fixed at 08:00 to 18:00 UTC and slots start every
//! 30 minutes.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::models::{BusyInterval, MAX_APPOINTMENT_MINUTES, MIN_APPOINTMENT_MINUTES};
use crate::{Error, Result};

pub const OPENING_HOUR: u32 = 8;
pub const CLOSING_HOUR: u32 = 18;
pub const SLOT_STEP_MINUTES: i64 = 30;

fn at_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// `[midnight, next midnight)` of `date` in UTC
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at_hour(date, 0);
    (start, start + Duration::days(1))
}

/// Start times of every free slot of `duration_minutes` on `date`.
///
/// `busy` should hold the blocking appointments that start on `date`.
pub fn available_slots(
    date: NaiveDate,
    duration_minutes: i64,
    busy: &[BusyInterval],
) -> Vec<DateTime<Utc>> {
    let open = at_hour(date, OPENING_HOUR);
    let close = at_hour(date, CLOSING_HOUR);
    let duration = Duration::minutes(duration_minutes.max(1));

    let mut slots = Vec::new();
    let mut current = open;
    while current + duration <= close {
        let end = current + duration;
        if !busy.iter().any(|b| b.overlaps(current, end)) {
            slots.push(current);
        }
        current += Duration::minutes(SLOT_STEP_MINUTES);
    }
    slots
}

/// Check the requested interval of a new or rescheduled appointment
pub fn validate_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: Option<DateTime<Utc>>,
) -> Result<()> {
    if start >= end {
        return Err(Error::rule(
            "InvalidTimeRange",
            "Start time must be before end time",
        ));
    }
    if let Some(now) = now
        && start < now
    {
        return Err(Error::rule(
            "AppointmentInPast",
            "Cannot schedule appointment in the past",
        ));
    }
    Ok(())
}

pub fn validate_duration(minutes: i32) -> Result<()> {
    if (MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!(
            "Estimated duration must be between {} and {} minutes",
            MIN_APPOINTMENT_MINUTES, MAX_APPOINTMENT_MINUTES
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn test_empty_day_has_all_slots() {
        let slots = available_slots(date(), 60, &[]);
        // 08:00 .. 17:00 inclusive in 30-minute steps
        assert_eq!(slots.len(), 19);
        assert_eq!(slots[0], at_hour(date(), 8));
        assert_eq!(*slots.last().unwrap(), at_hour(date(), 17));
    }

    #[test]
    fn test_busy_interval_removes_overlapping_slots() {
        let busy = [BusyInterval {
            start: at_hour(date(), 10),
            end: at_hour(date(), 11),
        }];
        let slots = available_slots(date(), 60, &busy);
        assert!(slots.contains(&at_hour(date(), 9)));
        assert!(!slots.contains(&(at_hour(date(), 9) + Duration::minutes(30))));
        assert!(!slots.contains(&at_hour(date(), 10)));
        assert!(slots.contains(&at_hour(date(), 11)));
    }

    #[test]
    fn test_long_duration_fits_business_hours() {
        let slots = available_slots(date(), 480, &[]);
        assert_eq!(slots.len(), 5);
        assert!(available_slots(date(), 660, &[]).is_empty());
    }

    #[test]
    fn test_validate_window() {
        let now = at_hour(date(), 9);
        assert_eq!(
            validate_window(at_hour(date(), 12), at_hour(date(), 11), Some(now))
                .unwrap_err()
                .to_string(),
            "Start time must be before end time"
        );
        assert_eq!(
            validate_window(at_hour(date(), 8), at_hour(date(), 10), Some(now))
                .unwrap_err()
                .to_string(),
            "Cannot schedule appointment in the past"
        );
        assert!(validate_window(at_hour(date(), 8), at_hour(date(), 10), None).is_ok());
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = day_bounds(date());
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(start, at_hour(date(), 0));
    }
}
