//! Transitions of a single day's attendance record.
//!
//! Every transition validates first and mutates only once all checks pass,
//! so a declined action leaves the record untouched.

use chrono::NaiveTime;
use strum_macros::Display;

use crate::attendance::error::Decline;
use crate::attendance::geo;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, PeriodMark};
use crate::model::geo::GeoPoint;
use crate::model::period::Period;
use crate::utils::time_format::{self, minutes_of_day};

/// Below this many hours a completed day is a half-day.
pub const HALF_DAY_HOURS: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DayPhase {
    Empty,
    InProgress,
    Completed,
}

pub fn phase(record: &AttendanceRecord) -> DayPhase {
    match (record.clock_in_time, record.clock_out_time) {
        (_, Some(_)) => DayPhase::Completed,
        (Some(_), None) => DayPhase::InProgress,
        (None, None) => DayPhase::Empty,
    }
}

/// (out - in) in hours, rounded to two decimals. `None` if out precedes in.
pub fn total_hours(clock_in: NaiveTime, clock_out: NaiveTime) -> Option<f64> {
    let minutes = minutes_of_day(clock_out) - minutes_of_day(clock_in);
    if minutes < 0 {
        return None;
    }
    Some((minutes as f64 / 60.0 * 100.0).round() / 100.0)
}

/// Worked hours decide once the day is closed; before that a clock-in or any
/// period mark counts as present.
pub fn derive_status(record: &AttendanceRecord) -> Option<AttendanceStatus> {
    match record.total_hours {
        Some(hours) if hours < HALF_DAY_HOURS => Some(AttendanceStatus::HalfDay),
        Some(_) => Some(AttendanceStatus::Present),
        None if record.clock_in_time.is_some() || !record.period_marks.is_empty() => {
            Some(AttendanceStatus::Present)
        }
        None => record.status,
    }
}

/// Whole-day clock-in. Repeating it before clock-out overwrites the time.
/// A completed day is refused, since a new clock-in could land after the
/// recorded clock-out and invalidate the total hours.
pub fn clock_in(record: &mut AttendanceRecord, now: NaiveTime, location: GeoPoint) -> Result<(), Decline> {
    if phase(record) == DayPhase::Completed {
        return Err(Decline::AlreadyClockedOut);
    }

    record.clock_in_time = Some(time_format::truncate_to_minute(now));
    record.clock_in_location = Some(location);
    record.status = derive_status(record);
    Ok(())
}

/// Checks a period mark without applying it.
pub fn check_period_mark(
    record: &AttendanceRecord,
    period: &Period,
    now: NaiveTime,
    location: GeoPoint,
) -> Result<(), Decline> {
    let now = time_format::truncate_to_minute(now);
    if !period.contains(now) {
        return Err(Decline::OutsidePeriodWindow {
            period_id: period.id,
            start: period.start.format(time_format::FORMAT).to_string(),
            end: period.end.format(time_format::FORMAT).to_string(),
            now: now.format(time_format::FORMAT).to_string(),
        });
    }

    if !geo::within_radius(location, period.location, period.radius_m) {
        return Err(Decline::LocationMismatch {
            location_name: period.location_name.clone(),
            distance_m: geo::distance(location, period.location),
            radius_m: period.radius_m,
        });
    }

    if record.mark_for(period.id).is_some() {
        return Err(Decline::AlreadyMarked { period_id: period.id });
    }

    Ok(())
}

/// Appends a period mark; the first attendance of the day also becomes the clock-in.
pub fn mark_period(
    record: &mut AttendanceRecord,
    period: &Period,
    now: NaiveTime,
    location: GeoPoint,
) -> Result<(), Decline> {
    check_period_mark(record, period, now, location)?;

    let now = time_format::truncate_to_minute(now);
    record.period_marks.push(PeriodMark {
        period_id: period.id,
        marked_at: now,
        present: true,
        location: Some(location),
    });

    if record.clock_in_time.is_none() {
        record.clock_in_time = Some(now);
        record.clock_in_location = Some(location);
    }
    record.status = derive_status(record);
    Ok(())
}

pub fn clock_out(record: &mut AttendanceRecord, now: NaiveTime, location: GeoPoint) -> Result<(), Decline> {
    let clock_in = match (record.clock_in_time, record.clock_out_time) {
        (None, _) => return Err(Decline::NoActiveSession),
        (Some(_), Some(_)) => return Err(Decline::AlreadyClockedOut),
        (Some(clock_in), None) => clock_in,
    };

    let now = time_format::truncate_to_minute(now);
    let hours = total_hours(clock_in, now).ok_or_else(|| Decline::ClockOutBeforeClockIn {
        clock_in: clock_in.format(time_format::FORMAT).to_string(),
        clock_out: now.format(time_format::FORMAT).to_string(),
    })?;

    record.clock_out_time = Some(now);
    record.clock_out_location = Some(location);
    record.total_hours = Some(hours);
    record.status = derive_status(record);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn office() -> GeoPoint {
        GeoPoint::new(23.8103, 90.4125).unwrap()
    }

    fn record() -> AttendanceRecord {
        AttendanceRecord::skeleton(2, "John Employee", NaiveDate::from_ymd_opt(2025, 5, 5).unwrap())
    }

    fn period(id: u32, start: NaiveTime, end: NaiveTime) -> Period {
        Period {
            id,
            name: format!("Period {id}"),
            start,
            end,
            location: office(),
            location_name: "Main Building".into(),
            radius_m: 100.0,
        }
    }

    /// A point `meters` due north of `origin`.
    fn north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
        let d_lat = (meters / geo::EARTH_RADIUS_M).to_degrees();
        GeoPoint::new(origin.latitude + d_lat, origin.longitude).unwrap()
    }

    #[test]
    fn full_day_is_present() {
        let mut r = record();
        clock_in(&mut r, t(8, 0), office()).unwrap();
        assert_eq!(phase(&r), DayPhase::InProgress);
        assert_eq!(r.total_hours, None);

        clock_out(&mut r, t(12, 30), office()).unwrap();
        assert_eq!(r.total_hours, Some(4.5));
        assert_eq!(r.status, Some(AttendanceStatus::Present));
        assert_eq!(phase(&r), DayPhase::Completed);
    }

    #[test]
    fn short_day_is_half_day() {
        let mut r = record();
        clock_in(&mut r, t(9, 0), office()).unwrap();
        clock_out(&mut r, t(11, 30), office()).unwrap();
        assert_eq!(r.total_hours, Some(2.5));
        assert_eq!(r.status, Some(AttendanceStatus::HalfDay));
    }

    #[test]
    fn hours_round_to_two_decimals() {
        assert_eq!(total_hours(t(8, 0), t(8, 20)), Some(0.33));
        assert_eq!(total_hours(t(8, 30), t(17, 15)), Some(8.75));
        assert_eq!(total_hours(t(9, 0), t(8, 59)), None);
    }

    #[test]
    fn clock_in_truncates_seconds() {
        let mut r = record();
        clock_in(&mut r, NaiveTime::from_hms_opt(8, 1, 45).unwrap(), office()).unwrap();
        assert_eq!(r.clock_in_time, Some(t(8, 1)));
    }

    #[test]
    fn clock_in_overwrites_until_clock_out() {
        let mut r = record();
        clock_in(&mut r, t(8, 0), office()).unwrap();
        clock_in(&mut r, t(8, 10), office()).unwrap();
        assert_eq!(r.clock_in_time, Some(t(8, 10)));

        clock_out(&mut r, t(16, 0), office()).unwrap();
        let before = r.clone();
        assert_eq!(clock_in(&mut r, t(16, 5), office()), Err(Decline::AlreadyClockedOut));
        assert_eq!(r, before);
    }

    #[test]
    fn clock_out_requires_clock_in() {
        let mut r = record();
        let before = r.clone();
        assert_eq!(clock_out(&mut r, t(12, 0), office()), Err(Decline::NoActiveSession));
        assert_eq!(r, before);
    }

    #[test]
    fn clock_out_twice_is_declined() {
        let mut r = record();
        clock_in(&mut r, t(8, 0), office()).unwrap();
        clock_out(&mut r, t(12, 0), office()).unwrap();
        assert_eq!(clock_out(&mut r, t(13, 0), office()), Err(Decline::AlreadyClockedOut));
        assert_eq!(r.clock_out_time, Some(t(12, 0)));
    }

    #[test]
    fn clock_out_before_clock_in_is_declined() {
        let mut r = record();
        clock_in(&mut r, t(10, 0), office()).unwrap();
        let before = r.clone();
        assert!(matches!(
            clock_out(&mut r, t(9, 0), office()),
            Err(Decline::ClockOutBeforeClockIn { .. })
        ));
        assert_eq!(r, before);
    }

    #[test]
    fn period_mark_sets_first_clock_in() {
        let mut r = record();
        let p = period(1, t(8, 0), t(8, 50));
        mark_period(&mut r, &p, t(8, 10), office()).unwrap();

        assert_eq!(r.period_marks.len(), 1);
        assert!(r.period_marks[0].present);
        assert_eq!(r.clock_in_time, Some(t(8, 10)));
        assert_eq!(r.status, Some(AttendanceStatus::Present));
        assert_eq!(r.total_hours, None);

        let p2 = period(2, t(9, 0), t(9, 50));
        mark_period(&mut r, &p2, t(9, 5), office()).unwrap();
        assert_eq!(r.clock_in_time, Some(t(8, 10)));
        assert_eq!(r.period_marks.len(), 2);
    }

    #[test]
    fn duplicate_period_mark_is_declined() {
        let mut r = record();
        let p = period(3, t(10, 0), t(10, 50));
        mark_period(&mut r, &p, t(10, 5), office()).unwrap();

        assert_eq!(
            mark_period(&mut r, &p, t(10, 6), office()),
            Err(Decline::AlreadyMarked { period_id: 3 })
        );
        assert_eq!(r.period_marks.iter().filter(|m| m.period_id == 3).count(), 1);
    }

    #[test]
    fn out_of_window_mark_leaves_record_alone() {
        let mut r = record();
        let before = r.clone();
        let p = period(1, t(8, 0), t(8, 50));

        let err = mark_period(&mut r, &p, t(9, 10), office()).unwrap_err();
        assert!(matches!(err, Decline::OutsidePeriodWindow { period_id: 1, .. }));
        assert_eq!(r, before);
    }

    #[test]
    fn location_must_be_within_radius() {
        let p = period(1, t(8, 0), t(8, 50));

        let mut r = record();
        let far = north_of(office(), 500.0);
        let err = mark_period(&mut r, &p, t(8, 5), far).unwrap_err();
        match err {
            Decline::LocationMismatch { distance_m, radius_m, .. } => {
                assert!((distance_m - 500.0).abs() < 0.01);
                assert_eq!(radius_m, 100.0);
            }
            other => panic!("unexpected decline {other:?}"),
        }
        assert!(r.period_marks.is_empty());

        // 100 m against a 100 m radius, within a millimetre of rounding
        let edge = north_of(office(), 100.0 - 1e-3);
        assert!((geo::distance(edge, office()) - 100.0).abs() < 1e-2);
        mark_period(&mut r, &p, t(8, 5), edge).unwrap();
        assert_eq!(r.period_marks.len(), 1);

        let mut r = record();
        let beyond = north_of(office(), 100.0 + 1e-2);
        let err = mark_period(&mut r, &p, t(8, 5), beyond).unwrap_err();
        assert!(matches!(err, Decline::LocationMismatch { .. }));
    }

    #[test]
    fn hours_refine_status_after_period_marks() {
        let mut r = record();
        let p = period(1, t(8, 0), t(8, 50));
        mark_period(&mut r, &p, t(8, 0), office()).unwrap();
        assert_eq!(r.status, Some(AttendanceStatus::Present));

        clock_out(&mut r, t(10, 0), office()).unwrap();
        assert_eq!(r.total_hours, Some(2.0));
        assert_eq!(r.status, Some(AttendanceStatus::HalfDay));
    }
}
