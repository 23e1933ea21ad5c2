//! Trading-calendar gate.
//!
//! Decides whether a cycle may run at a given instant. Checks, first match
//! wins:
//!
//! 1. Holiday → skip
//! 2. Weekend with weekend runs disabled → skip
//! 3. Test mode → run at any hour
//! 4. Inside the session window (both ends inclusive) → run, else skip

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Weekday};
use std::collections::BTreeSet;
use std::fmt;

use scanwatch_common::config::ScheduleConfig;
use scanwatch_common::{Error, Result};

/// Exchange holidays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Holiday,
    Weekend,
    TestOverride,
    WithinSession,
    OutsideSession,
}

impl GateDecision {
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::TestOverride | Self::WithinSession)
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Holiday => "public holiday",
            Self::Weekend => "weekend and weekend runs are disabled",
            Self::TestOverride => "test mode overrides the session window",
            Self::WithinSession => "within market hours",
            Self::OutsideSession => "outside market hours",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Static gate policy.
#[derive(Debug, Clone)]
pub struct CalendarGate {
    zone: FixedOffset,
    session_start: NaiveTime,
    session_end: NaiveTime,
    run_on_weekends: bool,
    test_mode: bool,
    holidays: HolidayCalendar,
}

impl CalendarGate {
    /// Build a gate from the schedule section and holiday list.
    pub fn from_config(schedule: &ScheduleConfig, holidays: &[NaiveDate]) -> Result<Self> {
        let zone = schedule.timezone().ok_or_else(|| {
            Error::Config(format!(
                "utc_offset_minutes {} is out of range",
                schedule.utc_offset_minutes
            ))
        })?;
        let session_start = schedule.session_start_time().ok_or_else(|| {
            Error::Config(format!("invalid session_start '{}'", schedule.session_start))
        })?;
        let session_end = schedule.session_end_time().ok_or_else(|| {
            Error::Config(format!("invalid session_end '{}'", schedule.session_end))
        })?;

        Ok(Self {
            zone,
            session_start,
            session_end,
            run_on_weekends: schedule.run_on_weekends,
            test_mode: schedule.test_mode,
            holidays: HolidayCalendar::new(holidays.iter().copied()),
        })
    }

    /// The gate's fixed time zone.
    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn holidays(&self) -> &HolidayCalendar {
        &self.holidays
    }

    /// Calendar date of `now` in the gate's zone.
    pub fn today<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> NaiveDate {
        now.with_timezone(&self.zone).date_naive()
    }

    /// Evaluate the gate at `now`.
    pub fn evaluate<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> GateDecision {
        let local = now.with_timezone(&self.zone);
        let today = local.date_naive();

        if self.holidays.contains(today) {
            return GateDecision::Holiday;
        }

        let weekend = matches!(today.weekday(), Weekday::Sat | Weekday::Sun);
        if weekend && !self.run_on_weekends {
            return GateDecision::Weekend;
        }

        if self.test_mode {
            return GateDecision::TestOverride;
        }

        let time = local.time();
        if self.session_start <= time && time <= self.session_end {
            GateDecision::WithinSession
        } else {
            GateDecision::OutsideSession
        }
    }

    /// Whether a cycle may run at `now`.
    pub fn should_run<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.evaluate(now).is_eligible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(y, m, d, hh, mm, ss).unwrap()
    }

    fn gate(test_mode: bool, run_on_weekends: bool, holidays: &[NaiveDate]) -> CalendarGate {
        let schedule = ScheduleConfig {
            test_mode,
            run_on_weekends,
            ..Default::default()
        };
        CalendarGate::from_config(&schedule, holidays).unwrap()
    }

    // 2025-01-27 is a Monday, 2025-02-01 a Saturday.
    const MONDAY: (i32, u32, u32) = (2025, 1, 27);
    const SATURDAY: (i32, u32, u32) = (2025, 2, 1);

    #[test]
    fn test_session_boundaries_inclusive() {
        let g = gate(false, false, &[]);
        let (y, m, d) = MONDAY;

        assert!(g.should_run(&at(y, m, d, 9, 15, 0)));
        assert!(g.should_run(&at(y, m, d, 15, 15, 0)));
        assert!(g.should_run(&at(y, m, d, 12, 0, 0)));
        assert!(!g.should_run(&at(y, m, d, 9, 14, 59)));
        assert!(!g.should_run(&at(y, m, d, 15, 15, 1)));
        assert_eq!(
            g.evaluate(&at(y, m, d, 20, 0, 0)),
            GateDecision::OutsideSession
        );
    }

    #[test]
    fn test_holiday_blocks_every_hour_and_flag() {
        let (y, m, d) = MONDAY;
        let holiday = NaiveDate::from_ymd_opt(y, m, d).unwrap();

        for (test_mode, weekends) in [(false, false), (true, false), (false, true), (true, true)] {
            let g = gate(test_mode, weekends, &[holiday]);
            for hour in 0..24 {
                let now = at(y, m, d, hour, 30, 0);
                assert_eq!(g.evaluate(&now), GateDecision::Holiday);
                assert!(!g.should_run(&now));
            }
        }
    }

    #[test]
    fn test_weekend_blocked_when_disabled() {
        let (y, m, d) = SATURDAY;
        for test_mode in [false, true] {
            let g = gate(test_mode, false, &[]);
            assert_eq!(g.evaluate(&at(y, m, d, 10, 0, 0)), GateDecision::Weekend);
            assert!(!g.should_run(&at(y, m, d + 1, 10, 0, 0)));
        }
    }

    #[test]
    fn test_weekend_allowed_when_enabled() {
        let g = gate(false, true, &[]);
        let (y, m, d) = SATURDAY;
        assert!(g.should_run(&at(y, m, d, 10, 0, 0)));
        assert!(!g.should_run(&at(y, m, d, 22, 0, 0)));
    }

    #[test]
    fn test_test_mode_ignores_clock() {
        let g = gate(true, false, &[]);
        let (y, m, d) = MONDAY;
        for hour in [0, 3, 8, 16, 23] {
            let now = at(y, m, d, hour, 0, 0);
            assert_eq!(g.evaluate(&now), GateDecision::TestOverride);
            assert!(g.should_run(&now));
        }
    }

    #[test]
    fn test_utc_input_converted_to_exchange_zone() {
        let g = gate(false, false, &[]);
        // 03:45 UTC is 09:15 IST.
        let open = Utc.with_ymd_and_hms(2025, 1, 27, 3, 45, 0).unwrap();
        assert!(g.should_run(&open));
        let before = Utc.with_ymd_and_hms(2025, 1, 27, 3, 44, 59).unwrap();
        assert!(!g.should_run(&before));
    }

    #[test]
    fn test_holiday_date_taken_in_exchange_zone() {
        // 2025-01-25 20:00 UTC is already 2025-01-26 in IST.
        let republic_day = NaiveDate::from_ymd_opt(2025, 1, 26).unwrap();
        let g = gate(true, true, &[republic_day]);
        let now = Utc.with_ymd_and_hms(2025, 1, 25, 20, 0, 0).unwrap();
        assert_eq!(g.today(&now), republic_day);
        assert_eq!(g.evaluate(&now), GateDecision::Holiday);
    }

    #[test]
    fn test_bad_session_time_rejected() {
        let schedule = ScheduleConfig {
            session_start: "9am".to_string(),
            ..Default::default()
        };
        assert!(CalendarGate::from_config(&schedule, &[]).is_err());
    }
}
