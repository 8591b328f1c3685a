//! Pure schedule predicates.
//!
//! A schedule is a function of explicit time components only; nothing in this
//! module reads the clock. The dispatcher samples the wall clock once per
//! tick and every predicate is evaluated against that sample, which keeps the
//! whole table unit-testable without time mocking.

use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Day-of-week constants, 0 = Sunday through 6 = Saturday.
pub mod weekday {
    pub const SUNDAY: u32 = 0;
    pub const MONDAY: u32 = 1;
    pub const TUESDAY: u32 = 2;
    pub const WEDNESDAY: u32 = 3;
    pub const THURSDAY: u32 = 4;
    pub const FRIDAY: u32 = 5;
    pub const SATURDAY: u32 = 6;
}

/// The time components of one dispatcher tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTime {
    /// 0..=59
    pub minute: u32,
    /// 0..=23
    pub hour: u32,
    /// 0 = Sunday ..= 6 = Saturday
    pub weekday: u32,
}

impl TickTime {
    pub fn new(minute: u32, hour: u32, weekday: u32) -> Self {
        debug_assert!(minute < 60 && hour < 24 && weekday < 7);
        Self {
            minute,
            hour,
            weekday,
        }
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            minute: dt.minute(),
            hour: dt.hour(),
            weekday: dt.weekday().num_days_from_sunday(),
        }
    }
}

/// When a job is due. Predicates are independent and deliberately not
/// mutually exclusive: minute 0 satisfies `EveryTick`, every `EveryMinutes`
/// class and `HourlyAt(0)` at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every dispatcher tick (once per minute).
    EveryTick,
    /// Every `n` minutes, on minutes divisible by `n`.
    EveryMinutes(u32),
    /// Once per hour at the given minute.
    HourlyAt(u32),
    /// Once per day at `hour`:00.
    DailyAt(u32),
    /// Once per week at `hour`:00 on the given day (0 = Sunday).
    WeeklyAt(u32, u32),
}

impl Schedule {
    pub fn is_due(&self, t: TickTime) -> bool {
        match *self {
            Schedule::EveryTick => true,
            Schedule::EveryMinutes(n) => t.minute % n == 0,
            Schedule::HourlyAt(minute) => t.minute == minute,
            Schedule::DailyAt(hour) => t.hour == hour && t.minute == 0,
            Schedule::WeeklyAt(day, hour) => t.weekday == day && t.hour == hour && t.minute == 0,
        }
    }

    /// Human-readable cadence for the jobs listing.
    pub fn describe(&self) -> String {
        const DAYS: [&str; 7] = [
            "Sunday",
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
        ];
        match *self {
            Schedule::EveryTick => "every minute".to_string(),
            Schedule::EveryMinutes(n) => format!("every {} minutes", n),
            Schedule::HourlyAt(minute) => format!("hourly at :{:02}", minute),
            Schedule::DailyAt(hour) => format!("daily at {:02}:00", hour),
            Schedule::WeeklyAt(day, hour) => {
                format!("{} at {:02}:00", DAYS[day as usize % 7], hour)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::weekday::*;
    use super::*;
    use chrono::Utc;

    #[test]
    fn every_tick_is_always_due() {
        for minute in 0..60 {
            assert!(Schedule::EveryTick.is_due(TickTime::new(minute, 13, TUESDAY)));
        }
    }

    #[test]
    fn every_minutes_fires_on_multiples() {
        let five = Schedule::EveryMinutes(5);
        assert!(five.is_due(TickTime::new(0, 9, MONDAY)));
        assert!(five.is_due(TickTime::new(25, 9, MONDAY)));
        assert!(!five.is_due(TickTime::new(26, 9, MONDAY)));

        let fifteen = Schedule::EveryMinutes(15);
        assert!(fifteen.is_due(TickTime::new(45, 9, MONDAY)));
        assert!(!fifteen.is_due(TickTime::new(50, 9, MONDAY)));
    }

    #[test]
    fn half_hour_cadences_are_distinct() {
        let every_thirty = Schedule::EveryMinutes(30);
        let at_thirty = Schedule::HourlyAt(30);

        // At :30 both classes fire.
        let half_past = TickTime::new(30, 11, WEDNESDAY);
        assert!(every_thirty.is_due(half_past));
        assert!(at_thirty.is_due(half_past));

        // At :00 only the every-30 class fires (its :00 branch).
        let on_the_hour = TickTime::new(0, 11, WEDNESDAY);
        assert!(every_thirty.is_due(on_the_hour));
        assert!(!at_thirty.is_due(on_the_hour));
    }

    #[test]
    fn hourly_fires_once_per_hour() {
        let hourly = Schedule::HourlyAt(0);
        for hour in 0..24 {
            assert!(hourly.is_due(TickTime::new(0, hour, THURSDAY)));
            assert!(!hourly.is_due(TickTime::new(1, hour, THURSDAY)));
        }
    }

    #[test]
    fn daily_fires_only_at_its_hour() {
        let daily = Schedule::DailyAt(8);
        assert!(daily.is_due(TickTime::new(0, 8, SATURDAY)));
        assert!(!daily.is_due(TickTime::new(30, 8, SATURDAY)));
        assert!(!daily.is_due(TickTime::new(0, 9, SATURDAY)));
    }

    #[test]
    fn weekly_fires_only_on_its_slot() {
        let weekly = Schedule::WeeklyAt(FRIDAY, 17);
        assert!(weekly.is_due(TickTime::new(0, 17, FRIDAY)));
        assert!(!weekly.is_due(TickTime::new(0, 17, THURSDAY)));
        assert!(!weekly.is_due(TickTime::new(0, 16, FRIDAY)));
        assert!(!weekly.is_due(TickTime::new(1, 17, FRIDAY)));
    }

    #[test]
    fn midnight_sunday_convergence() {
        // Sunday 00:00 satisfies every non-offset cadence class at once.
        let t = TickTime::new(0, 0, SUNDAY);
        assert!(Schedule::EveryTick.is_due(t));
        assert!(Schedule::EveryMinutes(5).is_due(t));
        assert!(Schedule::EveryMinutes(15).is_due(t));
        assert!(Schedule::EveryMinutes(30).is_due(t));
        assert!(Schedule::HourlyAt(0).is_due(t));
        assert!(Schedule::DailyAt(0).is_due(t));
        assert!(Schedule::WeeklyAt(SUNDAY, 0).is_due(t));

        // ...but not the offset classes.
        assert!(!Schedule::HourlyAt(30).is_due(t));
        assert!(!Schedule::DailyAt(8).is_due(t));
        assert!(!Schedule::WeeklyAt(MONDAY, 0).is_due(t));
    }

    #[test]
    fn from_datetime_maps_weekday_sunday_based() {
        // 2026-08-02 was a Sunday.
        let dt = Utc.with_ymd_and_hms(2026, 8, 2, 9, 30, 0).unwrap();
        let t = TickTime::from_datetime(&dt);
        assert_eq!(t.weekday, SUNDAY);
        assert_eq!(t.hour, 9);
        assert_eq!(t.minute, 30);

        let dt = Utc.with_ymd_and_hms(2026, 8, 7, 17, 0, 0).unwrap();
        assert_eq!(TickTime::from_datetime(&dt).weekday, FRIDAY);
    }

    #[test]
    fn describe_is_readable() {
        assert_eq!(Schedule::EveryTick.describe(), "every minute");
        assert_eq!(Schedule::EveryMinutes(15).describe(), "every 15 minutes");
        assert_eq!(Schedule::HourlyAt(30).describe(), "hourly at :30");
        assert_eq!(Schedule::DailyAt(3).describe(), "daily at 03:00");
        assert_eq!(
            Schedule::WeeklyAt(MONDAY, 9).describe(),
            "Monday at 09:00"
        );
    }
}
