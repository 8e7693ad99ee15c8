//! Delivery triggers and the engine that fires them
//!
//! All times are local wall-clock times without a time zone. A [`ScheduleSpec`]
//! only tells when something should happen; [`SchedulerEngine`] keeps the
//! registry of pending jobs and runs a callback on its own thread whenever a
//! job comes due.

use std::fmt::{self, Display, Formatter};

use chrono::{NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use croner::Cron;
use uuid::Uuid;

pub use self::{
    clock::{Clock, ManualClock, SystemClock},
    engine::{JobState, JobSummary, SchedulerEngine, DEFAULT_TICK, RETIRED_LIMIT},
};
use crate::error::ValidationError;

mod clock;
mod engine;

/// Identifier of a registered job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// An hour and minute of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Fails unless `hour` is 0-23 and `minute` is 0-59
    ///
    /// ```
    /// use envoi::TimeOfDay;
    ///
    /// assert_eq!(TimeOfDay::new(9, 5).unwrap().to_string(), "09:05");
    /// assert!(TimeOfDay::new(24, 0).is_err());
    /// ```
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(TimeOfDay)
            .ok_or(ValidationError::InvalidTimeOfDay { hour, minute })
    }

    /// Hour, 0-23
    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    /// Minute, 0-59
    pub fn minute(self) -> u32 {
        self.0.minute()
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// When a message should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScheduleSpec {
    /// Right away, without going through the scheduler
    Immediate,
    /// Once, at the given moment
    OneShot(NaiveDateTime),
    /// Every day at the given time
    Daily(TimeOfDay),
    /// Monday to Friday at the given time
    Weekday(TimeOfDay),
}

impl ScheduleSpec {
    /// First fire time strictly after `now`
    ///
    /// `None` for [`ScheduleSpec::Immediate`] and for one-shots in the past.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use envoi::{ScheduleSpec, TimeOfDay};
    ///
    /// // a Friday afternoon
    /// let now = NaiveDate::from_ymd_opt(2026, 10, 23)
    ///     .unwrap()
    ///     .and_hms_opt(15, 0, 0)
    ///     .unwrap();
    /// let monday_nine = NaiveDate::from_ymd_opt(2026, 10, 26)
    ///     .unwrap()
    ///     .and_hms_opt(9, 0, 0)
    ///     .unwrap();
    ///
    /// let spec = ScheduleSpec::Weekday(TimeOfDay::new(9, 0).unwrap());
    /// assert_eq!(spec.next_after(now), Some(monday_nine));
    /// ```
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            ScheduleSpec::Immediate => None,
            ScheduleSpec::OneShot(fire_at) => (fire_at > now).then_some(fire_at),
            ScheduleSpec::Daily(_) | ScheduleSpec::Weekday(_) => {
                let cron = Cron::new(&self.cron_pattern()?).parse().ok()?;
                // wall-clock times go through cron as if they were UTC
                cron.find_next_occurrence(&Utc.from_utc_datetime(&now), false)
                    .ok()
                    .map(|next| next.naive_utc())
            }
        }
    }

    /// Cron pattern of a recurring trigger, such as `30 9 * * MON-FRI`
    pub fn cron_pattern(&self) -> Option<String> {
        match self {
            ScheduleSpec::Immediate | ScheduleSpec::OneShot(_) => None,
            ScheduleSpec::Daily(time) => Some(format!("{} {} * * *", time.minute(), time.hour())),
            ScheduleSpec::Weekday(time) => Some(format!(
                "{} {} * * MON-FRI",
                time.minute(),
                time.hour()
            )),
        }
    }

    /// Human readable form, such as `daily 09:00`
    pub fn description(&self) -> String {
        match self {
            ScheduleSpec::Immediate => "immediate".to_owned(),
            ScheduleSpec::OneShot(fire_at) => {
                format!("one-shot {}", fire_at.format("%Y-%m-%d %H:%M"))
            }
            ScheduleSpec::Daily(time) => format!("daily {time}"),
            ScheduleSpec::Weekday(time) => format!("weekdays {time}"),
        }
    }

    /// Whether the trigger fires more than once
    pub fn is_recurring(&self) -> bool {
        matches!(self, ScheduleSpec::Daily(_) | ScheduleSpec::Weekday(_))
    }
}

impl Display for ScheduleSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
