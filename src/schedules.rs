use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

use crate::config::SchedulerConfig;
use crate::error::GodToolError;

/// A wall-clock time of day, written `HH:MM` (24-hour)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, String> {
        if hour >= 24 {
            return Err(format!("Hours must be 0-23, got: {}", hour));
        }
        if minute >= 60 {
            return Err(format!("Minutes must be 0-59, got: {}", minute));
        }
        Ok(TimeOfDay { hour, minute })
    }

    fn as_naive(&self) -> Result<NaiveTime, String> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
            .ok_or_else(|| format!("Invalid time of day: {}", self))
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(time: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = time.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(format!("Time must be in HH:MM format, got: {}", time));
        }

        let hours: u32 = parts[0]
            .parse()
            .map_err(|_| format!("Invalid hours in time: {}", parts[0]))?;
        let minutes: u32 = parts[1]
            .parse()
            .map_err(|_| format!("Invalid minutes in time: {}", parts[1]))?;

        TimeOfDay::new(hours, minutes)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// How a job recurs. Derived from the job's `schedule_time`,
/// `interval_minutes` and `daily` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Every N minutes, counted from the previous run
    Interval { minutes: u32 },
    /// Once a day at a time of day
    Daily { time: TimeOfDay },
    /// A single run at the next occurrence of a time of day
    Once { time: TimeOfDay },
}

impl Recurrence {
    /// Validate the scheduling options given for a new job
    pub fn from_options(
        schedule_time: Option<&str>,
        interval_minutes: Option<u32>,
        daily: bool,
    ) -> Result<Self, String> {
        match (schedule_time, interval_minutes, daily) {
            (None, None, false) => {
                Err("Must specify --time, --interval, or --daily for scheduling".to_string())
            }
            (None, None, true) => Err("Daily jobs require --time argument".to_string()),
            (Some(_), Some(_), _) | (None, Some(_), true) => Err(
                "--interval can't be combined with --time or --daily".to_string(),
            ),
            (None, Some(0), false) => Err("Interval must be at least 1 minute".to_string()),
            (None, Some(minutes), false) => Ok(Recurrence::Interval { minutes }),
            (Some(time), None, true) => Ok(Recurrence::Daily {
                time: time.parse()?,
            }),
            (Some(time), None, false) => Ok(Recurrence::Once {
                time: time.parse()?,
            }),
        }
    }

    /// Short description for job listings
    pub fn describe(&self) -> String {
        match self {
            Recurrence::Interval { minutes } => format!("Every {}min", minutes),
            Recurrence::Daily { time } => format!("Daily {}", time),
            Recurrence::Once { time } => format!("Once {}", time),
        }
    }
}

/// Scheduling rules: the reference timezone `HH:MM` times are read in, and
/// the catch-up behavior for one-time jobs whose time has just passed.
#[derive(Debug, Clone, Copy)]
pub struct SchedulePolicy {
    offset: FixedOffset,
    catch_up_window: Duration,
    catch_up_delay: Duration,
}

impl SchedulePolicy {
    pub fn new(offset: FixedOffset, catch_up_window: Duration, catch_up_delay: Duration) -> Self {
        SchedulePolicy {
            offset,
            catch_up_window,
            catch_up_delay,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, GodToolError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            GodToolError::Error(format!(
                "Invalid UTC offset: {} minutes",
                config.utc_offset_minutes
            ))
        })?;

        let catch_up_window = Duration::try_minutes(config.catch_up_window_minutes)
            .ok_or_else(|| {
                GodToolError::Error(format!(
                    "Catch-up window of {} minutes is out of range",
                    config.catch_up_window_minutes
                ))
            })?;
        let catch_up_delay = Duration::try_seconds(config.catch_up_delay_secs).ok_or_else(|| {
            GodToolError::Error(format!(
                "Catch-up delay of {} seconds is out of range",
                config.catch_up_delay_secs
            ))
        })?;

        Ok(SchedulePolicy::new(offset, catch_up_window, catch_up_delay))
    }

    /// Convert a UTC timestamp into the reference timezone for display
    pub fn to_local(&self, time: DateTime<Utc>) -> DateTime<FixedOffset> {
        time.with_timezone(&self.offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    // ========================================
    // Next run time calculation
    // ========================================

    /// Calculate the first run time of a newly added job
    pub fn first_run(
        &self,
        recurrence: &Recurrence,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, String> {
        match recurrence {
            Recurrence::Interval { minutes } => Ok(now + Duration::minutes(i64::from(*minutes))),

            Recurrence::Daily { time } => self.next_daily(now, time),

            Recurrence::Once { time } => {
                let today_at_time = self.today_at(now, time)?;
                if today_at_time > now {
                    return Ok(today_at_time);
                }

                // A one-time job that only just missed its slot runs shortly
                // instead of waiting a whole day
                if now - today_at_time <= self.catch_up_window {
                    Ok(now + self.catch_up_delay)
                } else {
                    Ok(today_at_time + Duration::days(1))
                }
            }
        }
    }

    /// Calculate the run time that follows an execution at `now`.
    /// Returns None for one-time jobs, which never run again.
    pub fn following_run(
        &self,
        recurrence: &Recurrence,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, String> {
        match recurrence {
            Recurrence::Interval { minutes } => {
                Ok(Some(now + Duration::minutes(i64::from(*minutes))))
            }
            Recurrence::Daily { time } => self.next_daily(now, time).map(Some),
            Recurrence::Once { .. } => Ok(None),
        }
    }

    /// Next occurrence of `time` strictly after `now`
    fn next_daily(&self, now: DateTime<Utc>, time: &TimeOfDay) -> Result<DateTime<Utc>, String> {
        let today_at_time = self.today_at(now, time)?;

        // If that time has already passed today, use tomorrow
        if today_at_time > now {
            Ok(today_at_time)
        } else {
            Ok(today_at_time + Duration::days(1))
        }
    }

    /// `time` on the reference-timezone calendar day containing `now`
    fn today_at(&self, now: DateTime<Utc>, time: &TimeOfDay) -> Result<DateTime<Utc>, String> {
        let local_date = now.with_timezone(&self.offset).date_naive();
        let naive = local_date.and_time(time.as_naive()?);

        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| format!("Invalid local time: {}", naive))
    }
}
