use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::job::{JobAction, JobStatus, JobType};
use crate::schedules::{Recurrence, TimeOfDay};

/// A scheduled job as stored in the job store file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,

    // Serialized as "type" + "args"
    #[serde(flatten)]
    pub action: JobAction,

    // For daily and one-time jobs: 'HH:MM' in the reference timezone
    pub schedule_time: Option<String>,
    #[serde(default, alias = "interval")]
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub daily: bool,

    // Older job files use "created" and timestamps without an offset
    #[serde(alias = "created", deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub last_run: Option<DateTime<Utc>>,

    // Kept as text so that a hand-edited or corrupted value only disables
    // this job instead of failing the whole store load
    pub next_run: Option<String>,

    pub status: JobStatus,
}

/// The interpretation of a job's stored `next_run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextRun {
    Absent,
    At(DateTime<Utc>),
    Invalid(String),
}

impl Job {
    pub fn job_type(&self) -> JobType {
        self.action.job_type()
    }

    /// The recurrence encoded by the scheduling fields. None means the job
    /// has no usable schedule and is never executed.
    pub fn recurrence(&self) -> Option<Recurrence> {
        if let Some(minutes) = self.interval_minutes.filter(|m| *m > 0) {
            return Some(Recurrence::Interval { minutes });
        }

        let time: TimeOfDay = self.schedule_time.as_deref()?.parse().ok()?;
        if self.daily {
            Some(Recurrence::Daily { time })
        } else {
            Some(Recurrence::Once { time })
        }
    }

    pub fn next_run_state(&self) -> NextRun {
        match self.next_run.as_deref() {
            None => NextRun::Absent,
            Some(text) => match parse_timestamp(text) {
                Some(time) => NextRun::At(time),
                None => NextRun::Invalid(text.to_owned()),
            },
        }
    }

    pub fn set_next_run(&mut self, next_run: Option<DateTime<Utc>>) {
        self.next_run = next_run.map(|t| t.to_rfc3339());
    }

    /// A due job is scheduled and its next run time has arrived
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Scheduled
            && matches!(self.next_run_state(), NextRun::At(next) if next <= now)
    }

    pub fn describe_schedule(&self) -> String {
        match self.recurrence() {
            Some(recurrence) => recurrence.describe(),
            None => "Unscheduled".to_string(),
        }
    }
}

/// Parse an RFC 3339 timestamp. A timestamp without an offset is taken
/// to be UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    text.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", text)))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(text) => parse_timestamp(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", text))),
        None => Ok(None),
    }
}
