use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{error, warn, Level};
use logging_timer::timer;
use tempfile::NamedTempFile;

use crate::error::GodToolError;
use crate::jobs::Job;

/// Durable storage for the job list: a single JSON array, rewritten in full
/// on every save.
///
/// Saves go to a temporary file next to the store which is then renamed
/// over it, so readers see either the old list or the new one.
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JobStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all jobs. A missing store is an empty job list; an unreadable
    /// one is logged and also treated as empty.
    pub fn load(&self) -> Vec<Job> {
        if !self.path.exists() {
            return Vec::new();
        }

        match self.read() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Error loading jobs from {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Persist the full job list. Failures are logged, not returned.
    pub fn save(&self, jobs: &[Job]) {
        let _tmr = timer!(Level::Trace; "JobStore::save", "{} jobs", jobs.len());

        if let Err(e) = self.write(jobs) {
            error!("Error saving jobs to {}: {}", self.path.display(), e);
        }
    }

    fn read(&self) -> Result<Vec<Job>, GodToolError> {
        let file = File::open(&self.path)?;
        let jobs = serde_json::from_reader(BufReader::new(file))?;
        Ok(jobs)
    }

    fn write(&self, jobs: &[Job]) -> Result<(), GodToolError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, jobs)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| {
            warn!(
                "Could not replace {} with the new job list",
                self.path.display()
            );
            GodToolError::IoError(e.error)
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobAction, JobStatus};
    use crate::jobs::NextRun;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_jobs() -> Vec<Job> {
        let created = Utc.with_ymd_and_hms(2025, 1, 15, 5, 0, 0).single().unwrap();
        vec![
            Job {
                id: 1,
                action: JobAction::Fetch {
                    url: "https://example.com/status.json".into(),
                    lines: 40,
                },
                schedule_time: None,
                interval_minutes: Some(15),
                daily: false,
                created_at: created,
                last_run: None,
                next_run: Some("2025-01-15T05:15:00+00:00".into()),
                status: JobStatus::Scheduled,
            },
            Job {
                id: 4,
                action: JobAction::SortEmail {
                    sender: "billing@example.com".into(),
                },
                schedule_time: Some("09:00".into()),
                interval_minutes: None,
                daily: true,
                created_at: created,
                last_run: Some(created),
                next_run: None,
                status: JobStatus::Failed,
            },
        ]
    }

    #[test]
    fn test_missing_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("config").join("scheduled_jobs.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_unreadable_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduled_jobs.json");
        fs::write(&path, b"{ this is not json").unwrap();

        let store = JobStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("config").join("scheduled_jobs.json"));
        let jobs = sample_jobs();

        store.save(&jobs);
        assert!(store.path().exists(), "save should create the config dir");

        let loaded = store.load();
        assert_eq!(loaded, jobs);
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("scheduled_jobs.json"));

        store.save(&sample_jobs());
        store.save(&sample_jobs()[..1]);

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 1);

        // Only the store itself is left behind, no temp files
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_file_is_a_json_array() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("scheduled_jobs.json"));
        store.save(&sample_jobs());

        let text = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[1]["type"], "sort-email");
        assert_eq!(array[1]["args"]["sender"], "billing@example.com");
    }

    #[test]
    fn test_loads_older_job_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduled_jobs.json");
        fs::write(
            &path,
            r#"[
  {
    "id": 1,
    "type": "yt",
    "args": {"url": "https://youtu.be/abc", "path": "videos"},
    "schedule_time": "09:00",
    "interval": null,
    "daily": true,
    "created": "2025-01-15T10:30:12.345678",
    "last_run": "2025-01-16T03:30:00.000100",
    "next_run": "2025-01-17T03:30:00",
    "status": "scheduled"
  },
  {
    "id": 2,
    "type": "fetch",
    "args": {"url": "https://example.com"},
    "schedule_time": null,
    "interval": 15,
    "daily": false,
    "created": "2025-01-15T10:31:00",
    "last_run": null,
    "next_run": null,
    "status": "completed"
  }
]"#,
        )
        .unwrap();

        let store = JobStore::new(&path);
        let jobs = store.load();
        assert_eq!(jobs.len(), 2);

        assert_eq!(
            jobs[0].action,
            JobAction::Download {
                url: "https://youtu.be/abc".into(),
                path: "videos".into()
            }
        );
        assert_eq!(
            jobs[0].created_at,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 12).single().unwrap()
                + chrono::Duration::microseconds(345678)
        );
        assert_eq!(
            jobs[0].next_run_state(),
            NextRun::At(Utc.with_ymd_and_hms(2025, 1, 17, 3, 30, 0).single().unwrap())
        );
        assert!(jobs[0].last_run.is_some());

        assert_eq!(jobs[1].interval_minutes, Some(15));
        assert_eq!(jobs[1].status, JobStatus::Completed);
        assert_eq!(
            jobs[1].action,
            JobAction::Fetch {
                url: "https://example.com".into(),
                lines: 20
            }
        );

        // Saving rewrites the jobs in the current layout without losing any
        store.save(&jobs);
        assert_eq!(store.load(), jobs);
    }

    #[test]
    fn test_save_failure_is_not_propagated() {
        let dir = TempDir::new().unwrap();
        // The store's parent is a regular file, so the directory can't be created
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let store = JobStore::new(blocker.join("scheduled_jobs.json"));

        store.save(&sample_jobs());
        assert!(store.load().is_empty());
    }
}
