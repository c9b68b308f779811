use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn, Level};
use logging_timer::timer;

use crate::error::GodToolError;
use crate::handlers::JobHandler;
use crate::job::{JobAction, JobStatus};
use crate::job_store::JobStore;
use crate::jobs::{Job, NextRun};
use crate::schedules::{Recurrence, SchedulePolicy};

/// A job as requested by the user, before validation
#[derive(Debug, Clone)]
pub struct NewJob {
    pub action: JobAction,
    pub schedule_time: Option<String>,
    pub interval_minutes: Option<u32>,
    pub daily: bool,
}

/// Outcome of removing a batch of job ids
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemoveReport {
    pub removed: Vec<u64>,
    pub not_found: Vec<u64>,
}

struct SchedulerState {
    next_id: u64,
}

/// Owns the job list and the rules for when jobs run.
///
/// The store file is the source of truth: every operation loads it, applies
/// its change and saves it again while holding the scheduler lock, so
/// changes from the poll loop and from workers finishing jobs never
/// overwrite each other. Handlers run outside the lock.
pub struct JobScheduler {
    store: JobStore,
    policy: SchedulePolicy,
    handler: Arc<dyn JobHandler>,
    state: Mutex<SchedulerState>,
}

impl JobScheduler {
    pub fn new(store: JobStore, policy: SchedulePolicy, handler: Arc<dyn JobHandler>) -> Self {
        debug!("Using job store {}", store.path().display());
        let next_id = next_free_id(&store.load());
        JobScheduler {
            store,
            policy,
            handler,
            state: Mutex::new(SchedulerState { next_id }),
        }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    // ========================================
    // Job list management
    // ========================================

    /// Validate and add a job. Returns the new job's id.
    pub fn add_job(&self, new_job: NewJob) -> Result<u64, GodToolError> {
        self.add_job_at(new_job, Utc::now())
    }

    pub fn add_job_at(&self, new_job: NewJob, now: DateTime<Utc>) -> Result<u64, GodToolError> {
        let recurrence = Recurrence::from_options(
            new_job.schedule_time.as_deref(),
            new_job.interval_minutes,
            new_job.daily,
        )
        .map_err(GodToolError::Validation)?;

        let next_run = self
            .policy
            .first_run(&recurrence, now)
            .map_err(GodToolError::Validation)?;

        let (schedule_time, interval_minutes, daily) = match recurrence {
            Recurrence::Interval { minutes } => (None, Some(minutes), false),
            Recurrence::Daily { time } => (Some(time.to_string()), None, true),
            Recurrence::Once { time } => (Some(time.to_string()), None, false),
        };

        let mut state = self.lock();
        let mut jobs = self.load_locked(&mut state);

        let id = state.next_id;
        state.next_id += 1;

        let mut job = Job {
            id,
            action: new_job.action,
            schedule_time,
            interval_minutes,
            daily,
            created_at: now,
            last_run: None,
            next_run: None,
            status: JobStatus::Scheduled,
        };
        job.set_next_run(Some(next_run));

        info!(
            "Scheduled {} job {} ({}), next run {}",
            job.job_type(),
            id,
            recurrence.describe(),
            next_run
        );
        jobs.push(job);
        self.store.save(&jobs);

        Ok(id)
    }

    pub fn jobs(&self) -> Vec<Job> {
        let mut state = self.lock();
        self.load_locked(&mut state)
    }

    pub fn get_job(&self, id: u64) -> Option<Job> {
        self.jobs().into_iter().find(|job| job.id == id)
    }

    /// Remove jobs by id, reporting the ids that didn't exist
    pub fn remove_jobs(&self, ids: &[u64]) -> RemoveReport {
        let mut state = self.lock();
        let mut jobs = self.load_locked(&mut state);
        let mut report = RemoveReport::default();

        for &id in ids {
            match jobs.iter().position(|job| job.id == id) {
                Some(index) => {
                    jobs.remove(index);
                    report.removed.push(id);
                }
                None => report.not_found.push(id),
            }
        }

        if !report.removed.is_empty() {
            self.store.save(&jobs);
            info!("Removed jobs {:?}", report.removed);
        }

        report
    }

    /// Remove every job. Returns how many were removed.
    pub fn clear_all_jobs(&self) -> usize {
        let mut state = self.lock();
        let jobs = self.load_locked(&mut state);

        self.store.save(&[]);
        info!("Cleared {} jobs", jobs.len());

        jobs.len()
    }

    /// The job list as a table, times shown in the reference timezone
    pub fn list_jobs(&self) -> String {
        self.list_jobs_at(Utc::now())
    }

    pub fn list_jobs_at(&self, now: DateTime<Utc>) -> String {
        self.render_table(&self.jobs(), now)
    }

    fn render_table(&self, jobs: &[Job], now: DateTime<Utc>) -> String {
        if jobs.is_empty() {
            return "No scheduled jobs".to_owned();
        }

        let rows: Vec<[String; 5]> = jobs
            .iter()
            .map(|job| {
                [
                    job.id.to_string(),
                    job.job_type().to_string(),
                    job.describe_schedule(),
                    self.describe_next_run(job, now),
                    job.status.to_string(),
                ]
            })
            .collect();

        let headers = ["ID", "Type", "Schedule", "Next Run", "Status"];
        let mut widths = headers.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let format_row = |cells: &[String]| {
            cells
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_owned()
        };

        let mut lines = Vec::with_capacity(rows.len() + 4);
        lines.push(format_row(&headers.map(str::to_owned)));
        lines.push("-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
        lines.extend(rows.iter().map(|row| format_row(row)));

        let finished = jobs.iter().filter(|job| job.status.is_terminal()).count();
        lines.push(String::new());
        lines.push(format!(
            "{} jobs ({} active, {} finished)",
            jobs.len(),
            jobs.len() - finished,
            finished
        ));

        lines.join("\n")
    }

    fn describe_next_run(&self, job: &Job, now: DateTime<Utc>) -> String {
        match job.next_run_state() {
            NextRun::Absent => "N/A".to_owned(),
            NextRun::Invalid(_) => "Invalid".to_owned(),
            NextRun::At(next) => {
                let local = self.policy.to_local(next).format("%Y-%m-%d %H:%M");
                if job.is_due(now) {
                    format!("{} (DUE)", local)
                } else {
                    local.to_string()
                }
            }
        }
    }

    // ========================================
    // Execution
    // ========================================

    /// Run a job now and record the outcome. Returns the job's new status,
    /// or None if there is no such job.
    pub fn execute_job(&self, id: u64) -> Option<JobStatus> {
        self.execute_job_at(id, Utc::now())
    }

    pub fn execute_job_at(&self, id: u64, now: DateTime<Utc>) -> Option<JobStatus> {
        let (action, recurrence) = {
            let mut state = self.lock();
            let mut jobs = self.load_locked(&mut state);
            let job = jobs.iter_mut().find(|job| job.id == id)?;

            job.status = JobStatus::Running;
            job.last_run = Some(now);
            let claimed = (job.action.clone(), job.recurrence());
            self.store.save(&jobs);
            claimed
        };

        info!("Executing {} job {}", action.job_type(), id);
        let outcome = self.run_handler(&action);

        let mut state = self.lock();
        let mut jobs = self.load_locked(&mut state);
        let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
            warn!("Job {} was removed while it was running", id);
            return None;
        };

        match outcome {
            Ok(()) => {
                let following = match &recurrence {
                    Some(recurrence) => self.policy.following_run(recurrence, now),
                    None => Ok(None),
                };
                match following {
                    Ok(Some(next)) => {
                        job.status = JobStatus::Scheduled;
                        job.set_next_run(Some(next));
                        info!("Job {} completed, next run {}", id, next);
                    }
                    Ok(None) => {
                        job.status = JobStatus::Completed;
                        job.set_next_run(None);
                        info!("Job {} completed", id);
                    }
                    Err(e) => {
                        job.status = JobStatus::Failed;
                        error!("Job {} ran but could not be rescheduled: {}", id, e);
                    }
                }
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                error!("Job {} ({}) failed: {}", id, action.job_type(), e);
            }
        }

        let status = job.status;
        self.store.save(&jobs);
        Some(status)
    }

    /// Call the handler, turning a panic into an error so the job is marked
    /// failed and the worker thread keeps serving the queue
    fn run_handler(&self, action: &JobAction) -> Result<(), GodToolError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(action))).unwrap_or_else(
            |payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                Err(GodToolError::Error(format!(
                    "{} handler panicked: {}",
                    action.job_type(),
                    message
                )))
            },
        )
    }

    /// Mark every due job `running` and return their ids. A claimed job is
    /// not due again until it is executed or released.
    pub fn claim_due_jobs(&self, now: DateTime<Utc>) -> Vec<u64> {
        let _tmr = timer!(Level::Trace; "JobScheduler::claim_due_jobs");

        let mut state = self.lock();
        let mut jobs = self.load_locked(&mut state);
        let mut claimed = Vec::new();

        for job in jobs.iter_mut() {
            if job.status != JobStatus::Scheduled {
                continue;
            }
            if let NextRun::Invalid(text) = job.next_run_state() {
                warn!("Job {} has an invalid next run time '{}'; skipping", job.id, text);
                continue;
            }
            if job.recurrence().is_none() {
                continue;
            }
            if job.is_due(now) {
                job.status = JobStatus::Running;
                claimed.push(job.id);
            }
        }

        if !claimed.is_empty() {
            self.store.save(&jobs);
        }

        claimed
    }

    /// Return a claimed job that was never started to `scheduled`
    pub fn release_job(&self, id: u64) {
        let mut state = self.lock();
        let mut jobs = self.load_locked(&mut state);

        if let Some(job) = jobs
            .iter_mut()
            .find(|job| job.id == id && job.status == JobStatus::Running)
        {
            job.status = JobStatus::Scheduled;
            self.store.save(&jobs);
        }
    }

    pub fn running_job_ids(&self) -> Vec<u64> {
        self.jobs()
            .iter()
            .filter(|job| job.status == JobStatus::Running)
            .map(|job| job.id)
            .collect()
    }

    /// Jobs left `running` by a daemon that stopped mid-run go back to
    /// `scheduled`. Returns how many were recovered.
    pub fn recover_interrupted(&self) -> usize {
        let mut state = self.lock();
        let mut jobs = self.load_locked(&mut state);
        let mut recovered = 0;

        for job in jobs.iter_mut().filter(|job| job.status == JobStatus::Running) {
            job.status = JobStatus::Scheduled;
            warn!("Job {} was interrupted; rescheduling", job.id);
            recovered += 1;
        }

        if recovered > 0 {
            self.store.save(&jobs);
        }

        recovered
    }

    // ========================================
    // Locking
    // ========================================

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // The state is a plain counter, valid even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_locked(&self, state: &mut SchedulerState) -> Vec<Job> {
        let jobs = self.store.load();
        state.next_id = state.next_id.max(next_free_id(&jobs));
        jobs
    }
}

fn next_free_id(jobs: &[Job]) -> u64 {
    jobs.iter().map(|job| job.id).max().map_or(1, |max| max + 1)
}
