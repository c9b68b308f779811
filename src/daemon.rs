use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn, Level};
use logging_timer::timer;
use threadpool::ThreadPool;

use crate::config::SchedulerConfig;
use crate::error::GodToolError;
use crate::scheduler::JobScheduler;

/// The long-running poll loop behind `schedule start`.
///
/// Each poll claims the jobs that are due and queues their ids for a fixed
/// pool of worker threads. The queue is bounded; a job that doesn't fit is
/// released and picked up again by a later poll.
pub struct Daemon {
    scheduler: Arc<JobScheduler>,
    poll_interval: Duration,
    worker_threads: usize,
    queue_capacity: usize,
}

impl Daemon {
    pub fn new(scheduler: Arc<JobScheduler>, config: &SchedulerConfig) -> Self {
        Daemon {
            scheduler,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            worker_threads: config.worker_threads,
            queue_capacity: config.queue_capacity,
        }
    }

    /// Run until SIGINT or SIGTERM
    pub fn run(&self) -> Result<(), GodToolError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        runtime.spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(());

            // A second signal skips waiting for running jobs. They are
            // recovered the next time the daemon starts.
            shutdown_signal().await;
            warn!("Second stop signal received; exiting without waiting for running jobs");
            std::process::exit(130);
        });

        println!("Scheduler daemon started. Press Ctrl+C to stop.");
        self.run_until(shutdown_rx);
        println!("Scheduler daemon stopped.");

        runtime.shutdown_background();
        Ok(())
    }

    /// Run until `shutdown` receives a message or is disconnected
    pub fn run_until(&self, shutdown: Receiver<()>) {
        let recovered = self.scheduler.recover_interrupted();
        if recovered > 0 {
            info!("Recovered {} interrupted jobs", recovered);
        }

        let (sender, receiver) = bounded::<u64>(self.queue_capacity);
        let pool = ThreadPool::new(self.worker_threads);

        for _ in 0..self.worker_threads {
            let receiver = receiver.clone();
            let scheduler = Arc::clone(&self.scheduler);

            pool.execute(move || {
                while let Ok(job_id) = receiver.recv() {
                    scheduler.execute_job(job_id);
                }
            });
        }

        info!(
            "Daemon started: polling every {:?} with {} workers",
            self.poll_interval, self.worker_threads
        );

        let ticker = tick(self.poll_interval);
        self.poll_once(&sender, Utc::now());

        loop {
            select! {
                recv(ticker) -> _ => self.poll_once(&sender, Utc::now()),
                recv(shutdown) -> _ => break,
            }
        }

        info!("Daemon stopping");

        // Queued jobs that no worker has started yet go back to scheduled
        for job_id in receiver.try_iter() {
            self.scheduler.release_job(job_id);
        }

        let running = self.scheduler.running_job_ids();
        if !running.is_empty() {
            info!("Waiting for running jobs {:?}", running);
            println!(
                "Waiting for {} running jobs to finish. Press Ctrl+C again to exit now.",
                running.len()
            );
        }

        // Workers exit once the queue is closed; wait for in-flight jobs
        drop(sender);
        drop(receiver);
        pool.join();

        info!("Daemon stopped");
    }

    fn poll_once(&self, sender: &Sender<u64>, now: DateTime<Utc>) {
        let _tmr = timer!(Level::Trace; "Daemon::poll_once");

        for job_id in self.scheduler.claim_due_jobs(now) {
            match sender.try_send(job_id) {
                Ok(()) => debug!("Queued job {}", job_id),
                Err(TrySendError::Full(job_id)) => {
                    warn!("Worker queue is full; deferring job {}", job_id);
                    self.scheduler.release_job(job_id);
                }
                Err(TrySendError::Disconnected(job_id)) => {
                    error!("Worker queue is closed; releasing job {}", job_id);
                    self.scheduler.release_job(job_id);
                }
            }
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
