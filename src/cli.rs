use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use flexi_logger::{detailed_format, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{debug, info};

use crate::config::{Config, LoggingConfig};
use crate::daemon::Daemon;
use crate::error::GodToolError;
use crate::handlers::{JobHandler, OpsHandler};
use crate::job::{ActionArgs, JobAction, JobType};
use crate::job_store::JobStore;
use crate::jobs::NextRun;
use crate::scheduler::{JobScheduler, NewJob};
use crate::schedules::SchedulePolicy;

/// Jobs starting this soon get a countdown after `schedule add`
const SOON_SECS: i64 = 120;

#[derive(Parser)]
#[command(
    name = "godtool",
    version,
    about = "GodTool: automate boring digital life tasks, now or on a schedule"
)]
pub struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(long, global = true, default_value = "config/settings.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Rename every file in a directory to PREFIX_N
    Rename {
        path: PathBuf,
        prefix: String,
    },

    /// Download a video with yt-dlp
    Yt {
        url: String,
        /// Directory to download into
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Merge the PDFs in a directory into one file
    Pdfmerge {
        path: PathBuf,
        #[arg(long, default_value = JobAction::DEFAULT_MERGE_OUTPUT)]
        output: String,
    },

    /// Move unread e-mail from a sender into the sorted folder
    Sortemail { sender: String },

    /// Fetch a web page and print its content
    Fetch {
        url: String,
        /// Maximum number of lines to print
        #[arg(long, default_value_t = JobAction::DEFAULT_FETCH_LINES)]
        lines: usize,
    },

    /// Manage scheduled jobs and the scheduler daemon
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Schedule a new job
    Add(AddArgs),

    /// List scheduled jobs
    List,

    /// Remove jobs by id
    Remove {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Remove all jobs
    Clear,

    /// Run the scheduler daemon until interrupted
    Start,

    /// Explain how to stop a running daemon
    Stop,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Job type
    #[arg(long = "job", value_enum)]
    pub job_type: JobType,

    /// Time of day to run, HH:MM in the configured timezone
    #[arg(long = "time")]
    pub schedule_time: Option<String>,

    /// Run every N minutes
    #[arg(long = "interval")]
    pub interval_minutes: Option<u32>,

    /// Repeat every day at --time
    #[arg(long)]
    pub daily: bool,

    #[arg(long)]
    pub path: Option<PathBuf>,

    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub output: Option<String>,

    #[arg(long)]
    pub sender: Option<String>,

    #[arg(long)]
    pub lines: Option<usize>,
}

impl AddArgs {
    fn into_new_job(self) -> Result<NewJob, GodToolError> {
        let action = JobAction::from_args(
            self.job_type,
            ActionArgs {
                path: self.path,
                prefix: self.prefix,
                url: self.url,
                output: self.output,
                sender: self.sender,
                lines: self.lines,
            },
        )?;

        Ok(NewJob {
            action,
            schedule_time: self.schedule_time,
            interval_minutes: self.interval_minutes,
            daily: self.daily,
        })
    }
}

impl Cli {
    pub fn handle_command_line() -> Result<(), GodToolError> {
        let args = Cli::parse();
        args.run()
    }

    fn run(self) -> Result<(), GodToolError> {
        let config = Config::load_config(&self.config);
        // Logging stops when the handle is dropped
        let _logger = Self::start_logger(&config.logging)?;
        debug!("Loaded configuration from {}", self.config.display());

        let result = Self::dispatch(self.command, &config);
        // Only to the log file; main reports the error on the console
        if let Err(e) = &result {
            info!("Command failed: {:?}", e);
        }
        result
    }

    fn dispatch(command: Command, config: &Config) -> Result<(), GodToolError> {
        let policy = SchedulePolicy::from_config(&config.scheduler)?;
        let handler = Arc::new(OpsHandler::new(config, policy));

        let action = match command {
            Command::Rename { path, prefix } => JobAction::Rename { path, prefix },
            Command::Yt { url, path } => JobAction::Download { url, path },
            Command::Pdfmerge { path, output } => JobAction::Merge { path, output },
            Command::Sortemail { sender } => JobAction::SortEmail { sender },
            Command::Fetch { url, lines } => JobAction::Fetch { url, lines },
            Command::Schedule { command } => {
                let store = JobStore::new(&config.scheduler.jobs_file);
                let scheduler = Arc::new(JobScheduler::new(store, policy, handler));
                return Self::handle_schedule(command, scheduler, config);
            }
        };

        info!("Running {} now", action.job_type());
        handler.handle(&action)?;
        if action.job_type() != JobType::Fetch {
            println!("{} finished", action.job_type());
        }

        Ok(())
    }

    fn handle_schedule(
        command: ScheduleCommand,
        scheduler: Arc<JobScheduler>,
        config: &Config,
    ) -> Result<(), GodToolError> {
        match command {
            ScheduleCommand::Add(add_args) => {
                let job_type = add_args.job_type;
                let job_id = scheduler.add_job(add_args.into_new_job()?)?;
                println!("Job {} scheduled for {}", job_id, job_type);

                if let Some(job) = scheduler.get_job(job_id) {
                    if let NextRun::At(next) = job.next_run_state() {
                        let policy = scheduler.policy();
                        println!(
                            "Next run: {} (UTC{})",
                            policy.to_local(next).format("%Y-%m-%d %H:%M:%S"),
                            policy.offset()
                        );

                        let seconds = (next - Utc::now()).num_seconds();
                        if (0..=SOON_SECS).contains(&seconds) {
                            println!("Will run in {} seconds", seconds);
                        }
                    }
                }
            }
            ScheduleCommand::List => {
                println!("{}", scheduler.list_jobs());
            }
            ScheduleCommand::Remove { ids } => {
                let report = scheduler.remove_jobs(&ids);
                for id in &report.removed {
                    println!("Removed job {}", id);
                }
                for id in &report.not_found {
                    println!("Job {} not found", id);
                }
            }
            ScheduleCommand::Clear => {
                let cleared = scheduler.clear_all_jobs();
                println!("Cleared {} jobs", cleared);
            }
            ScheduleCommand::Start => {
                Daemon::new(scheduler, &config.scheduler).run()?;
            }
            ScheduleCommand::Stop => {
                println!("The scheduler daemon runs in the foreground of 'godtool schedule start'.");
                println!("Stop it with Ctrl+C in that terminal, or send it SIGTERM.");
            }
        }

        Ok(())
    }

    fn start_logger(logging: &LoggingConfig) -> Result<LoggerHandle, GodToolError> {
        let handle = Logger::try_with_env_or_str(&logging.level)?
            .log_to_file(
                FileSpec::default()
                    .directory(&logging.dir)
                    .basename("godtool")
                    .suppress_timestamp(),
            )
            .append()
            .duplicate_to_stderr(Duplicate::Warn)
            .format_for_files(detailed_format)
            .start()?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_schedule_add_parsing() {
        let cli = parse(&[
            "godtool", "schedule", "add", "--job", "yt", "--url", "https://youtu.be/abc", "--time",
            "09:00", "--daily",
        ]);

        let Command::Schedule {
            command: ScheduleCommand::Add(add_args),
        } = cli.command
        else {
            panic!("expected schedule add");
        };

        assert_eq!(add_args.job_type, JobType::Download);
        assert_eq!(add_args.schedule_time.as_deref(), Some("09:00"));
        assert!(add_args.daily);

        let new_job = add_args.into_new_job().unwrap();
        assert_eq!(
            new_job.action,
            JobAction::Download {
                url: "https://youtu.be/abc".into(),
                path: PathBuf::from(".")
            }
        );
    }

    #[test]
    fn test_job_type_names() {
        for (name, expected) in [
            ("rename", JobType::Rename),
            ("pdfmerge", JobType::Merge),
            ("merge", JobType::Merge),
            ("sortemail", JobType::SortEmail),
            ("sort-email", JobType::SortEmail),
            ("fetch", JobType::Fetch),
        ] {
            let cli = parse(&["godtool", "schedule", "add", "--job", name, "--interval", "5"]);
            let Command::Schedule {
                command: ScheduleCommand::Add(add_args),
            } = cli.command
            else {
                panic!("expected schedule add");
            };
            assert_eq!(add_args.job_type, expected);
        }

        assert!(Cli::try_parse_from(["godtool", "schedule", "add", "--job", "bogus"]).is_err());
    }

    #[test]
    fn test_missing_job_args_are_validation_errors() {
        let cli = parse(&["godtool", "schedule", "add", "--job", "rename", "--interval", "5"]);
        let Command::Schedule {
            command: ScheduleCommand::Add(add_args),
        } = cli.command
        else {
            panic!("expected schedule add");
        };

        let err = add_args.into_new_job().unwrap_err();
        assert!(matches!(err, GodToolError::Validation(_)));
    }

    #[test]
    fn test_remove_takes_several_ids() {
        let cli = parse(&["godtool", "schedule", "remove", "3", "7"]);
        assert!(matches!(
            cli.command,
            Command::Schedule { command: ScheduleCommand::Remove { ids } } if ids == vec![3, 7]
        ));

        assert!(Cli::try_parse_from(["godtool", "schedule", "remove"]).is_err());
        assert!(Cli::try_parse_from(["godtool", "schedule", "remove", "x"]).is_err());
    }

    #[test]
    fn test_direct_command_defaults() {
        let cli = parse(&["godtool", "fetch", "example.com"]);
        assert!(matches!(cli.command, Command::Fetch { lines: 20, .. }));

        let cli = parse(&["godtool", "pdfmerge", "scans"]);
        assert!(matches!(cli.command, Command::Pdfmerge { output, .. } if output == "merged.pdf"));

        let cli = parse(&["godtool", "yt", "https://youtu.be/abc"]);
        assert!(matches!(cli.command, Command::Yt { path, .. } if path == PathBuf::from(".")));
    }

    #[test]
    fn test_global_config_option() {
        let cli = parse(&["godtool", "schedule", "list"]);
        assert_eq!(cli.config, PathBuf::from("config/settings.toml"));

        let cli = parse(&["godtool", "schedule", "list", "--config", "/etc/godtool.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/godtool.toml"));
        assert!(matches!(
            cli.command,
            Command::Schedule {
                command: ScheduleCommand::List
            }
        ));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(Cli::try_parse_from(["godtool"]).is_err());
        assert!(Cli::try_parse_from(["godtool", "nonexistent-command"]).is_err());
        assert!(Cli::try_parse_from(["godtool", "rename", "photos"]).is_err());
        assert!(Cli::try_parse_from(["godtool", "schedule", "add", "--interval", "5"]).is_err());
    }
}
