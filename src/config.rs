use std::fs;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const DEFAULT_LEVEL: &str = "info";
    const DEFAULT_DIR: &str = "logs";

    fn ensure_valid(&mut self) {
        let str_original = self.level.clone();
        self.level = self.level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.level.as_str()) {
            eprintln!(
                "Config error: log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::DEFAULT_LEVEL
            );
            self.level = Self::DEFAULT_LEVEL.to_owned();
        }

        if self.dir.trim().is_empty() {
            self.dir = Self::DEFAULT_DIR.to_owned();
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Self::DEFAULT_LEVEL.to_string(),
            dir: Self::DEFAULT_DIR.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchedulerConfig {
    pub jobs_file: String,
    pub poll_interval_secs: u64,
    pub worker_threads: usize,
    pub queue_capacity: usize,
    /// Offset of the reference timezone that `HH:MM` schedule times are read in
    pub utc_offset_minutes: i32,
    pub catch_up_window_minutes: i64,
    pub catch_up_delay_secs: i64,
}

impl SchedulerConfig {
    const JOBS_FILE: &str = "config/scheduled_jobs.json";
    const POLL_INTERVAL_SECS: u64 = 5;
    const WORKER_THREADS: usize = 4;
    const QUEUE_CAPACITY: usize = 16;
    const UTC_OFFSET_MINUTES: i32 = 330; // IST
    const CATCH_UP_WINDOW_MINUTES: i64 = 180;
    const CATCH_UP_DELAY_SECS: i64 = 30;
    const MAX_CATCH_UP_WINDOW_MINUTES: i64 = 24 * 60;
    const MAX_CATCH_UP_DELAY_SECS: i64 = 24 * 60 * 60;

    fn ensure_valid(&mut self) {
        if self.jobs_file.trim().is_empty() {
            eprintln!(
                "Config error: jobs_file is empty - using default of '{}'",
                Self::JOBS_FILE
            );
            self.jobs_file = Self::JOBS_FILE.to_owned();
        }

        if self.poll_interval_secs == 0 {
            eprintln!(
                "Config error: poll_interval_secs must be positive - using default of {}",
                Self::POLL_INTERVAL_SECS
            );
            self.poll_interval_secs = Self::POLL_INTERVAL_SECS;
        }

        if self.worker_threads == 0 {
            eprintln!(
                "Config error: worker_threads must be positive - using default of {}",
                Self::WORKER_THREADS
            );
            self.worker_threads = Self::WORKER_THREADS;
        }

        if self.queue_capacity == 0 {
            eprintln!(
                "Config error: queue_capacity must be positive - using default of {}",
                Self::QUEUE_CAPACITY
            );
            self.queue_capacity = Self::QUEUE_CAPACITY;
        }

        // chrono::FixedOffset rejects offsets of a full day or more
        if self.utc_offset_minutes.unsigned_abs() >= 24 * 60 {
            eprintln!(
                "Config error: utc_offset_minutes of {} is out of range - using default of {}",
                self.utc_offset_minutes,
                Self::UTC_OFFSET_MINUTES
            );
            self.utc_offset_minutes = Self::UTC_OFFSET_MINUTES;
        }

        if !(0..=Self::MAX_CATCH_UP_WINDOW_MINUTES).contains(&self.catch_up_window_minutes) {
            eprintln!(
                "Config error: catch_up_window_minutes must be between 0 and {} - using default of {}",
                Self::MAX_CATCH_UP_WINDOW_MINUTES,
                Self::CATCH_UP_WINDOW_MINUTES
            );
            self.catch_up_window_minutes = Self::CATCH_UP_WINDOW_MINUTES;
        }

        if !(0..=Self::MAX_CATCH_UP_DELAY_SECS).contains(&self.catch_up_delay_secs) {
            eprintln!(
                "Config error: catch_up_delay_secs must be between 0 and {} - using default of {}",
                Self::MAX_CATCH_UP_DELAY_SECS,
                Self::CATCH_UP_DELAY_SECS
            );
            self.catch_up_delay_secs = Self::CATCH_UP_DELAY_SECS;
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            jobs_file: Self::JOBS_FILE.to_owned(),
            poll_interval_secs: Self::POLL_INTERVAL_SECS,
            worker_threads: Self::WORKER_THREADS,
            queue_capacity: Self::QUEUE_CAPACITY,
            utc_offset_minutes: Self::UTC_OFFSET_MINUTES,
            catch_up_window_minutes: Self::CATCH_UP_WINDOW_MINUTES,
            catch_up_delay_secs: Self::CATCH_UP_DELAY_SECS,
        }
    }
}

/// IMAP account used by e-mail sorting jobs
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmailConfig {
    pub imap_server: String,
    pub imap_port: u16,
    pub username: String,
    pub password: String,
    pub inbox_folder: String,
    pub sorted_folder: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            imap_server: String::new(),
            imap_port: 993,
            username: String::new(),
            password: String::new(),
            inbox_folder: "INBOX".to_owned(),
            sorted_folder: "Sorted".to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DownloadConfig {
    pub binary: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            binary: "yt-dlp".to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FetchConfig {
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig { timeout_secs: 10 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub email: EmailConfig,
    pub download: DownloadConfig,
    pub fetch: FetchConfig,
}

impl Config {
    const ENV_PREFIX: &str = "GODTOOL_";

    /// Loads the configuration from a TOML file, with `GODTOOL_` environment
    /// variables layered on top (`GODTOOL_SCHEDULER__POLL_INTERVAL_SECS=10`).
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(config_path: &Path) -> Self {
        let default_config = Config::default();

        // If the config file doesn't exist, write the default configuration to disk.
        if !config_path.exists() {
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.scheduler.ensure_valid();
    }
}
