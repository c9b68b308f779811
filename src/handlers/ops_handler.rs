use std::time::Duration;

use chrono::Utc;
use log::info;

use crate::config::{Config, EmailConfig};
use crate::error::GodToolError;
use crate::job::JobAction;
use crate::schedules::SchedulePolicy;

use super::traits::JobHandler;
use super::{download_video, fetch_page, merge_pdfs, rename_files, render_page, sort_emails_by_sender};

/// Runs actions against the real world: the file system, yt-dlp, the IMAP
/// account and the network
pub struct OpsHandler {
    email: EmailConfig,
    download_binary: String,
    fetch_timeout: Duration,
    policy: SchedulePolicy,
}

impl OpsHandler {
    pub fn new(config: &Config, policy: SchedulePolicy) -> Self {
        OpsHandler {
            email: config.email.clone(),
            download_binary: config.download.binary.clone(),
            fetch_timeout: Duration::from_secs(config.fetch.timeout_secs),
            policy,
        }
    }
}

impl JobHandler for OpsHandler {
    fn handle(&self, action: &JobAction) -> Result<(), GodToolError> {
        match action {
            JobAction::Rename { path, prefix } => {
                let count = rename_files(path, prefix)?;
                info!("Renamed {} files in {}", count, path.display());
            }
            JobAction::Download { url, path } => {
                download_video(&self.download_binary, url, path)?;
            }
            JobAction::Merge { path, output } => {
                merge_pdfs(path, output)?;
            }
            JobAction::SortEmail { sender } => {
                sort_emails_by_sender(&self.email, sender)?;
            }
            JobAction::Fetch { url, lines } => {
                let page = fetch_page(url, self.fetch_timeout)?;
                let fetched_at = self
                    .policy
                    .to_local(Utc::now())
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string();
                println!("{}", render_page(&page, *lines, &fetched_at));
            }
        }

        Ok(())
    }
}
