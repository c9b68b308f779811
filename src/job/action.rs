use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::GodToolError;

use super::job_type::JobType;

/// What a job does when it runs: one variant per job type, each carrying
/// the arguments its handler needs.
///
/// Stored adjacently tagged so the file reads
/// `{"type": "rename", "args": {"path": "...", "prefix": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "kebab-case")]
pub enum JobAction {
    Rename {
        path: PathBuf,
        prefix: String,
    },
    #[serde(alias = "yt")]
    Download {
        url: String,
        #[serde(default = "JobAction::default_download_path")]
        path: PathBuf,
    },
    #[serde(alias = "pdfmerge")]
    Merge {
        path: PathBuf,
        #[serde(default = "JobAction::default_merge_output")]
        output: String,
    },
    #[serde(alias = "sortemail")]
    SortEmail { sender: String },
    Fetch {
        url: String,
        #[serde(default = "JobAction::default_fetch_lines")]
        lines: usize,
    },
}

/// Loose, optional arguments as they arrive from the command line
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    pub path: Option<PathBuf>,
    pub prefix: Option<String>,
    pub url: Option<String>,
    pub output: Option<String>,
    pub sender: Option<String>,
    pub lines: Option<usize>,
}

impl JobAction {
    pub const DEFAULT_MERGE_OUTPUT: &str = "merged.pdf";
    pub const DEFAULT_FETCH_LINES: usize = 20;

    fn default_download_path() -> PathBuf {
        PathBuf::from(".")
    }

    fn default_merge_output() -> String {
        Self::DEFAULT_MERGE_OUTPUT.to_owned()
    }

    fn default_fetch_lines() -> usize {
        Self::DEFAULT_FETCH_LINES
    }

    /// Build a typed action, checking that the arguments the job type needs are present
    pub fn from_args(job_type: JobType, args: ActionArgs) -> Result<Self, GodToolError> {
        let action = match job_type {
            JobType::Rename => match (args.path, non_empty(args.prefix)) {
                (Some(path), Some(prefix)) => JobAction::Rename { path, prefix },
                _ => {
                    return Err(GodToolError::Validation(
                        "Rename job requires --path and --prefix arguments".into(),
                    ))
                }
            },
            JobType::Download => {
                let url = non_empty(args.url).ok_or_else(|| {
                    GodToolError::Validation("YouTube job requires --url argument".into())
                })?;
                JobAction::Download {
                    url,
                    path: args.path.unwrap_or_else(Self::default_download_path),
                }
            }
            JobType::Merge => {
                let path = args.path.ok_or_else(|| {
                    GodToolError::Validation("PDF merge job requires --path argument".into())
                })?;
                JobAction::Merge {
                    path,
                    output: non_empty(args.output).unwrap_or_else(Self::default_merge_output),
                }
            }
            JobType::SortEmail => {
                let sender = non_empty(args.sender).ok_or_else(|| {
                    GodToolError::Validation("Email sort job requires --sender argument".into())
                })?;
                JobAction::SortEmail { sender }
            }
            JobType::Fetch => {
                let url = non_empty(args.url).ok_or_else(|| {
                    GodToolError::Validation("Web fetch job requires --url argument".into())
                })?;
                JobAction::Fetch {
                    url,
                    lines: args.lines.unwrap_or(Self::DEFAULT_FETCH_LINES),
                }
            }
        };

        Ok(action)
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobAction::Rename { .. } => JobType::Rename,
            JobAction::Download { .. } => JobType::Download,
            JobAction::Merge { .. } => JobType::Merge,
            JobAction::SortEmail { .. } => JobType::SortEmail,
            JobAction::Fetch { .. } => JobType::Fetch,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
