use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Job type enum - which handler a job is dispatched to
///
/// Serialized as kebab-case strings in the store file. The command line
/// accepts the short names the direct commands use (`yt`, `pdfmerge`,
/// `sortemail`) as well as the stored names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Rename,
    #[value(name = "yt", alias = "download")]
    #[serde(alias = "yt")]
    Download,
    #[value(name = "pdfmerge", alias = "merge")]
    #[serde(alias = "pdfmerge")]
    Merge,
    #[value(name = "sortemail", alias = "sort-email")]
    #[serde(alias = "sortemail")]
    SortEmail,
    Fetch,
}

impl JobType {
    pub fn full_name(&self) -> &'static str {
        match self {
            JobType::Rename => "rename",
            JobType::Download => "download",
            JobType::Merge => "merge",
            JobType::SortEmail => "sort-email",
            JobType::Fetch => "fetch",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_full_name() {
        assert_eq!(JobType::Rename.full_name(), "rename");
        assert_eq!(JobType::Download.full_name(), "download");
        assert_eq!(JobType::Merge.full_name(), "merge");
        assert_eq!(JobType::SortEmail.full_name(), "sort-email");
        assert_eq!(JobType::Fetch.full_name(), "fetch");
    }

    #[test]
    fn test_job_type_display_matches_serde() {
        for job_type in JobType::value_variants() {
            let json = serde_json::to_string(job_type).unwrap();
            assert_eq!(json, format!("\"{}\"", job_type));
        }
    }

    #[test]
    fn test_job_type_accepts_command_names() {
        assert_eq!(JobType::from_str("yt", true), Ok(JobType::Download));
        assert_eq!(JobType::from_str("download", true), Ok(JobType::Download));
        assert_eq!(JobType::from_str("pdfmerge", true), Ok(JobType::Merge));
        assert_eq!(JobType::from_str("sortemail", true), Ok(JobType::SortEmail));
        assert_eq!(JobType::from_str("sort-email", true), Ok(JobType::SortEmail));
        assert!(JobType::from_str("nope", true).is_err());
    }

    #[test]
    fn test_job_type_legacy_names_deserialize() {
        let restored: JobType = serde_json::from_str("\"yt\"").unwrap();
        assert_eq!(restored, JobType::Download);
        let restored: JobType = serde_json::from_str("\"sortemail\"").unwrap();
        assert_eq!(restored, JobType::SortEmail);
    }
}
