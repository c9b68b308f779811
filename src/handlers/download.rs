use std::path::Path;
use std::process::Command;

use log::{debug, info};

use crate::error::GodToolError;

/// Download a video by running the external `yt-dlp` program
pub fn download_video(binary: &str, url: &str, dir: &Path) -> Result<(), GodToolError> {
    let clean_url = clean_url(url);
    let output_template = dir.join("%(title)s.%(ext)s");

    let mut command = Command::new(binary);
    command
        .arg("-f")
        .arg("best")
        .arg("-o")
        .arg(&output_template)
        .arg(&clean_url);
    debug!("Running {:?}", command);

    info!("Downloading video {}", clean_url);
    let status = command.status().map_err(|e| {
        GodToolError::Error(format!("Failed to run '{}': {}", binary, e))
    })?;

    if !status.success() {
        return Err(GodToolError::Error(format!(
            "'{}' exited with {} while downloading {}",
            binary, status, clean_url
        )));
    }

    info!("Downloaded to {}", dir.display());
    Ok(())
}

/// URLs pasted from shells often carry escaping backslashes
fn clean_url(url: &str) -> String {
    url.trim().replace('\\', "")
}
