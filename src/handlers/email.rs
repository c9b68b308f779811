use log::{debug, info, warn};

use crate::config::EmailConfig;
use crate::error::GodToolError;

/// Move every unread message from `sender` out of the inbox and into the
/// sorted folder. Returns the number of messages moved.
pub fn sort_emails_by_sender(config: &EmailConfig, sender: &str) -> Result<usize, GodToolError> {
    if config.imap_server.trim().is_empty() || config.username.trim().is_empty() {
        return Err(GodToolError::Error(
            "E-mail account is not configured: set imap_server and username in [email]".into(),
        ));
    }

    let client = imap::ClientBuilder::new(config.imap_server.as_str(), config.imap_port).connect()?;
    let mut session = client
        .login(&config.username, &config.password)
        .map_err(|(e, _)| e)?;

    session.select(&config.inbox_folder)?;

    let query = format!("UNSEEN FROM \"{}\"", sanitize(sender));
    debug!("IMAP search: {}", query);
    let mut ids: Vec<u32> = session.search(&query)?.into_iter().collect();
    ids.sort_unstable();

    if ids.is_empty() {
        info!("No unread emails from {}", sender);
        session.logout()?;
        return Ok(0);
    }

    let mut moved = 0;
    for id in &ids {
        let seq = id.to_string();

        let fetches = session.fetch(&seq, "RFC822.HEADER")?;
        let subject = fetches
            .iter()
            .filter_map(|fetch| fetch.header())
            .find_map(|header| header_value(&String::from_utf8_lossy(header), "Subject"))
            .unwrap_or_else(|| "No Subject".to_owned());
        info!("Sorting email with subject: {}", subject);

        if let Err(e) = session.copy(&seq, &config.sorted_folder) {
            warn!("Could not copy message {} to {}: {}", seq, config.sorted_folder, e);
            continue;
        }
        session.store(&seq, "+FLAGS (\\Deleted)")?;
        moved += 1;
    }

    // Sequence numbers shift on expunge, so it runs once after the loop
    session.expunge()?;
    session.logout()?;

    info!(
        "Sorted {} emails from {} into folder {}",
        moved, sender, config.sorted_folder
    );
    Ok(moved)
}

/// Quotes and backslashes would end the quoted search string early
fn sanitize(sender: &str) -> String {
    sender
        .trim()
        .chars()
        .filter(|c| *c != '"' && *c != '\\')
        .collect()
}

/// Value of the first header called `name`, unfolding continuation lines
fn header_value(headers: &str, name: &str) -> Option<String> {
    let mut lines = headers.lines().peekable();
    while let Some(line) = lines.next() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case(name) {
            continue;
        }

        let mut value = value.trim().to_owned();
        while let Some(next) = lines.peek() {
            if !next.starts_with([' ', '\t']) {
                break;
            }
            value.push(' ');
            value.push_str(next.trim());
            lines.next();
        }
        return Some(value);
    }
    None
}
