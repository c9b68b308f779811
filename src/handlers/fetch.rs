use std::io::{self, Read};
use std::time::Duration;

use log::{debug, info, warn};
use scraper::{Html, Node, Selector};

use crate::error::GodToolError;

const USER_AGENT: &str = concat!("godtool/", env!("CARGO_PKG_VERSION"));

/// Bodies are read up to this size; the rest is dropped
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Elements whose text is never shown to a reader
const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// GET `url`, assuming https when no scheme is given. Non-2xx responses are
/// errors.
pub fn fetch_page(url: &str, timeout: Duration) -> Result<FetchedPage, GodToolError> {
    let url = with_scheme(url);
    info!("Fetching: {}", url);

    let agent = ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build();

    let response = match agent
        .get(&url)
        .set("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .call()
    {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            return Err(GodToolError::Error(format!(
                "HTTP Error {}: {}",
                code,
                response.status_text()
            )));
        }
        Err(e) => return Err(Box::new(e).into()),
    };

    let status = response.status();
    let content_type = response
        .header("content-type")
        .unwrap_or_default()
        .to_ascii_lowercase();
    let final_url = response.get_url().to_owned();
    let body = read_body(response.into_reader(), MAX_BODY_BYTES)?;
    debug!("{} returned {} bytes of {}", final_url, body.len(), content_type);

    Ok(FetchedPage {
        url: final_url,
        status,
        content_type,
        body,
    })
}

/// Format a fetched page for the terminal: a short header followed by the
/// content, pretty-printed for JSON and reduced to visible text for HTML.
/// The result holds at most `max_lines` lines of content plus header.
pub fn render_page(page: &FetchedPage, max_lines: usize, fetched_at: &str) -> String {
    let mut output = vec![
        format!("Fetch Results for: {}", page.url),
        format!("Time: {}", fetched_at),
        format!("Status: {} | Type: {}", page.status, page.content_type),
        "=".repeat(60),
        String::new(),
    ];

    let trimmed = page.body.trim_start();
    if page.content_type.contains("json") || trimmed.starts_with('{') || trimmed.starts_with('[')
    {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&page.body) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                output.push("Content Type: JSON".to_owned());
                output.push("-".repeat(30));
                return finish(output, pretty.lines(), max_lines);
            }
        }
    }

    if page.content_type.contains("html") || page.body.to_ascii_lowercase().contains("<html") {
        let document = Html::parse_document(&page.body);
        output.push("Content Type: HTML (text extracted)".to_owned());
        output.push("-".repeat(30));
        if let Some(title) = page_title(&document) {
            output.push(format!("Title: {}", title));
            output.push(String::new());
        }
        let text = visible_text(&document);
        return finish(output, text.iter().map(String::as_str), max_lines);
    }

    output.push("Content Type: Plain Text".to_owned());
    output.push("-".repeat(30));
    finish(output, page.body.lines(), max_lines)
}

fn finish<'a>(
    mut output: Vec<String>,
    content: impl Iterator<Item = &'a str>,
    max_lines: usize,
) -> String {
    let remaining = max_lines.saturating_sub(output.len());
    output.extend(content.take(remaining).map(str::to_owned));
    output.join("\n")
}

/// Read at most `limit` bytes of a response body as text
fn read_body(reader: impl Read, limit: u64) -> io::Result<String> {
    let mut bytes = Vec::new();
    reader.take(limit).read_to_end(&mut bytes)?;
    if bytes.len() as u64 == limit {
        warn!("Response body truncated to {} bytes", limit);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_owned()
    } else {
        format!("https://{}", url)
    }
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title: String = document.select(&selector).next()?.text().collect();
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_owned())
}

/// Visible text lines of the document, trimmed, skipping blank and
/// single-character lines
fn visible_text(document: &Html) -> Vec<String> {
    let mut lines = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }

        for line in text.lines() {
            let line = line.trim();
            if line.chars().count() > 1 {
                lines.push(line.to_owned());
            }
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TIME: &str = "2025-01-15 10:30:00";

    fn page(content_type: &str, body: &str) -> FetchedPage {
        FetchedPage {
            url: "https://example.com/".into(),
            status: 200,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    fn content_of(rendered: &str) -> Vec<&str> {
        rendered.lines().skip(5).collect()
    }

    #[test]
    fn test_large_bodies_are_cut_not_rejected() {
        let body = "line\n".repeat(1000);
        let read = read_body(body.as_bytes(), 12).unwrap();
        assert_eq!(read, "line\nline\nli");

        let read = read_body("short".as_bytes(), MAX_BODY_BYTES).unwrap();
        assert_eq!(read, "short");
    }

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("example.com"), "https://example.com");
        assert_eq!(with_scheme(" http://example.com "), "http://example.com");
    }

    #[test]
    fn test_header() {
        let rendered = render_page(&page("text/plain", "hello"), 20, TIME);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Fetch Results for: https://example.com/");
        assert_eq!(lines[1], "Time: 2025-01-15 10:30:00");
        assert_eq!(lines[2], "Status: 200 | Type: text/plain");
        assert_eq!(lines[3], "=".repeat(60));
    }

    #[test]
    fn test_json_is_pretty_printed() {
        let rendered = render_page(&page("application/json", r#"{"ok":true}"#), 20, TIME);
        assert_eq!(
            content_of(&rendered),
            vec!["Content Type: JSON", &"-".repeat(30), "{", "  \"ok\": true", "}"]
        );
    }

    #[test]
    fn test_json_detected_without_content_type() {
        let rendered = render_page(&page("", "[1, 2]"), 20, TIME);
        assert!(rendered.contains("Content Type: JSON"));
    }

    #[test]
    fn test_invalid_json_falls_back_to_plain_text() {
        let rendered = render_page(&page("application/json", "{not json"), 20, TIME);
        assert!(rendered.contains("Content Type: Plain Text"));
        assert!(rendered.ends_with("{not json"));
    }

    #[test]
    fn test_html_visible_text() {
        let html = r#"<html>
            <head><title> Status Page </title><style>body { color: red; }</style></head>
            <body>
              <h1>All systems go</h1>
              <script>var hidden = "no";</script>
              <p>x</p>
              <p>Last checked today</p>
            </body>
        </html>"#;
        let rendered = render_page(&page("text/html; charset=utf-8", html), 40, TIME);
        let content = content_of(&rendered);

        assert_eq!(content[0], "Content Type: HTML (text extracted)");
        assert_eq!(content[2], "Title: Status Page");
        assert!(content.contains(&"All systems go"));
        assert!(content.contains(&"Last checked today"));
        assert!(!rendered.contains("hidden"));
        assert!(!rendered.contains("color: red"));
        assert!(!content.contains(&"x"));
    }

    #[test]
    fn test_output_is_truncated_to_max_lines() {
        let body: String = (1..=100).map(|i| format!("line {}\n", i)).collect();
        let rendered = render_page(&page("text/plain", &body), 10, TIME);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 10);
        assert_eq!(lines[7], "line 1");
        assert_eq!(lines[9], "line 3");
    }
}
