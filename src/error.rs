use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GodToolError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into GodToolError automatically

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("PDF error: {0}")]
    PdfError(#[from] lopdf::Error),

    #[error("IMAP error: {0}")]
    ImapError(#[from] imap::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] Box<ureq::Error>),

    #[error("Logger error: {0}")]
    LoggerError(#[from] flexi_logger::FlexiLoggerError),

    /// Rejected user input. The CLI reports these on stdout and exits with 1
    #[error("{0}")]
    Validation(String),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
