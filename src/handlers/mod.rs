mod download;
mod email;
mod fetch;
mod merge;
mod ops_handler;
mod rename;
mod traits;

pub use download::download_video;
pub use email::sort_emails_by_sender;
pub use fetch::{fetch_page, render_page};
pub use merge::merge_pdfs;
pub use ops_handler::OpsHandler;
pub use rename::rename_files;
pub use traits::JobHandler;

#[cfg(test)]
pub use traits::test_support;
