mod cli;
mod config;
mod daemon;
mod error;
mod handlers;
mod job;
mod job_store;
mod jobs;
mod scheduler;
mod schedules;

use cli::Cli;
use error::GodToolError;

fn main() {
    if let Err(err) = Cli::handle_command_line() {
        match err {
            // Rejected input is reported like any other command output
            GodToolError::Validation(msg) => println!("Error: {}", msg),
            err => eprintln!("{}", err),
        }
        std::process::exit(1);
    }
}
