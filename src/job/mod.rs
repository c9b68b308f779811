mod action;
mod job_status;
mod job_type;

pub use action::{ActionArgs, JobAction};
pub use job_status::JobStatus;
pub use job_type::JobType;
