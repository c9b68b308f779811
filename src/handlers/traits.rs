use crate::error::GodToolError;
use crate::job::JobAction;

/// Performs the side effect a job's action describes
///
/// The scheduler only knows jobs through this trait, so it can be driven by
/// a recording handler in tests. Handlers are shared across worker threads.
pub trait JobHandler: Send + Sync {
    fn handle(&self, action: &JobAction) -> Result<(), GodToolError>;
}
