use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A background job executed on a fixed interval by the [`Scheduler`].
/// One run must finish before the next sleep starts, so ticks never overlap.
///
/// [`Scheduler`]: crate::scheduler::Scheduler
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<()>;
}
