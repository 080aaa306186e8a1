use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::interfaces::scheduler::ScheduledJob;

/// Runs registered jobs on their fixed intervals. A job's run always finishes
/// before its next sleep starts, so ticks never overlap. `start` is
/// idempotent; `stop` signals every loop and waits for in-flight runs.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn start(&mut self) {
        if self.shutdown.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        for job in &self.jobs {
            let job = job.clone();
            let mut rx = rx.clone();
            self.handles.push(tokio::spawn(async move {
                loop {
                    if let Err(err) = job.run().await {
                        tracing::warn!(job = job.name(), error = %err, "scheduled job run failed");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(job.interval()) => {}
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }
        self.shutdown = Some(tx);
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
            for handle in self.handles.drain(..) {
                let _ = handle.await;
            }
        }
    }
}
