use super::driver::{FrameOutput, PipelineDriver, StepOutcome, StopHandle};
use super::report::SessionReport;
use crate::error::{Result, SessionError};

use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info};

/// Consumer side of a session running on a blocking worker
pub struct SessionHandle {
    frames: mpsc::Receiver<FrameOutput>,
    stop: StopHandle,
    task: JoinHandle<Result<SessionReport>>,
}

impl SessionHandle {
    /// Next annotated frame, or `None` once the session has ended
    pub async fn recv(&mut self) -> Option<FrameOutput> {
        self.frames.recv().await
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Wait for the worker and return its report. Frames not yet received
    /// are discarded, which also stops the pipeline at its next send.
    pub async fn join(self) -> Result<SessionReport> {
        drop(self.frames);
        self.task.await.map_err(|e| SessionError::Worker {
            details: e.to_string(),
        })?
    }
}

/// Move a started driver onto a blocking worker that streams every frame
/// through a bounded channel
pub fn spawn_session(driver: PipelineDriver, channel_capacity: usize) -> Result<SessionHandle> {
    if !driver.is_running() {
        return Err(SessionError::NotRunning.into());
    }

    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let stop = driver.stop_handle();

    let task = task::spawn_blocking(move || run_to_completion(driver, tx));

    Ok(SessionHandle {
        frames: rx,
        stop,
        task,
    })
}

fn run_to_completion(
    mut driver: PipelineDriver,
    tx: mpsc::Sender<FrameOutput>,
) -> Result<SessionReport> {
    debug!("Session worker started");
    loop {
        match driver.step()? {
            StepOutcome::Frame(output) => {
                if tx.blocking_send(output).is_err() {
                    info!("Frame consumer went away, stopping session");
                    return driver.stop();
                }
            }
            StepOutcome::Finished(report) => return Ok(report),
        }
    }
}
