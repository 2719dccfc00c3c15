use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::capture::CaptureGuard;
use super::loop_worker::{detection_loop, DetectionJob};

/// Owns the detection loop task of one agent.
pub struct DetectionRunner {
    handle: Option<JoinHandle<Option<CaptureGuard>>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionRunner {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    /// True while the loop task is alive. A loop that ended on its own
    /// (capture lost) reports false even before it is joined.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(&mut self, job: DetectionJob) -> Result<()> {
        if self.handle.is_some() {
            bail!("detection already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(detection_loop(job, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop, waits for it to exit, then releases the capture.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let capture = handle
            .await
            .context("detection loop task failed to join")?;
        if let Some(capture) = capture {
            capture.release();
            info!("capture released after detection loop exit");
        }
        Ok(())
    }
}

impl Default for DetectionRunner {
    fn default() -> Self {
        Self::new()
    }
}
