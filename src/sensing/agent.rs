//! The capture agent: the only owner of a capture stream inside its page.
//!
//! An agent answers commands arriving over the bus, runs at most one
//! detection loop, and pushes every detection back as a fire-and-forget
//! event. It never touches controller state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::browser::PageSurface;
use crate::classifier::FallbackClassifier;
use crate::messaging::{
    AgentCommand, AgentEvent, AgentFailure, AgentReply, AgentStatus, CommandEnvelope, MessageBus,
};
use crate::models::ContextId;

use super::capture::{CaptureDevice, CaptureError, CaptureGuard};
use super::loop_worker::{DetectionJob, DetectionTally, CAPTURE_TIMEOUT, DETECTION_INTERVAL, HOURLY_WINDOW};
use super::runner::DetectionRunner;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub detection_interval: Duration,
    pub capture_timeout: Duration,
    pub hourly_window: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            detection_interval: DETECTION_INTERVAL,
            capture_timeout: CAPTURE_TIMEOUT,
            hourly_window: HOURLY_WINDOW,
        }
    }
}

/// What every injected agent is built from.
#[derive(Clone)]
pub struct AgentDeps {
    pub device: Arc<dyn CaptureDevice>,
    pub classifier: Arc<FallbackClassifier>,
    pub config: AgentConfig,
}

pub struct CaptureAgent {
    context: ContextId,
    bus: MessageBus,
    deps: AgentDeps,
    surface: PageSurface,
    runner: DetectionRunner,
    tally: watch::Receiver<DetectionTally>,
}

impl CaptureAgent {
    /// Registers the agent's listener and starts serving commands.
    ///
    /// The listener is attached before this returns, so a command sent right
    /// after injection finds a receiver.
    pub fn spawn(
        context: ContextId,
        bus: MessageBus,
        deps: AgentDeps,
        surface: PageSurface,
        teardown: CancellationToken,
    ) -> JoinHandle<()> {
        let commands = bus.attach_listener(context);
        let (_, tally) = watch::channel(DetectionTally::default());

        let agent = Self {
            context,
            bus,
            deps,
            surface,
            runner: DetectionRunner::new(),
            tally,
        };
        tokio::spawn(agent.run(commands, teardown))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<CommandEnvelope>,
        teardown: CancellationToken,
    ) {
        log_info!("capture agent ready in {}", self.context);

        let torn_down = loop {
            tokio::select! {
                _ = teardown.cancelled() => break true,
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break false };
                    let result = self.handle_command(envelope.command).await;
                    // The sender may have given up waiting; nothing to do then.
                    let _ = envelope.reply.send(result);
                }
            }
        };

        let was_detecting = self.runner.is_running();
        self.stop_detection().await;
        drop(commands);
        self.bus.prune_listener(self.context);

        if torn_down && was_detecting {
            self.bus.emit_event(AgentEvent::CaptureLost {
                context: self.context,
                reason: "page context torn down".into(),
            });
        }
        log_info!("capture agent in {} exited", self.context);
    }

    async fn handle_command(&mut self, command: AgentCommand) -> Result<AgentReply, AgentFailure> {
        match command {
            AgentCommand::StartSession => self.start_detection().await.map(|()| AgentReply::Started),
            AgentCommand::StopSession => {
                self.stop_detection().await;
                Ok(AgentReply::Stopped)
            }
            AgentCommand::GetStatus => Ok(AgentReply::Status(self.status())),
        }
    }

    async fn start_detection(&mut self) -> Result<(), AgentFailure> {
        if self.runner.is_running() {
            log_info!("already detecting in {}, keeping the running loop", self.context);
            return Ok(());
        }
        // Join a loop that ended on its own before starting a fresh one.
        if let Err(err) = self.runner.stop().await {
            log_warn!("stale detection loop in {} failed to join: {err:?}", self.context);
        }

        let stream = self.deps.device.open().await.map_err(|err| match err {
            CaptureError::PermissionDenied(reason) => AgentFailure::PermissionDenied(reason),
            other => AgentFailure::CaptureUnavailable(other.to_string()),
        })?;
        let capture = CaptureGuard::new(stream);

        let (tally_tx, tally_rx) = watch::channel(DetectionTally::default());
        self.tally = tally_rx;
        self.surface.mount_overlay();

        let config = self.deps.config;
        let job = DetectionJob {
            context: self.context,
            capture,
            classifier: Arc::clone(&self.deps.classifier),
            bus: self.bus.clone(),
            surface: self.surface.clone(),
            tally: tally_tx,
            interval: config.detection_interval,
            capture_timeout: config.capture_timeout,
            hourly_window: config.hourly_window,
        };

        self.runner.start(job).map_err(|err| {
            self.surface.remove_overlay();
            AgentFailure::CaptureUnavailable(err.to_string())
        })
    }

    /// Loop first, then the capture, then the overlay.
    async fn stop_detection(&mut self) {
        if let Err(err) = self.runner.stop().await {
            log_error!("detection loop in {} did not stop cleanly: {err:?}", self.context);
        }
        self.surface.remove_overlay();
    }

    fn status(&self) -> AgentStatus {
        let tally = self.tally.borrow().clone();
        AgentStatus {
            is_detecting: self.runner.is_running(),
            last_detection: tally.last,
            total_detections: tally.total,
            hourly_count: tally.hourly,
        }
    }
}
