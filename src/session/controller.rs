use std::{future, sync::Arc, time::Duration};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    aggregation::{HourlyAggregator, HourlySummary, RecentHistory},
    bootstrap::Bootstrapper,
    browser::{is_restricted_url, ContextHost},
    config::CoordinatorConfig,
    error::SessionError,
    ingest::{IngestRecord, InsightsIngest},
    messaging::{AgentCommand, AgentEvent, AgentReply, MessageBus},
    models::{ContextId, DetectionEvent, DetectionRecord, SensingSession, SessionState},
    notify::{NotificationSink, Notifier},
    settings::SettingsStore,
    ui::{UiBroadcaster, UiMessage},
};

/// `tokio::time::interval` rejects a zero period.
const MIN_ROTATION_CHECK: Duration = Duration::from_millis(1);

/// Controller's best-effort reference to an agent. Never owns its capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentHandle {
    pub context_id: ContextId,
    pub injected: bool,
    pub last_heartbeat: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: SessionState,
    pub is_detecting: bool,
    pub last_detection: Option<DetectionRecord>,
    pub total_detections: u64,
    pub hourly_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub was_active: bool,
    /// False when the agent could not be reached; the session is Idle anyway.
    pub agent_acknowledged: bool,
}

/// Everything the controller talks to.
pub struct ControllerDeps {
    pub config: CoordinatorConfig,
    pub bus: MessageBus,
    pub host: Arc<dyn ContextHost>,
    pub settings: Arc<SettingsStore>,
    pub sink: Arc<dyn NotificationSink>,
    pub ingest: Arc<dyn InsightsIngest>,
    pub ui: UiBroadcaster,
}

enum Request {
    Start(oneshot::Sender<Result<SensingSession, SessionError>>),
    Stop(oneshot::Sender<StopReport>),
    TestNotification(oneshot::Sender<()>),
    Status(oneshot::Sender<StatusReport>),
    ConfigureNotifications {
        enabled: bool,
        interval_minutes: u32,
        reply: oneshot::Sender<()>,
    },
    Shutdown(oneshot::Sender<()>),
}

enum SettingsWrite {
    SensingEnabled(bool),
    Notifications { enabled: bool, interval_minutes: u32 },
    RecentEvents(Vec<DetectionRecord>),
}

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl ControllerHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(build(reply_tx))
            .map_err(|_| SessionError::ControllerUnavailable)?;
        reply_rx.await.map_err(|_| SessionError::ControllerUnavailable)
    }

    pub async fn start(&self) -> Result<SensingSession, SessionError> {
        self.call(Request::Start).await?
    }

    /// Always ends Idle; teardown problems are only reported.
    pub async fn stop(&self) -> Result<StopReport, SessionError> {
        self.call(Request::Stop).await
    }

    pub async fn test_notification(&self) -> Result<(), SessionError> {
        self.call(Request::TestNotification).await
    }

    pub async fn status(&self) -> Result<StatusReport, SessionError> {
        self.call(Request::Status).await
    }

    pub async fn configure_notifications(
        &self,
        enabled: bool,
        interval_minutes: u32,
    ) -> Result<(), SessionError> {
        self.call(|reply| Request::ConfigureNotifications {
            enabled,
            interval_minutes,
            reply,
        })
        .await
    }

    /// Tears down any live session without clearing the persisted intent,
    /// waits for pending settings writes, and ends the controller task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.call(Request::Shutdown).await
    }
}

/// Owner of the single sensing session and everything derived from its
/// events. All of it is touched only from the controller's own task.
pub struct SessionController {
    config: CoordinatorConfig,
    bus: MessageBus,
    host: Arc<dyn ContextHost>,
    bootstrap: Bootstrapper,
    ui: UiBroadcaster,
    ingest: Arc<dyn InsightsIngest>,
    settings: mpsc::UnboundedSender<SettingsWrite>,
    settings_worker: JoinHandle<()>,
    events: mpsc::UnboundedReceiver<AgentEvent>,

    session: SensingSession,
    agent: Option<AgentHandle>,
    aggregator: Option<HourlyAggregator>,
    rotation: Option<Interval>,
    notifier: Notifier,
    history: RecentHistory,
    total_detections: u64,
}

impl SessionController {
    pub fn spawn(deps: ControllerDeps) -> ControllerHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let events = deps.bus.subscribe_events();

        let stored = deps.settings.snapshot();
        let notifier = Notifier::new(
            deps.sink,
            stored.notification_interval(),
            stored.notifications_enabled,
        );
        let history = RecentHistory::from_records(stored.recent_events);
        let (settings_tx, settings_worker) = spawn_settings_writer(deps.settings);

        let controller = Self {
            bootstrap: Bootstrapper::new(
                deps.bus.clone(),
                Arc::clone(&deps.host),
                deps.config.injection_settle_delay,
            ),
            config: deps.config,
            bus: deps.bus,
            host: deps.host,
            ui: deps.ui,
            ingest: deps.ingest,
            settings: settings_tx,
            settings_worker,
            events,
            session: SensingSession::new(),
            agent: None,
            aggregator: None,
            rotation: None,
            notifier,
            history,
            total_detections: 0,
        };

        tokio::spawn(controller.run(requests_rx));
        ControllerHandle {
            requests: requests_tx,
        }
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        info!("session controller running");
        let shutdown_reply = loop {
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => self.handle_event(event),
                _ = next_rotation_tick(&mut self.rotation) => self.rotate_due(),
                request = requests.recv() => match request {
                    Some(request) => {
                        if let Some(reply) = self.handle_request(request).await {
                            break Some(reply);
                        }
                    }
                    None => break None,
                },
            }
        };

        if !self.session.state.is_idle() {
            self.teardown(None).await;
        }
        let Self {
            settings,
            settings_worker,
            ..
        } = self;
        drop(settings);
        if let Err(err) = settings_worker.await {
            error!("settings writer ended abnormally: {err}");
        }
        info!("session controller stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    /// Returns the reply slot when the request asks the controller to exit.
    async fn handle_request(&mut self, request: Request) -> Option<oneshot::Sender<()>> {
        match request {
            Request::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Request::Stop(reply) => {
                let report = self.stop().await;
                let _ = reply.send(report);
            }
            Request::TestNotification(reply) => {
                self.notifier.test_notification();
                let _ = reply.send(());
            }
            Request::Status(reply) => {
                let report = self.status().await;
                let _ = reply.send(report);
            }
            Request::ConfigureNotifications {
                enabled,
                interval_minutes,
                reply,
            } => {
                self.notifier.set_enabled(enabled);
                self.notifier
                    .set_min_interval(Duration::from_secs(u64::from(interval_minutes) * 60));
                self.persist(SettingsWrite::Notifications {
                    enabled,
                    interval_minutes,
                });
                let _ = reply.send(());
            }
            Request::Shutdown(reply) => return Some(reply),
        }
        None
    }

    async fn start(&mut self) -> Result<SensingSession, SessionError> {
        if !self.session.state.is_idle() {
            info!("start requested while {}, restarting", self.session.state.as_str());
            self.teardown(None).await;
        }

        let Some(page) = self.host.active_context().await else {
            return Err(self.fail_start(SessionError::IneligibleContext("no active page".into())));
        };
        if is_restricted_url(&page.url) {
            return Err(self.fail_start(SessionError::IneligibleContext(page.url)));
        }

        self.session.begin_start(page.id);
        self.publish_state();

        let delivery = match self.bootstrap.deliver(page.id, AgentCommand::StartSession).await {
            Ok(delivery) => delivery,
            Err(err) => {
                // A timed-out start can still open the capture later on.
                if err.left_unanswered() && self.bus.has_listener(page.id) {
                    self.send_stop_to_agent(page.id).await;
                }
                return Err(self.fail_start(err));
            }
        };
        if delivery.reply != AgentReply::Started {
            let err = SessionError::UnexpectedReply {
                context: page.id,
                detail: format!("{:?}", delivery.reply),
            };
            self.send_stop_to_agent(page.id).await;
            return Err(self.fail_start(err));
        }

        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let anchor = Instant::now();
        self.session.activate(session_id, started_at, anchor);
        self.agent = Some(AgentHandle {
            context_id: page.id,
            injected: delivery.injected,
            last_heartbeat: Some(anchor),
        });
        self.aggregator = Some(HourlyAggregator::new(started_at, self.config.rotation_interval));
        self.rotation = Some(rotation_ticker(self.config.rotation_check_every));
        self.total_detections = 0;

        self.persist(SettingsWrite::SensingEnabled(true));
        self.publish_state();
        info!(
            "session {} active in {} (injected: {})",
            self.session.session_id.as_deref().unwrap_or_default(),
            page.id,
            delivery.injected
        );
        Ok(self.session.clone())
    }

    fn fail_start(&mut self, err: SessionError) -> SessionError {
        warn!("start failed: {err}");
        self.session.reset(Some(err.to_string()));
        self.agent = None;
        self.publish_state();
        err
    }

    async fn stop(&mut self) -> StopReport {
        let report = if self.session.state.is_idle() {
            debug!("stop requested while idle");
            StopReport::default()
        } else {
            self.teardown(None).await
        };
        self.persist(SettingsWrite::SensingEnabled(false));
        report
    }

    /// Best-effort agent teardown; local state always ends Idle.
    async fn teardown(&mut self, last_error: Option<String>) -> StopReport {
        let was_active = self.session.is_active();
        self.session.begin_stop();
        self.publish_state();
        self.rotation = None;

        let agent_acknowledged = match self.agent.take() {
            Some(agent) => self.send_stop_to_agent(agent.context_id).await,
            None => false,
        };
        // The agent joins its loop before acknowledging, so anything it
        // emitted is already queued and belongs to the ending session.
        let mut dropped = 0;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("dropped {dropped} late events from the ending session");
        }

        self.finish_session(last_error);
        StopReport {
            was_active,
            agent_acknowledged,
        }
    }

    async fn send_stop_to_agent(&self, context: ContextId) -> bool {
        match self.bus.send_command(context, AgentCommand::StopSession).await {
            Ok(AgentReply::Stopped) => true,
            Ok(other) => {
                warn!("agent in {context} answered stop with {other:?}");
                false
            }
            Err(err) => {
                warn!("stop not acknowledged by {context}: {err}");
                false
            }
        }
    }

    fn finish_session(&mut self, last_error: Option<String>) {
        if let Some(summary) = self.aggregator.take().and_then(|agg| agg.flush()) {
            self.publish_summary(summary);
        }
        self.session.reset(last_error);
        self.publish_state();
    }

    fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Detection(event) => self.handle_detection(event),
            AgentEvent::CaptureLost { context, reason } => {
                if !self.owns(context) {
                    debug!("ignoring capture loss from stale {context}");
                    return;
                }
                warn!("capture lost in {context}: {reason}");
                self.rotation = None;
                self.agent = None;
                self.finish_session(Some(format!("capture lost: {reason}")));
            }
        }
    }

    fn handle_detection(&mut self, event: DetectionEvent) {
        let context = event.source_context();
        if !self.owns(context) {
            debug!("ignoring detection from {context} outside the active session");
            return;
        }

        let now = Instant::now();
        if let Some(agent) = self.agent.as_mut() {
            agent.last_heartbeat = Some(now);
        }

        self.rotate_due();
        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.record(event.label());
        }
        self.notifier.on_detection(&event, now);

        let record = event.to_record();
        self.history.push(record.clone());
        self.total_detections += 1;

        self.ui.publish(UiMessage::EventDetected {
            event: record.clone(),
        });
        self.ui.publish(UiMessage::UpdateRecentEvents {
            events: self.history.to_vec(),
        });
        self.persist(SettingsWrite::RecentEvents(self.history.to_vec()));
        self.submit_ingest(IngestRecord::from(&event));
    }

    fn owns(&self, context: ContextId) -> bool {
        self.session.is_active() && self.session.context_id == Some(context)
    }

    fn rotate_due(&mut self) {
        if !self.session.is_active() {
            return;
        }
        let elapsed = self.session.elapsed();
        let Some(aggregator) = self.aggregator.as_mut() else {
            return;
        };
        for summary in aggregator.catch_up(elapsed) {
            self.publish_summary(summary);
        }
    }

    async fn status(&mut self) -> StatusReport {
        let state = self.session.state;
        if let Some(agent) = self.agent.as_mut() {
            let reply = self
                .bus
                .send_command_within(agent.context_id, AgentCommand::GetStatus, self.config.status_timeout)
                .await;
            match reply {
                Ok(AgentReply::Status(live)) => {
                    agent.last_heartbeat = Some(Instant::now());
                    return StatusReport {
                        state,
                        is_detecting: live.is_detecting,
                        last_detection: live.last_detection,
                        total_detections: live.total_detections,
                        hourly_count: live.hourly_count,
                    };
                }
                Ok(other) => debug!("unexpected status reply {other:?}, using cached values"),
                Err(err) => debug!("live status unavailable ({err}), using cached values"),
            }
        }

        StatusReport {
            state,
            is_detecting: self.session.is_active(),
            last_detection: self.history.latest().cloned(),
            total_detections: self.total_detections,
            hourly_count: self
                .aggregator
                .as_ref()
                .map(|agg| agg.bucket().total())
                .unwrap_or(0),
        }
    }

    fn publish_state(&self) {
        self.ui.publish(UiMessage::SessionStateChanged {
            state: self.session.state,
        });
    }

    fn publish_summary(&self, summary: HourlySummary) {
        info!(
            "window from {} closed: {} {}% of {}",
            summary.window_start,
            summary.dominant.as_str(),
            summary.percentage,
            summary.total
        );
        self.ui.publish(UiMessage::SummaryReady { summary });
    }

    fn persist(&self, write: SettingsWrite) {
        if self.settings.send(write).is_err() {
            error!("settings writer is gone; change not persisted");
        }
    }

    fn submit_ingest(&self, record: IngestRecord) {
        let ingest = Arc::clone(&self.ingest);
        tokio::spawn(async move {
            if let Err(err) = ingest.submit(&record).await {
                warn!("failed to submit detection: {err:?}");
            }
        });
    }
}

/// Applies settings writes one at a time, in order, on the blocking pool.
fn spawn_settings_writer(
    store: Arc<SettingsStore>,
) -> (mpsc::UnboundedSender<SettingsWrite>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<SettingsWrite>();
    let worker = tokio::spawn(async move {
        while let Some(write) = rx.recv().await {
            let store = Arc::clone(&store);
            let result = tokio::task::spawn_blocking(move || match write {
                SettingsWrite::SensingEnabled(enabled) => store.set_sensing_enabled(enabled),
                SettingsWrite::Notifications {
                    enabled,
                    interval_minutes,
                } => store.set_notifications(enabled, interval_minutes),
                SettingsWrite::RecentEvents(events) => store.set_recent_events(events),
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("failed to persist settings: {err:?}"),
                Err(err) => error!("settings write task panicked: {err}"),
            }
        }
    });
    (tx, worker)
}

fn rotation_ticker(every: Duration) -> Interval {
    let every = every.max(MIN_ROTATION_CHECK);
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_rotation_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}
