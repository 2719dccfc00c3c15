pub mod aggregation;
pub mod bootstrap;
pub mod browser;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingest;
pub mod messaging;
pub mod models;
pub mod notify;
pub mod sensing;
pub mod session;
pub mod settings;
pub mod ui;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

pub use config::CoordinatorConfig;
pub use error::SessionError;
pub use session::{ControllerDeps, ControllerHandle, SessionController, StatusReport};

use browser::BrowserContexts;
use classifier::{FallbackClassifier, RandomLabelClassifier};
use ingest::{DisabledIngest, HttpIngest, InsightsIngest};
use messaging::MessageBus;
use notify::LogNotificationSink;
use sensing::{AgentDeps, SyntheticCamera};
use settings::SettingsStore;
use ui::UiBroadcaster;

const LANDING_PAGE: &str = "https://moodsense.local/dashboard";

pub fn run() -> Result<()> {
    // RUST_LOG wins over the default level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("MoodSense starting up...");

    let config = CoordinatorConfig::from_env();
    let settings = Arc::new(SettingsStore::new(config.settings_path())?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config, settings))
}

async fn serve(config: CoordinatorConfig, settings: Arc<SettingsStore>) -> Result<()> {
    let bus = MessageBus::new(config.command_timeout);
    let classifier = FallbackClassifier::new(Some(Arc::new(RandomLabelClassifier::new())));
    let agent_deps = AgentDeps {
        device: Arc::new(SyntheticCamera::new()),
        classifier: Arc::new(classifier),
        config: config.agent,
    };
    let browser = BrowserContexts::new(bus.clone(), agent_deps);
    let page = browser.open_page(LANDING_PAGE).await;

    let ingest: Arc<dyn InsightsIngest> = match &config.ingest_endpoint {
        Some(endpoint) => {
            info!("forwarding detections to {endpoint}");
            Arc::new(HttpIngest::new(endpoint.as_str())?)
        }
        None => Arc::new(DisabledIngest),
    };

    let ui = UiBroadcaster::new();
    let mut ui_feed = ui.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = ui_feed.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => debug!("ui <- {json}"),
                Err(err) => warn!("failed to encode ui message: {err}"),
            }
        }
    });

    let resume = settings.snapshot().sensing_enabled;
    let controller = SessionController::spawn(ControllerDeps {
        config,
        bus,
        host: Arc::new(browser.clone()),
        settings,
        sink: Arc::new(LogNotificationSink),
        ingest,
        ui,
    });

    if resume {
        info!("sensing was enabled last run, resuming");
    }
    match controller.start().await {
        Ok(session) => info!(
            "sensing session {} running",
            session.session_id.as_deref().unwrap_or_default()
        ),
        Err(err) => warn!("could not start sensing: {err}"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    if let Err(err) = controller.shutdown().await {
        warn!("controller shutdown: {err}");
    }
    browser.close_page(page).await;
    Ok(())
}
