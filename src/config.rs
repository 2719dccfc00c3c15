use std::{env, path::PathBuf, time::Duration};

use log::warn;

use crate::aggregation::ROTATION_INTERVAL;
use crate::messaging::DEFAULT_COMMAND_TIMEOUT;
use crate::sensing::AgentConfig;

const STATUS_TIMEOUT: Duration = Duration::from_secs(1);
const INJECTION_SETTLE_DELAY: Duration = Duration::from_millis(500);
const ROTATION_CHECK_EVERY: Duration = Duration::from_secs(30);

/// Runtime knobs for the coordinator. Persisted user preferences live in
/// [`crate::settings::SettingsStore`] instead.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub agent: AgentConfig,
    pub rotation_interval: Duration,
    /// How often the controller checks whether a rotation is due.
    pub rotation_check_every: Duration,
    pub command_timeout: Duration,
    pub status_timeout: Duration,
    pub injection_settle_delay: Duration,
    pub ingest_endpoint: Option<String>,
    pub data_dir: PathBuf,
    pub debug: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            rotation_interval: ROTATION_INTERVAL,
            rotation_check_every: ROTATION_CHECK_EVERY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            status_timeout: STATUS_TIMEOUT,
            injection_settle_delay: INJECTION_SETTLE_DELAY,
            ingest_endpoint: None,
            data_dir: PathBuf::from("moodsense-data"),
            debug: false,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults overridden by `MOODSENSE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.debug = env::var("MOODSENSE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if config.debug {
            config.rotation_check_every = Duration::from_secs(1);
        }

        if let Ok(dir) = env::var("MOODSENSE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.ingest_endpoint = env::var("MOODSENSE_INGEST_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        if let Some(secs) = parse_u64("MOODSENSE_ROTATION_SECS") {
            config.rotation_interval = Duration::from_secs(secs.max(1));
            config.agent.hourly_window = config.rotation_interval;
        }
        if let Some(ms) = parse_u64("MOODSENSE_DETECTION_INTERVAL_MS") {
            config.agent.detection_interval = Duration::from_millis(ms.max(100));
        }

        config
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

fn parse_u64(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("ignoring {key}={raw:?}: {err}");
            None
        }
    }
}
