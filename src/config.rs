//! Application-level configuration loading: phase timings, catalog location,
//! static watch lists and the settings handed to new rooms.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};
use validator::Validate;

use crate::state::game::RoomSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BEAT_QUIZ_CONFIG_PATH";
/// Default location of the song catalog.
const DEFAULT_CATALOG_PATH: &str = "config/catalog.json";

/// Fixed delays that drive the round controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Delay between "game started" and the first round.
    pub intro_delay: Duration,
    /// Slack added to every guess timer to absorb network latency.
    pub guess_buffer: Duration,
    /// Length of the reveal phase.
    pub reveal_duration: Duration,
    /// Countdown shown after a resume, before the next round starts.
    pub resume_countdown: Duration,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            intro_delay: Duration::from_millis(3000),
            guess_buffer: Duration::from_millis(1000),
            reveal_duration: Duration::from_millis(8000),
            resume_countdown: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    timings: PhaseTimings,
    catalog_path: PathBuf,
    watch_lists: HashMap<String, Vec<u64>>,
    default_settings: RoomSettings,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        watch_lists = app_config.watch_lists.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; missing keys take their default value.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Phase timings used by every room.
    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }

    /// Path of the JSON song catalog.
    pub fn catalog_path(&self) -> &PathBuf {
        &self.catalog_path
    }

    /// Static watch lists keyed by account identifier.
    pub fn watch_lists(&self) -> &HashMap<String, Vec<u64>> {
        &self.watch_lists
    }

    /// Settings given to newly created rooms.
    pub fn default_settings(&self) -> &RoomSettings {
        &self.default_settings
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timings: PhaseTimings::default(),
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            watch_lists: HashMap::new(),
            default_settings: RoomSettings::default(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    intro_delay_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    guess_buffer_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    reveal_duration_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    resume_countdown_ms: Duration,
    catalog_path: PathBuf,
    watch_lists: HashMap<String, Vec<u64>>,
    default_settings: RoomSettings,
}

impl Default for RawConfig {
    fn default() -> Self {
        let timings = PhaseTimings::default();
        Self {
            intro_delay_ms: timings.intro_delay,
            guess_buffer_ms: timings.guess_buffer,
            reveal_duration_ms: timings.reveal_duration,
            resume_countdown_ms: timings.resume_countdown,
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            watch_lists: HashMap::new(),
            default_settings: RoomSettings::default(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let default_settings = match value.default_settings.validate() {
            Ok(()) => value.default_settings,
            Err(err) => {
                warn!(error = %err, "invalid default room settings; using built-in defaults");
                RoomSettings::default()
            }
        };

        Self {
            timings: PhaseTimings {
                intro_delay: value.intro_delay_ms,
                guess_buffer: value.guess_buffer_ms,
                reveal_duration: value.reveal_duration_ms,
                resume_countdown: value.resume_countdown_ms,
            },
            catalog_path: value.catalog_path,
            watch_lists: value.watch_lists,
            default_settings,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
