//! Global calrules configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::batch::default_workers;
use crate::error::{CalRulesError, CalRulesResult};
use crate::evaluator::{DEFAULT_TIMEOUT, Evaluator, EvaluatorConfig};
use crate::pipeline::RunMode;
use crate::source::{EventSource, IcsDirSource, JsonFileSource};
use crate::store::DirRuleStore;

static DEFAULT_RULES_DIR: &str = "~/.config/calrules/rules";
static DEFAULT_STATE_DIR: &str = "~/.config/calrules/state";

const DEFAULT_FREQUENCY: Duration = Duration::from_secs(15 * 60);
const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_rules_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RULES_DIR)
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_frequency() -> Duration {
    DEFAULT_FREQUENCY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_true() -> bool {
    true
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

/// Durations written the humantime way (`50ms`, `15min`).
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Wall-clock budget per rule evaluation.
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,

    #[serde(default)]
    pub mode: RunMode,

    #[serde(default)]
    pub coerce_non_boolean: bool,

    /// IANA zone for floating ICS times. Defaults to the system zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            timeout: DEFAULT_TIMEOUT,
            mode: RunMode::default(),
            coerce_non_boolean: false,
            timezone: None,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between passes of `calrules watch`.
    #[serde(default = "default_frequency", with = "duration_str")]
    pub frequency: Duration,

    #[serde(default = "default_true")]
    pub auto_retry: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            frequency: DEFAULT_FREQUENCY,
            auto_retry: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Global configuration at ~/.config/calrules/config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalrulesConfig {
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,

    /// A `.json` file of events or a directory of `.ics` files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<PathBuf>,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl Default for CalrulesConfig {
    fn default() -> Self {
        CalrulesConfig {
            rules_dir: default_rules_dir(),
            events: None,
            state_dir: default_state_dir(),
            engine: EngineSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl CalrulesConfig {
    pub fn config_path() -> CalRulesResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalRulesError::Config("Could not determine config directory".into()))?
            .join("calrules");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/calrules/config.toml, creating it on first use.
    pub fn load() -> CalRulesResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load a config file with `CALRULES_*` environment overrides, e.g.
    /// `CALRULES_ENGINE__TIMEOUT=100ms`.
    pub fn load_from(path: &Path) -> CalRulesResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("CALRULES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CalRulesError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalRulesError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> CalRulesResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| CalRulesError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CalRulesError::Config(format!("Could not create config directory: {e}")))?;
        }
        std::fs::write(path, content)
            .map_err(|e| CalRulesError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalRulesResult<()> {
        let contents = format!(
            "\
# calrules configuration

# Where rules are stored (one TOML file per rule):
# rules_dir = \"{rules}\"

# Events to evaluate: a .json file or a directory of .ics files
# events = \"~/calendar/work\"

# Where the last sync report is kept:
# state_dir = \"{state}\"

[engine]
# Time budget for a single rule evaluation:
# timeout = \"50ms\"

# \"continue\" evaluates every rule; \"short_circuit\" stops at the first exclusion:
# mode = \"continue\"

# Treat non-boolean filter/condition results as false instead of an error:
# coerce_non_boolean = false

# Time zone for floating ICS times (defaults to the system zone):
# timezone = \"Europe/Berlin\"

# Parallel workers for a sync pass (defaults to the number of CPUs):
# workers = 4

[sync]
# How often `calrules watch` runs a pass:
# frequency = \"15min\"

# Retry failed event fetches:
# auto_retry = true
# max_retries = {retries}
",
            rules = DEFAULT_RULES_DIR,
            state = DEFAULT_STATE_DIR,
            retries = DEFAULT_MAX_RETRIES,
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CalRulesError::Config(format!("Could not create config directory: {e}")))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalRulesError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn rules_path(&self) -> PathBuf {
        expand(&self.rules_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        expand(&self.state_dir)
    }

    pub fn events_path(&self) -> Option<PathBuf> {
        self.events.as_deref().map(expand)
    }

    pub fn rule_store(&self) -> DirRuleStore {
        DirRuleStore::new(self.rules_path())
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(EvaluatorConfig {
            timeout: self.engine.timeout,
            coerce_non_boolean: self.engine.coerce_non_boolean,
        })
    }

    pub fn workers(&self) -> usize {
        self.engine.workers.unwrap_or_else(default_workers).max(1)
    }

    /// Fetch retries to use, honouring `auto_retry`.
    pub fn fetch_retries(&self) -> u32 {
        if self.sync.auto_retry { self.sync.max_retries } else { 0 }
    }

    /// The configured zone, else the system zone, else UTC.
    pub fn timezone(&self) -> Tz {
        if let Some(name) = &self.engine.timezone {
            match name.parse::<Tz>() {
                Ok(tz) => return tz,
                Err(_) => warn!(timezone = %name, "Unknown time zone in config, falling back to system zone"),
            }
        }

        iana_time_zone::get_timezone()
            .ok()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(Tz::UTC)
    }

    /// The event source for `path`, or for the configured `events` setting.
    pub fn event_source(&self, path: Option<&Path>) -> CalRulesResult<Box<dyn EventSource>> {
        let path = match path {
            Some(p) => expand(p),
            None => self.events_path().ok_or_else(|| {
                CalRulesError::Config(
                    "No event source configured. Set `events` in ~/.config/calrules/config.toml or pass --source"
                        .into(),
                )
            })?,
        };

        if path.is_dir() {
            Ok(Box::new(IcsDirSource::new(path, self.timezone())))
        } else if path.extension().is_some_and(|ext| ext == "json") {
            Ok(Box::new(JsonFileSource::new(path)))
        } else {
            Err(CalRulesError::Config(format!(
                "Unsupported event source '{}'. Use a .json file or a directory of .ics files",
                path.display()
            )))
        }
    }
}
