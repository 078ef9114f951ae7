use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds without session activity before idle triggers are evaluated.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
    /// Seconds between sweeps of expired proactive messages. Periodic
    /// triggers are evaluated on the same tick.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Suggestions embedded in an unknown-command reply.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    /// Commands whose success triggers a project data refresh.
    #[serde(default = "default_refresh_after")]
    pub refresh_after: Vec<String>,
    /// Default expiry for proactive messages raised by built-in triggers.
    #[serde(default = "default_proactive_ttl")]
    pub proactive_ttl_secs: u64,
    /// Readiness score under which built-in triggers nudge the user.
    #[serde(default = "default_readiness_warning")]
    pub readiness_warning_threshold: u32,
}

fn default_idle_threshold() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_max_suggestions() -> usize {
    3
}

fn default_refresh_after() -> Vec<String> {
    [
        "create-stakeholder",
        "create-persona",
        "create-feature",
        "update-status",
        "delete",
        "confirm",
        "run-foundation",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_proactive_ttl() -> u64 {
    600
}

fn default_readiness_warning() -> u32 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold(),
            sweep_interval_secs: default_sweep_interval(),
            max_suggestions: default_max_suggestions(),
            refresh_after: default_refresh_after(),
            proactive_ttl_secs: default_proactive_ttl(),
            readiness_warning_threshold: default_readiness_warning(),
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&data)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(data)?;
        let errors: Vec<String> = config
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(AssistError::Config(errors.join("; ")));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.idle_threshold_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "idle_threshold_secs must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "sweep_interval_secs must be greater than zero".to_string(),
            });
        }
        if self.max_suggestions == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_suggestions is 0: unknown commands will get no suggestions"
                    .to_string(),
            });
        }
        if self.proactive_ttl_secs < self.sweep_interval_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "proactive_ttl_secs ({}) is shorter than sweep_interval_secs ({}); \
                     expired messages may linger until the next sweep",
                    self.proactive_ttl_secs, self.sweep_interval_secs
                ),
            });
        }
        warnings
    }

    /// Never shorter than one second, even when validation was skipped.
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs.max(1))
    }

    /// Never shorter than one second; a zero interval would panic in
    /// `tokio::time::interval`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn proactive_ttl(&self) -> Duration {
        Duration::from_secs(self.proactive_ttl_secs)
    }

    pub fn refreshes_after(&self, command: &str) -> bool {
        self.refresh_after
            .iter()
            .any(|c| c.eq_ignore_ascii_case(command))
    }
}
