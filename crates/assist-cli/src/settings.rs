use anyhow::{Context, Result};
use assist_core::backend::{BackendClient, MemoryBackend};
use assist_core::commands::{builtin, CommandRegistry};
use assist_core::config::{EngineConfig, WarnLevel};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::http::HttpBackend;

/// Resolved global options shared by every subcommand.
pub struct Settings {
    pub config_path: Option<PathBuf>,
    pub project: String,
    pub backend_url: Option<String>,
    pub completion_url: Option<String>,
}

/// Resolve the config file.
///
/// Priority:
/// 1. `--config` flag / `ASSIST_CONFIG` env var
/// 2. `~/.assist/config.yaml`
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    home::home_dir().map(|h| h.join(".assist").join("config.yaml"))
}

impl Settings {
    pub fn load_config(&self) -> Result<EngineConfig> {
        let Some(path) = &self.config_path else {
            return Ok(EngineConfig::default());
        };
        let config = EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        for w in config.validate() {
            if w.level == WarnLevel::Warning {
                tracing::warn!(path = %path.display(), "{}", w.message);
            }
        }
        Ok(config)
    }

    pub fn backend(&self) -> Result<Arc<dyn BackendClient>> {
        match &self.backend_url {
            Some(url) => Ok(Arc::new(HttpBackend::new(url, &self.project)?)),
            None => Ok(Arc::new(MemoryBackend::new())),
        }
    }

    /// The built-in command set, wired to the configured backend.
    pub fn command_registry(&self, config: &EngineConfig) -> Result<CommandRegistry> {
        let mut registry = CommandRegistry::new().with_max_suggestions(config.max_suggestions);
        builtin::register_defaults(&mut registry, self.backend()?);
        Ok(registry)
    }
}
