use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::{ConfigWarning, SagentConfig};

/// Loads the sagent configuration once at startup.
pub struct ConfigLoader {
    config: SagentConfig,
    config_path: PathBuf,
    warnings: Vec<ConfigWarning>,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > SAGENT_CONFIG env >
    /// ./sagent.toml > ~/.sagent/sagent.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("SAGENT_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from("sagent.toml");
        if local.exists() {
            return local;
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sagent")
            .join("sagent.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> sagent_core::Result<Self> {
        Self::load_with(path, |_| {})
    }

    /// Load the config, then let the caller apply its own overrides (CLI
    /// flags) before validation runs. Validation errors fail the load;
    /// warnings are kept for the caller to report.
    pub fn load_with(
        path: Option<&Path>,
        overrides: impl FnOnce(&mut SagentConfig),
    ) -> sagent_core::Result<Self> {
        let mut loader = Self::read(path, overrides)?;
        loader.warnings = loader
            .config
            .validate()
            .map_err(sagent_core::SagentError::Config)?;
        Ok(loader)
    }

    /// Parse the config and apply env and caller overrides without
    /// validating it.
    pub fn read(
        path: Option<&Path>,
        overrides: impl FnOnce(&mut SagentConfig),
    ) -> sagent_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            SagentConfig::default()
        };

        let mut config = Self::apply_overrides_from(config, |key| std::env::var(key).ok());
        overrides(&mut config);

        Ok(Self {
            config,
            config_path,
            warnings: Vec::new(),
        })
    }

    fn parse(raw: &str, config_path: &Path) -> sagent_core::Result<SagentConfig> {
        toml::from_str::<SagentConfig>(raw).map_err(|e| {
            sagent_core::SagentError::Config(format!(
                "failed to parse {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> SagentConfig {
        self.config.clone()
    }

    /// Consume the loader, keeping only the config.
    pub fn into_config(self) -> SagentConfig {
        self.config
    }

    /// Non-fatal findings from validation. Empty after [`ConfigLoader::read`].
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Path the config was resolved from (it may not exist).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply environment overrides (HOST, PORT, OUTBOX_HOST, OUTBOX_PORT,
    /// SERVER_MODE, SAGENT_LOG_LEVEL) read through `lookup`.
    ///
    /// Unparseable numeric or mode values are ignored with a warning.
    pub fn apply_overrides_from(
        mut config: SagentConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SagentConfig {
        if let Some(v) = lookup("HOST") {
            config.node.host = v;
        }
        if let Some(v) = lookup("PORT") {
            match v.parse::<u16>() {
                Ok(port) => config.node.port = Some(port),
                Err(_) => warn!(value = %v, "ignoring invalid PORT"),
            }
        }
        if let Some(v) = lookup("OUTBOX_HOST") {
            config.peer.host = Some(v);
        }
        if let Some(v) = lookup("OUTBOX_PORT") {
            match v.parse::<u16>() {
                Ok(port) => config.peer.port = Some(port),
                Err(_) => warn!(value = %v, "ignoring invalid OUTBOX_PORT"),
            }
        }
        if let Some(v) = lookup("SERVER_MODE") {
            match v.parse() {
                Ok(mode) => config.transport.mode = mode,
                Err(e) => warn!(error = %e, "ignoring SERVER_MODE"),
            }
        }
        if let Some(v) = lookup("SAGENT_LOG_LEVEL") {
            config.logging.level = v;
        }
        config
    }
}
