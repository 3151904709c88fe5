use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub scenario_timeout_ms: u64,
    pub initial_pass_ms: u64,
    pub default_client_latency_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self { scenario_timeout_ms: 10_000, initial_pass_ms: 16, default_client_latency_ms: 3000 }
    }
}

impl HarnessConfig {
    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }

    pub fn default_client_latency(&self) -> Duration {
        Duration::from_millis(self.default_client_latency_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub document_title: String,
    pub include_diagnostic_marker: bool,
    pub chunk_channel_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            document_title: "resumable scenario".to_string(),
            include_diagnostic_marker: true,
            chunk_channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub harness: HarnessConfig,
    pub render: RenderConfig,
}

impl Config {
    /// Applies `RESUMABLE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout_str) = lookup("RESUMABLE_SCENARIO_TIMEOUT_MS") {
            self.harness.scenario_timeout_ms =
                timeout_str.parse().map_err(|_| ConfigError::InvalidTimeout(timeout_str))?;
        }

        if let Some(pass_str) = lookup("RESUMABLE_INITIAL_PASS_MS") {
            self.harness.initial_pass_ms = pass_str
                .parse()
                .map_err(|_| ConfigError::InvalidConfig("RESUMABLE_INITIAL_PASS_MS".to_string()))?;
        }

        if let Some(latency_str) = lookup("RESUMABLE_CLIENT_LATENCY_MS") {
            self.harness.default_client_latency_ms = latency_str.parse().map_err(|_| {
                ConfigError::InvalidConfig("RESUMABLE_CLIENT_LATENCY_MS".to_string())
            })?;
        }

        if let Some(title) = lookup("RESUMABLE_DOCUMENT_TITLE") {
            self.render.document_title = title;
        }

        if let Some(marker_str) = lookup("RESUMABLE_DIAGNOSTIC_MARKER") {
            self.render.include_diagnostic_marker = marker_str.to_lowercase() == "true"
                || marker_str == "1"
                || marker_str.to_lowercase() == "yes";
        }

        if let Some(capacity_str) = lookup("RESUMABLE_CHUNK_CAPACITY") {
            self.render.chunk_channel_capacity = capacity_str
                .parse()
                .map_err(|_| ConfigError::InvalidConfig("RESUMABLE_CHUNK_CAPACITY".to_string()))?;
        }

        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::FileRead)?;

        toml::from_str(&contents).map_err(ConfigError::TomlParse)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::TomlSerialize)?;

        std::fs::write(path, contents).map_err(ConfigError::FileWrite)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harness.scenario_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }

        if self.harness.initial_pass_ms >= self.harness.scenario_timeout_ms {
            return Err(ConfigError::InvalidConfig(
                "initial_pass_ms must be shorter than scenario_timeout_ms".to_string(),
            ));
        }

        if self.render.chunk_channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig("chunk_channel_capacity".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid config value for {0}")]
    InvalidConfig(String),

    #[error("Failed to read config file: {0}")]
    FileRead(std::io::Error),

    #[error("Failed to write config file: {0}")]
    FileWrite(std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: FxHashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.harness.scenario_timeout_ms, 10_000);
        assert_eq!(config.harness.initial_pass_ms, 16);
        assert_eq!(config.harness.default_client_latency_ms, 3000);
        assert_eq!(config.render.chunk_channel_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("RESUMABLE_SCENARIO_TIMEOUT_MS", "2500"),
                ("RESUMABLE_CLIENT_LATENCY_MS", "800"),
                ("RESUMABLE_DIAGNOSTIC_MARKER", "no"),
                ("RESUMABLE_DOCUMENT_TITLE", "Fixture"),
            ]))
            .unwrap();

        assert_eq!(config.harness.scenario_timeout_ms, 2500);
        assert_eq!(config.harness.default_client_latency_ms, 800);
        assert!(!config.render.include_diagnostic_marker);
        assert_eq!(config.render.document_title, "Fixture");
    }

    #[test]
    fn test_invalid_timeout_override() {
        let mut config = Config::default();
        let result =
            config.apply_overrides(lookup_from(&[("RESUMABLE_SCENARIO_TIMEOUT_MS", "soon")]));

        assert!(matches!(result, Err(ConfigError::InvalidTimeout(value)) if value == "soon"));
    }

    #[test]
    fn test_validate_rejects_pass_longer_than_timeout() {
        let mut config = Config::default();
        config.harness.initial_pass_ms = config.harness.scenario_timeout_ms;

        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resumable.toml");

        let mut config = Config::default();
        config.harness.initial_pass_ms = 40;
        config.render.document_title = "Round trip".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.harness.initial_pass_ms, 40);
        assert_eq!(loaded.render.document_title, "Round trip");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[harness]\nscenario_timeout_ms = 500\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.harness.scenario_timeout_ms, 500);
        assert_eq!(loaded.harness.initial_pass_ms, 16);
        assert_eq!(loaded.render.chunk_channel_capacity, 64);
    }
}
