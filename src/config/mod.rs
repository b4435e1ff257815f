use serde::Deserialize;
use serde_json::{Map, Value};
use std::env;
use std::path::Path;

use crate::assembler::BootstrapError;
use crate::models::ArchiveType;

/// Config holds all process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    pub conf_dir: String,
    pub archive_dir: String,
    pub content_dir: String,
    pub import_dir: String,
    pub cache_ttl_secs: u64,
    pub cache_threshold: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            db_path: get_env("DB_PATH", "/data/bootstrapper.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:5000"),
            conf_dir: get_env("CONF_DIR", "./conf"),
            archive_dir: get_env("ARCHIVE_DIR", "/tmp/bootstrapper/archives"),
            content_dir: get_env("CONTENT_DIR", "/opt/bootstrapper/content"),
            import_dir: get_env("IMPORT_DIR", "./templates/import"),
            cache_ttl_secs: get_env("CACHE_TTL_SECS", "300").parse().unwrap_or(300),
            cache_threshold: get_env("CACHE_THRESHOLD", "256").parse().unwrap_or(256),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Operator settings from `configuration.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_init_cfg")]
    pub default_init_cfg: String,
    #[serde(default = "default_archive_type")]
    pub default_archive_type: ArchiveType,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_init_cfg() -> String {
    "Default Init-Cfg".to_string()
}

fn default_archive_type() -> ArchiveType {
    ArchiveType::Zip
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_init_cfg: default_init_cfg(),
            default_archive_type: default_archive_type(),
        }
    }
}

/// Default overlay from `defaults.yaml`, one section per category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub bootstrap: Map<String, Value>,
    #[serde(default)]
    pub openstack: Map<String, Value>,
}

/// OperatorConfig is constructed once at startup and shared read-only
#[derive(Debug, Clone, Default)]
pub struct OperatorConfig {
    pub settings: OperatorSettings,
    pub defaults: Defaults,
}

impl OperatorConfig {
    /// Load `configuration.yaml` and `defaults.yaml` from `conf_dir`.
    /// Missing files fall back to built-in values; malformed files are fatal.
    pub fn load(conf_dir: &str) -> Result<Self, BootstrapError> {
        let dir = Path::new(conf_dir);
        let settings = load_yaml_or_default(&dir.join("configuration.yaml"))?;
        let defaults = load_yaml_or_default(&dir.join("defaults.yaml"))?;
        Ok(Self { settings, defaults })
    }

    /// Parse both documents from strings (empty documents are allowed)
    pub fn from_yaml(configuration: &str, defaults: &str) -> Result<Self, BootstrapError> {
        Ok(Self {
            settings: parse_yaml(configuration, "configuration.yaml")?,
            defaults: parse_yaml(defaults, "defaults.yaml")?,
        })
    }

    /// Retrieval URL for a cached artifact
    pub fn artifact_url(&self, key: &str) -> String {
        format!("{}/get/{}", self.settings.base_url.trim_end_matches('/'), key)
    }
}

fn load_yaml_or_default<T>(path: &Path) -> Result<T, BootstrapError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    let label = path.display().to_string();
    match std::fs::read_to_string(path) {
        Ok(text) => parse_yaml(&text, &label),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("{} not found, using built-in defaults", label);
            Ok(T::default())
        }
        Err(e) => Err(BootstrapError::InvalidConfiguration(format!(
            "could not read {}: {}",
            label, e
        ))),
    }
}

fn parse_yaml<T>(text: &str, label: &str) -> Result<T, BootstrapError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(text).map_err(|e| {
        BootstrapError::InvalidConfiguration(format!("could not parse {}: {}", label, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_config_from_yaml() {
        let cfg = OperatorConfig::from_yaml(
            "base_url: http://bootstrap.local:5000/\ndefault_archive_type: tgz\n",
            "bootstrap:\n  timezone: UTC\nopenstack:\n  image_name: pa-vm\n",
        )
        .unwrap();
        assert_eq!(cfg.settings.default_archive_type, ArchiveType::Tgz);
        assert_eq!(cfg.settings.default_init_cfg, "Default Init-Cfg");
        assert_eq!(cfg.defaults.bootstrap["timezone"], "UTC");
        assert_eq!(cfg.defaults.openstack["image_name"], "pa-vm");
        assert_eq!(
            cfg.artifact_url("abc"),
            "http://bootstrap.local:5000/get/abc"
        );
    }

    #[test]
    fn test_empty_documents_use_defaults() {
        let cfg = OperatorConfig::from_yaml("", "").unwrap();
        assert_eq!(cfg.settings.base_url, "http://localhost:5000");
        assert!(cfg.defaults.bootstrap.is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_invalid_configuration() {
        let err = OperatorConfig::from_yaml("base_url: [unterminated", "").unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfiguration(_)));

        let err = OperatorConfig::from_yaml("", "- just\n- a list\n").unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_conf_dir_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = OperatorConfig::load(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.settings.default_archive_type, ArchiveType::Zip);
    }
}
