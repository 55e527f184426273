use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::window::{Window, CI_INTERVAL_HOURS};
use crate::providers::sqlite::DEFAULT_PAGE_SIZE;

const CANDIDATES: [&str; 4] = ["squash.toml", "squash.json", "squash.yaml", "squash.yml"];

/// Configuration file structure for SQUASH.
///
/// Command-line flags and environment variables take precedence over
/// everything read here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Remote SQUASH API
    #[serde(default)]
    pub api: ApiConfig,

    /// Local SQLite store
    #[serde(default)]
    pub store: StoreConfig,

    /// Monitor defaults
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// API root, e.g. `http://localhost:8000/dashboard/api/`
    pub base_url: Option<String>,

    /// Bearer token used when submitting jobs
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Database file. Defaults to `squash/squash.db` under the user data directory.
    pub path: Option<PathBuf>,

    /// Number of measurements per listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MonitorConfig {
    pub dataset: Option<String>,

    pub metric: Option<String>,

    #[serde(default)]
    pub window: Window,

    /// Assumed hours between two CI runs, used to size the window
    #[serde(default = "default_ci_interval_hours")]
    pub ci_interval_hours: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            page_size: default_page_size(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            metric: None,
            window: Window::default(),
            ci_interval_hours: default_ci_interval_hours(),
        }
    }
}

impl StoreConfig {
    /// Configured database path, or the per-user default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_ci_interval_hours() -> u64 {
    CI_INTERVAL_HOURS
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("squash")
        .join("squash.db")
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./squash.toml
    /// 3. ./squash.json
    /// 4. ./squash.yaml
    /// 5. ./squash.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        match discover(Path::new(".")) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let config: Self = match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// First configuration file present in `dir`.
fn discover(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, None);
        assert_eq!(config.store.page_size, 100);
        assert_eq!(config.monitor.window, Window::Months);
        assert_eq!(config.monitor.ci_interval_hours, 8);
        assert_eq!(config.output.format, OutputFormat::Summary);
        assert!(config.store.resolved_path().ends_with("squash/squash.db"));
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[api]
base-url = "http://localhost:8000/dashboard/api/"
token = "s3cret"

[store]
path = "/tmp/squash.db"
page-size = 50

[monitor]
dataset = "cfht"
metric = "PA1"
window = "weeks"
ci-interval-hours = 24

[output]
format = "json"
pretty = true
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(
            config.api.base_url.as_deref(),
            Some("http://localhost:8000/dashboard/api/")
        );
        assert_eq!(config.api.token.as_deref(), Some("s3cret"));
        assert_eq!(config.store.resolved_path(), PathBuf::from("/tmp/squash.db"));
        assert_eq!(config.store.page_size, 50);
        assert_eq!(config.monitor.dataset.as_deref(), Some("cfht"));
        assert_eq!(config.monitor.metric.as_deref(), Some("PA1"));
        assert_eq!(config.monitor.window, Window::Weeks);
        assert_eq!(config.monitor.ci_interval_hours, 24);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "monitor": {
    "window": "years"
  },
  "output": {
    "format": "csv"
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.monitor.window, Window::Years);
        assert_eq!(config.monitor.ci_interval_hours, 8);
        assert_eq!(config.output.format, OutputFormat::Csv);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "store:\n  page-size: 25\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.store.page_size, 25);
        assert_eq!(config.store.path, None);
    }

    #[test]
    fn test_unknown_window_means_all() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[monitor]\nwindow = \"decades\"\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.monitor.window, Window::All);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let result = Config::load(Some(Path::new("nonexistent-squash.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_discover_prefers_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(discover(temp_dir.path()), None);

        std::fs::write(temp_dir.path().join("squash.yml"), "output:\n  pretty: true\n").unwrap();
        std::fs::write(temp_dir.path().join("squash.toml"), "[output]\npretty = true\n").unwrap();

        let found = discover(temp_dir.path()).unwrap();
        assert_eq!(found, temp_dir.path().join("squash.toml"));
        assert!(Config::load(Some(&found)).unwrap().output.pretty);
    }
}
