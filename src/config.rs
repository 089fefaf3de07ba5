//! Configuration management: compiled defaults, optional config file,
//! environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scrapers::DelayBounds;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "adatlas.db";

/// Default reference data filenames, resolved under the data directory.
pub const DEFAULT_REGIONS_FILE: &str = "regions.json";
pub const DEFAULT_POSTAL_CODES_FILE: &str = "postal_codes.json";

/// Application settings. Bounds (`max_*`, quota parameters) are operator
/// policy and only change via config, not per request.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename under the data directory.
    pub database_filename: String,
    /// Region attribute table (JSON), relative paths resolved under data_dir.
    pub regions_file: PathBuf,
    /// Postal-code to region/coordinate table (JSON).
    pub postal_codes_file: PathBuf,
    /// Listing source base URL.
    pub base_url: String,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Inter-page delay bounds in seconds.
    pub page_delay_min_secs: f64,
    pub page_delay_max_secs: f64,
    /// Quota window length in seconds.
    pub quota_window_secs: i64,
    /// Maximum listings admitted per quota window.
    pub quota_ceiling: u32,
    /// Hard per-job sample-size bound.
    pub max_sample_size: u32,
    /// Hard per-job age-cutoff bound in days.
    pub max_age_ceiling_days: u32,
    /// Sample size used when a request does not specify one.
    pub default_sample_size: u32,
    /// Age cutoff used when a request does not specify one.
    pub default_max_age_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/.local/share-style app dir for user data.
        // Falls back gracefully: data dir -> home dir -> current dir.
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("adatlas");

        Self {
            regions_file: PathBuf::from(DEFAULT_REGIONS_FILE),
            postal_codes_file: PathBuf::from(DEFAULT_POSTAL_CODES_FILE),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            base_url: "https://www.kleinanzeigen.de".to_string(),
            user_agent: "AdAtlas/0.3 (regional market research)".to_string(),
            request_timeout: 30,
            page_delay_min_secs: 2.0,
            page_delay_max_secs: 4.0,
            quota_window_secs: 180,
            quota_ceiling: 200,
            max_sample_size: 100,
            max_age_ceiling_days: 365,
            default_sample_size: 25,
            default_max_age_days: 365,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    #[allow(dead_code)]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Full path to the quota database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Resolve a reference-data path. Absolute paths pass through,
    /// relative ones land under the data directory.
    fn data_file(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn regions_path(&self) -> PathBuf {
        self.data_file(&self.regions_file)
    }

    pub fn postal_codes_path(&self) -> PathBuf {
        self.data_file(&self.postal_codes_file)
    }

    /// Inter-page delay bounds as a sampler.
    pub fn delay_bounds(&self) -> DelayBounds {
        DelayBounds::new(self.page_delay_min_secs, self.page_delay_max_secs)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Configuration file structure. Every field is optional; absent fields
/// keep their compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Region attribute table path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions_file: Option<String>,
    /// Postal-code table path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_codes_file: Option<String>,
    /// Listing source base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Inter-page delay bounds in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_delay_min_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_delay_max_secs: Option<f64>,
    /// Quota window length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_window_secs: Option<i64>,
    /// Quota ceiling per window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_ceiling: Option<u32>,
    /// Per-job bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sample_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_ceiling_days: Option<u32>,
    /// Per-job defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sample_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_age_days: Option<u32>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// TOML or JSON based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

        let mut config: Config = match ext {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
            _ => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Base directory for resolving relative paths: the config file's
    /// parent directory if available.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref regions_file) = self.regions_file {
            settings.regions_file = self.resolve_path(regions_file, base_dir);
        }
        if let Some(ref postal_codes_file) = self.postal_codes_file {
            settings.postal_codes_file = self.resolve_path(postal_codes_file, base_dir);
        }
        if let Some(ref base_url) = self.base_url {
            settings.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(min) = self.page_delay_min_secs {
            settings.page_delay_min_secs = min;
        }
        if let Some(max) = self.page_delay_max_secs {
            settings.page_delay_max_secs = max;
        }
        if let Some(window) = self.quota_window_secs {
            settings.quota_window_secs = window;
        }
        if let Some(ceiling) = self.quota_ceiling {
            settings.quota_ceiling = ceiling;
        }
        if let Some(max_sample) = self.max_sample_size {
            settings.max_sample_size = max_sample;
        }
        if let Some(max_age) = self.max_age_ceiling_days {
            settings.max_age_ceiling_days = max_age;
        }
        if let Some(sample) = self.default_sample_size {
            settings.default_sample_size = sample;
        }
        if let Some(age) = self.default_max_age_days {
            settings.default_max_age_days = age;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--target flag).
    pub target: Option<PathBuf>,
}

/// Look for a config file in the data directory.
fn find_config_in_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "json"];
    let basenames = ["adatlas", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

async fn load_file_config(options: &LoadOptions, data_dir_override: Option<&PathBuf>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 2: Config next to the data directory
    if let Some(data_dir) = data_dir_override {
        if let Some(config_path) = find_config_in_dir(data_dir) {
            tracing::debug!("Found config next to data dir: {}", config_path.display());
            return Config::load_from_path(&config_path)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Config::default()
                });
        }
    }

    // Priority 3: Default location
    let default_dir = Settings::default().data_dir;
    if let Some(config_path) = find_config_in_dir(&default_dir) {
        return Config::load_from_path(&config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    Config::default()
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data_dir_override = options.target.as_ref().map(|d| {
        if d.is_absolute() {
            d.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(d)
        }
    });

    let config = load_file_config(&options, data_dir_override.as_ref()).await;

    let mut settings = Settings::default();

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    config.apply_to_settings(&mut settings, &base_dir);

    // --target override takes precedence for the data directory.
    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir;
    }

    // Environment overrides take highest precedence.
    if let Some(data_dir) = std::env::var("ADATLAS_DATA_DIR")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using ADATLAS_DATA_DIR from environment: {}", data_dir);
        settings.data_dir = PathBuf::from(shellexpand::tilde(&data_dir).as_ref());
    }
    if let Some(user_agent) = std::env::var("ADATLAS_USER_AGENT")
        .ok()
        .filter(|s| !s.is_empty())
    {
        settings.user_agent = user_agent;
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_policy_bounds() {
        let settings = Settings::default();
        assert!(settings.default_sample_size <= settings.max_sample_size);
        assert!(settings.default_max_age_days <= settings.max_age_ceiling_days);
        assert!(settings.page_delay_min_secs <= settings.page_delay_max_secs);
    }

    #[test]
    fn relative_reference_paths_resolve_under_data_dir() {
        let settings = Settings::with_data_dir(PathBuf::from("/var/lib/adatlas"));
        assert_eq!(
            settings.regions_path(),
            PathBuf::from("/var/lib/adatlas/regions.json")
        );
        assert_eq!(
            settings.database_path(),
            PathBuf::from("/var/lib/adatlas/adatlas.db")
        );
    }

    #[tokio::test]
    async fn toml_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adatlas.toml");
        std::fs::write(
            &path,
            "quota_ceiling = 50\nmax_sample_size = 40\nbase_url = \"https://example.test/\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());

        assert_eq!(settings.quota_ceiling, 50);
        assert_eq!(settings.max_sample_size, 40);
        assert_eq!(settings.base_url, "https://example.test");
    }
}
