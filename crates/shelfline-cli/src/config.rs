//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use shelfline_core::{FilterRules, HttpConfig};
use shelfline_harvest::{QueryTemplate, default_templates};

/// File configuration for shelfline. Every section and key is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub workers: WorkersConfig,
    pub harvest: HarvestConfig,
    pub http: HttpSection,
    pub filter: FilterSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub compression_level: i32,
    /// Re-acquire books whose text file disappeared since the last run
    pub verify_files: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./books"),
            compression_level: 3,
            verify_files: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub search: usize,
    pub download: usize,
    pub queue_capacity: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            search: 4,
            download: (cpus * 2).min(16),
            queue_capacity: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub target: usize,
    pub year_start: i32,
    pub year_end: i32,
    pub max_pages: u32,
    pub page_size: u32,
    pub min_text_chars: usize,
    pub target_language: String,
    pub poll_interval_secs: u64,
    pub snapshot_interval_secs: u64,
    pub straggler_timeout_secs: u64,
    pub queue_timeout_ms: u64,
    /// Query templates with `{start}`/`{end}` placeholders (empty = built-in rotation)
    pub templates: Vec<String>,
    pub catalog_url: String,
    pub archive_url: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        let d = shelfline_harvest::Config::default();
        Self {
            target: d.target,
            year_start: d.year_start,
            year_end: d.year_end,
            max_pages: d.max_pages,
            page_size: d.page_size,
            min_text_chars: d.min_text_chars,
            target_language: d.target_language,
            poll_interval_secs: d.poll_interval.as_secs(),
            snapshot_interval_secs: d.snapshot_interval.as_secs(),
            straggler_timeout_secs: d.straggler_timeout.as_secs(),
            queue_timeout_ms: d.queue_timeout.as_millis() as u64,
            templates: Vec::new(),
            catalog_url: d.catalog_url,
            archive_url: d.archive_url,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub connect_timeout: u64,
    pub request_timeout: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        let d = HttpConfig::default();
        Self {
            connect_timeout: d.connect_timeout.as_secs(),
            request_timeout: d.request_timeout.as_secs(),
            max_retries: d.max_retries,
            backoff_base_ms: d.backoff_base.as_millis() as u64,
        }
    }
}

impl HttpSection {
    pub fn to_http_config(self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            ..HttpConfig::default()
        }
    }
}

/// Marker list overrides. An absent list keeps the built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FilterSection {
    pub excluded_authors: Option<Vec<String>>,
    pub title_language_markers: Option<Vec<String>>,
    pub title_region_markers: Option<Vec<String>>,
    pub fiction_markers: Option<Vec<String>>,
}

impl FilterSection {
    pub fn to_rules(&self) -> FilterRules {
        let d = FilterRules::default();
        FilterRules {
            excluded_authors: self.excluded_authors.clone().unwrap_or(d.excluded_authors),
            title_language_markers: self
                .title_language_markers
                .clone()
                .unwrap_or(d.title_language_markers),
            title_region_markers: self
                .title_region_markers
                .clone()
                .unwrap_or(d.title_region_markers),
            fiction_markers: self.fiction_markers.clone().unwrap_or(d.fiction_markers),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./shelfline.toml (current directory)
    /// 2. ~/.config/shelfline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("shelfline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "shelfline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Runtime harvest config before CLI overrides
    pub fn to_harvest(&self) -> shelfline_harvest::Config {
        let h = &self.harvest;
        let templates = if h.templates.is_empty() {
            default_templates()
        } else {
            h.templates.iter().map(QueryTemplate::new).collect()
        };
        shelfline_harvest::Config {
            output_dir: self.output.dir.clone(),
            target: h.target,
            search_workers: self.workers.search,
            download_workers: self.workers.download,
            year_start: h.year_start,
            year_end: h.year_end,
            queue_capacity: self.workers.queue_capacity,
            queue_timeout: Duration::from_millis(h.queue_timeout_ms),
            poll_interval: Duration::from_secs(h.poll_interval_secs),
            snapshot_interval: Duration::from_secs(h.snapshot_interval_secs),
            straggler_timeout: Duration::from_secs(h.straggler_timeout_secs),
            max_pages: h.max_pages,
            page_size: h.page_size,
            max_retries: self.http.max_retries,
            backoff_base: Duration::from_millis(self.http.backoff_base_ms),
            min_text_chars: h.min_text_chars,
            target_language: h.target_language.clone(),
            templates,
            filter: self.filter.to_rules(),
            catalog_url: h.catalog_url.clone(),
            archive_url: h.archive_url.clone(),
            zstd_level: self.output.compression_level,
            verify_files: self.output.verify_files,
        }
    }
}
