use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;
use url::Url;

use crate::error::{Result, ThumbnailerError};

/// Prefix shared by every environment variable the service recognises.
pub const ENV_PREFIX: &str = "S3G_";

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_use_ssl() -> bool {
    true
}

fn default_wait_time_seconds() -> i32 {
    20
}

fn default_max_batch_size() -> i32 {
    10
}

fn default_event_prefix() -> String {
    "ObjectCreated:".to_string()
}

fn default_thumbnail_size() -> u32 {
    300
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Verbose logging for local development
    #[serde(default)]
    pub develop_mode: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Object store endpoint, either `host[:port]` or a full URL
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Scheme used when `endpoint` has none
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    /// Bucket holding the uploaded photos and videos
    pub media_bucket: String,
    /// Bucket receiving `<media key>.jpg` thumbnails
    pub thumbnail_bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Queue the media bucket publishes its event notifications to
    #[serde(default)]
    pub queue_url: Option<String>,
    /// Queue service endpoint; defaults to the scheme and host of `queue_url`
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Long-polling wait time in seconds (1-20)
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: i32,
    /// Messages fetched per poll (1-10)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: i32,
    /// Event name prefix selecting creation events
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Target size of the longest edge in pixels
    #[serde(default = "default_thumbnail_size")]
    pub size: u32,
    /// Directory holding the temporary download and conversion files
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpegthumbnailer binary
    pub ffmpegthumbnailer_path: String,
    /// Path to exiftool binary
    pub exiftool_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            access_key: String::new(),
            secret_key: String::new(),
            use_ssl: default_use_ssl(),
            media_bucket: String::new(),
            thumbnail_bucket: String::new(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            endpoint: None,
            wait_time_seconds: default_wait_time_seconds(),
            max_batch_size: default_max_batch_size(),
            event_prefix: default_event_prefix(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: default_thumbnail_size(),
            work_dir: default_work_dir(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpegthumbnailer_path: "ffmpegthumbnailer".to_string(),
            exiftool_path: "exiftool".to_string(),
        }
    }
}

impl StoreConfig {
    /// Endpoint as a URL, adding the scheme selected by `use_ssl` when missing.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else if self.use_ssl {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

impl NotificationConfig {
    pub fn wait_time(&self) -> i32 {
        self.wait_time_seconds.clamp(1, 20)
    }

    pub fn batch_size(&self) -> i32 {
        self.max_batch_size.clamp(1, 10)
    }

    /// Endpoint the queue client talks to.
    ///
    /// The SDK resolves requests against the region, not the queue URL, so a
    /// self-hosted queue is only reachable through an explicit endpoint.
    pub fn endpoint_url(&self, queue_url: &str) -> Result<String> {
        if let Some(endpoint) = self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }

        let url = Url::parse(queue_url)
            .map_err(|e| ThumbnailerError::Config(format!("Invalid queue URL {:?}: {}", queue_url, e)))?;
        if !url.has_host() || !matches!(url.scheme(), "http" | "https") {
            return Err(ThumbnailerError::Config(format!(
                "Queue URL {:?} needs an http(s) host",
                queue_url
            )));
        }
        Ok(url.origin().ascii_serialization())
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ThumbnailerError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ThumbnailerError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ThumbnailerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ThumbnailerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Overlay `S3G_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay settings from `lookup`, which receives full variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, v)) = var("S3_ENDPOINT") {
            self.store.endpoint = v;
        }
        if let Some((_, v)) = var("S3_REGION") {
            self.store.region = v;
        }
        if let Some((_, v)) = var("S3_ACCESS_KEY") {
            self.store.access_key = v;
        }
        if let Some((_, v)) = var("S3_SECRET_KEY") {
            self.store.secret_key = v;
        }
        if let Some((name, v)) = var("S3_USE_SSL") {
            self.store.use_ssl = parse_setting(&name, &v)?;
        }
        if let Some((_, v)) = var("S3_MEDIA_BUCKET") {
            self.store.media_bucket = v;
        }
        if let Some((_, v)) = var("S3_THUMBNAIL_BUCKET") {
            self.store.thumbnail_bucket = v;
        }
        if let Some((_, v)) = var("QUEUE_URL") {
            self.notifications.queue_url = Some(v);
        }
        if let Some((_, v)) = var("QUEUE_ENDPOINT") {
            self.notifications.endpoint = Some(v);
        }
        if let Some((name, v)) = var("THUMBNAIL_SIZE") {
            self.thumbnail.size = parse_setting(&name, &v)?;
        }
        if let Some((_, v)) = var("WORK_DIR") {
            self.thumbnail.work_dir = PathBuf::from(v);
        }
        if let Some((_, v)) = var("FFMPEG_THUMBNAILER_PATH") {
            self.tools.ffmpegthumbnailer_path = v;
        }
        if let Some((_, v)) = var("EXIF_TOOL_PATH") {
            self.tools.exiftool_path = v;
        }
        if let Some((name, v)) = var("MODE_DEVELOP") {
            self.develop_mode = parse_setting(&name, &v)?;
        }

        Ok(())
    }

    /// Check required settings. Run once at startup before any processing.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("store.endpoint", &self.store.endpoint),
            ("store.access_key", &self.store.access_key),
            ("store.secret_key", &self.store.secret_key),
            ("store.media_bucket", &self.store.media_bucket),
            ("store.thumbnail_bucket", &self.store.thumbnail_bucket),
            ("tools.ffmpegthumbnailer_path", &self.tools.ffmpegthumbnailer_path),
            ("tools.exiftool_path", &self.tools.exiftool_path),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ThumbnailerError::Config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.store.media_bucket == self.store.thumbnail_bucket {
            return Err(ThumbnailerError::Config(
                "Media and thumbnail buckets must differ".to_string(),
            ));
        }

        if self.thumbnail.size == 0 {
            return Err(ThumbnailerError::Config(
                "Thumbnail size must be greater than zero".to_string(),
            ));
        }

        debug!(
            media_bucket = %self.store.media_bucket,
            thumbnail_bucket = %self.store.thumbnail_bucket,
            size = self.thumbnail.size,
            "Configuration validated"
        );
        Ok(())
    }

    /// Queue URL, required only once the service starts streaming.
    pub fn require_queue_url(&self) -> Result<&str> {
        self.notifications
            .queue_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                ThumbnailerError::Config(format!(
                    "notifications.queue_url (or {}QUEUE_URL) is required to stream events",
                    ENV_PREFIX
                ))
            })
    }
}

fn parse_setting<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ThumbnailerError::Config(format!("Invalid value for {}: {}", name, e)))
}
