//! Pipeline configuration: defaults, TOML file overlay, `KITH_*`
//! environment overrides.

use crate::arbiter::SourceMode;
use crate::stability::QualityDropPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STABILITY_MS: u64 = 1500;
const DEFAULT_COOLDOWN_MS: u64 = 5000;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = kith_cloud::client::DEFAULT_SIMILARITY_THRESHOLD;
const DEFAULT_ATTEMPT_BUDGET_MS: u64 = 12_000;
const DEFAULT_MAX_CONCURRENCY: usize = 1;
const DEFAULT_FRAME_BUFFER: usize = 8;
const DEFAULT_CACHE_FILE: &str = "kith-cache.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Pipeline tuning. Every field has a sensible default; hosts usually
/// change only `source_mode` and `cache_path`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long a face must stay acceptable before recognition fires.
    pub stability_threshold: Duration,
    /// Pause after an attempt completes, regardless of outcome.
    pub recognition_cooldown: Duration,
    /// Fire attempts automatically when stability is reached.
    pub auto_recognize: bool,
    /// What a quality drop does to accumulated stability time.
    pub quality_drop: QualityDropPolicy,
    /// Similarity floor passed to the cloud comparison API.
    pub similarity_threshold: f32,
    /// Wall-clock cap for one attempt's comparison fan-out.
    pub attempt_budget: Duration,
    /// Cloud comparisons in flight at once during an attempt.
    pub max_concurrency: usize,
    /// Capacity of the camera-to-scorer frame channel.
    pub frame_buffer: usize,
    /// Which camera feeds the pipeline.
    pub source_mode: SourceMode,
    /// Offline cache location.
    pub cache_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stability_threshold: Duration::from_millis(DEFAULT_STABILITY_MS),
            recognition_cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            auto_recognize: true,
            quality_drop: QualityDropPolicy::Reset,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            attempt_budget: Duration::from_millis(DEFAULT_ATTEMPT_BUDGET_MS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            frame_buffer: DEFAULT_FRAME_BUFFER,
            source_mode: SourceMode::Auto,
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
        }
    }
}

impl PipelineConfig {
    /// Defaults with `KITH_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a TOML file over the defaults. Unknown keys in the file are
    /// rejected. Environment overrides are a separate layer; hosts that
    /// want both call `from_file(..)` and then decide which wins.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let file: ConfigFile = toml::from_str(&text)?;
        Ok(Self::default().with_file(file))
    }

    fn with_file(mut self, file: ConfigFile) -> Self {
        if let Some(ms) = file.stability_threshold_ms {
            self.stability_threshold = Duration::from_millis(ms);
        }
        if let Some(ms) = file.recognition_cooldown_ms {
            self.recognition_cooldown = Duration::from_millis(ms);
        }
        if let Some(auto) = file.auto_recognize {
            self.auto_recognize = auto;
        }
        if let Some(policy) = file.quality_drop {
            self.quality_drop = policy;
        }
        if let Some(threshold) = file.similarity_threshold {
            self.similarity_threshold = threshold;
        }
        if let Some(ms) = file.attempt_budget_ms {
            self.attempt_budget = Duration::from_millis(ms);
        }
        if let Some(n) = file.max_concurrency {
            self.max_concurrency = n;
        }
        if let Some(n) = file.frame_buffer {
            self.frame_buffer = n;
        }
        if let Some(mode) = file.source_mode {
            self.source_mode = mode;
        }
        if let Some(path) = file.cache_path {
            self.cache_path = path;
        }
        self
    }

    fn with_env_overrides(mut self) -> Self {
        self.stability_threshold =
            Duration::from_millis(env_u64("KITH_STABILITY_MS", self.stability_threshold.as_millis() as u64));
        self.recognition_cooldown =
            Duration::from_millis(env_u64("KITH_COOLDOWN_MS", self.recognition_cooldown.as_millis() as u64));
        self.auto_recognize = env_bool("KITH_AUTO_RECOGNIZE", self.auto_recognize);
        if let Ok(value) = std::env::var("KITH_QUALITY_DROP") {
            match value.as_str() {
                "reset" => self.quality_drop = QualityDropPolicy::Reset,
                "pause" => self.quality_drop = QualityDropPolicy::Pause,
                other => tracing::warn!(value = other, "unknown KITH_QUALITY_DROP, keeping default"),
            }
        }
        self.similarity_threshold = env_f32("KITH_SIMILARITY_THRESHOLD", self.similarity_threshold);
        self.attempt_budget =
            Duration::from_millis(env_u64("KITH_ATTEMPT_BUDGET_MS", self.attempt_budget.as_millis() as u64));
        self.max_concurrency = env_usize("KITH_MAX_CONCURRENCY", self.max_concurrency);
        self.frame_buffer = env_usize("KITH_FRAME_BUFFER", self.frame_buffer);
        if let Ok(value) = std::env::var("KITH_SOURCE") {
            match value.as_str() {
                "phone" => self.source_mode = SourceMode::Phone,
                "glasses" => self.source_mode = SourceMode::Glasses,
                "auto" => self.source_mode = SourceMode::Auto,
                other => tracing::warn!(value = other, "unknown KITH_SOURCE, keeping default"),
            }
        }
        if let Ok(path) = std::env::var("KITH_CACHE_PATH") {
            self.cache_path = PathBuf::from(path);
        }
        self
    }
}

/// On-disk form. Durations are integral milliseconds so the file stays
/// editable by hand.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    stability_threshold_ms: Option<u64>,
    recognition_cooldown_ms: Option<u64>,
    auto_recognize: Option<bool>,
    quality_drop: Option<QualityDropPolicy>,
    similarity_threshold: Option<f32>,
    attempt_budget_ms: Option<u64>,
    max_concurrency: Option<usize>,
    frame_buffer: Option<usize>,
    source_mode: Option<SourceMode>,
    cache_path: Option<PathBuf>,
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.stability_threshold, Duration::from_millis(1500));
        assert_eq!(config.recognition_cooldown, Duration::from_secs(5));
        assert!(config.auto_recognize);
        assert_eq!(config.quality_drop, QualityDropPolicy::Reset);
        assert_eq!(config.similarity_threshold, 80.0);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.source_mode, SourceMode::Auto);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kith.toml");
        std::fs::write(
            &path,
            r#"
stability_threshold_ms = 2000
quality_drop = "pause"
source_mode = "glasses"
max_concurrency = 4
cache_path = "/var/lib/kith/cache.json"
"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.stability_threshold, Duration::from_secs(2));
        assert_eq!(config.quality_drop, QualityDropPolicy::Pause);
        assert_eq!(config.source_mode, SourceMode::Glasses);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.cache_path, PathBuf::from("/var/lib/kith/cache.json"));
        // Untouched fields keep their defaults.
        assert_eq!(config.recognition_cooldown, Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kith.toml");
        std::fs::write(&path, "stability_treshold_ms = 2000\n").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/kith.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    // One sequential test owns all KITH_* variables; parallel tests
    // never touch them.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("KITH_STABILITY_MS", "750");
        std::env::set_var("KITH_AUTO_RECOGNIZE", "0");
        std::env::set_var("KITH_QUALITY_DROP", "pause");
        std::env::set_var("KITH_SOURCE", "phone");
        std::env::set_var("KITH_MAX_CONCURRENCY", "not-a-number");

        let config = PipelineConfig::from_env();
        assert_eq!(config.stability_threshold, Duration::from_millis(750));
        assert!(!config.auto_recognize);
        assert_eq!(config.quality_drop, QualityDropPolicy::Pause);
        assert_eq!(config.source_mode, SourceMode::Phone);
        // Unparseable values fall back to the default.
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);

        std::env::remove_var("KITH_STABILITY_MS");
        std::env::remove_var("KITH_AUTO_RECOGNIZE");
        std::env::remove_var("KITH_QUALITY_DROP");
        std::env::remove_var("KITH_SOURCE");
        std::env::remove_var("KITH_MAX_CONCURRENCY");
    }
}
