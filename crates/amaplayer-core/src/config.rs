use crate::error::Result;
use crate::paths;
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
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based):
    /// `min(base * multiplier^(retry - 1), max)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64).max(0.0)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}

// ---------------------------------------------------------------------------
// DebounceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebounceConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_window_ms() -> u64 {
    300
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

impl DebounceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

fn default_limit() -> u32 {
    20
}

fn default_max_limit() -> u32 {
    100
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            retry: RetryConfig::default(),
            debounce: DebounceConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load `amaplayer.yaml` from `root`. A missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: PipelineConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let retry = &self.retry;

        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "retry.backoff_multiplier={} must be a finite number >= 1",
                    retry.backoff_multiplier
                ),
            });
        }

        if retry.max_delay_ms < retry.base_delay_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "retry.max_delay_ms={} is below retry.base_delay_ms={}",
                    retry.max_delay_ms, retry.base_delay_ms
                ),
            });
        }

        if retry.base_delay_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry.base_delay_ms=0 retries without any backoff".to_string(),
            });
        }

        if retry.max_retries > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "retry.max_retries={} (>10 is unusual)",
                    retry.max_retries
                ),
            });
        }

        if self.debounce.window_ms > 5_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "debounce.window_ms={} delays every write by more than 5s",
                    self.debounce.window_ms
                ),
            });
        }

        if self.search.max_limit == 0 || self.search.default_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "search limits must be at least 1".to_string(),
            });
        } else if self.search.default_limit > self.search.max_limit {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "search.default_limit={} exceeds search.max_limit={}",
                    self.search.default_limit, self.search.max_limit
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = PipelineConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.retry.max_retries, 3);
        assert_eq!(parsed.debounce.window_ms, 300);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: PipelineConfig = serde_yaml::from_str("retry:\n  max_retries: 5\n").unwrap();
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.base_delay_ms, 1_000);
        assert_eq!(cfg.search.default_limit, 20);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig::load(dir.path()).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.debounce.window_ms = 150;
        cfg.save(dir.path()).unwrap();
        let loaded = PipelineConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.debounce.window_ms, 150);
    }

    #[test]
    fn delays_follow_exponential_backoff_with_cap() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(retry.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(retry.delay_for(4), Duration::from_millis(8_000));
        assert_eq!(retry.delay_for(5), Duration::from_millis(10_000));
        assert_eq!(retry.delay_for(60), Duration::from_millis(10_000));
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(PipelineConfig::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_inverted_delays_and_shrinking_backoff() {
        let mut cfg = PipelineConfig::default();
        cfg.retry.max_delay_ms = 10;
        cfg.retry.backoff_multiplier = 0.5;
        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn validate_flags_search_limits() {
        let mut cfg = PipelineConfig::default();
        cfg.search.default_limit = 500;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("default_limit"));
    }
}
