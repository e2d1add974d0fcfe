//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, scheduler, metadata providers, and quality
//! thresholds. Every section defaults sensibly so a completely empty `{}`
//! file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub metadata: MetadataConfig,
    pub quality: QualityThresholds,
    pub scan: ScanConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.metadata.tmdb_api_key.is_none() {
            warnings.push(
                "metadata.tmdb_api_key is not set; series and collection \
                 completeness jobs will fail"
                    .into(),
            );
        }

        if self.scheduler.history_capacity == 0 {
            warnings.push(
                "scheduler.history_capacity is 0; terminal jobs will not be retained".into(),
            );
        }

        for (tier, cutoffs) in [
            ("sd", &self.quality.sd),
            ("hd720", &self.quality.hd720),
            ("hd1080", &self.quality.hd1080),
            ("uhd4k", &self.quality.uhd4k),
        ] {
            if cutoffs.medium_kbps > cutoffs.high_kbps {
                warnings.push(format!(
                    "quality.{tier}: medium_kbps ({}) exceeds high_kbps ({})",
                    cutoffs.medium_kbps, cutoffs.high_kbps
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/curatorr.db"),
        }
    }
}

/// Job scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of terminal jobs retained in history (oldest evicted).
    pub history_capacity: usize,
    /// Broadcast channel capacity for scheduler/progress events.
    pub event_buffer: usize,
    /// Optional watchdog: when set, the running job's cancellation token is
    /// triggered after this many seconds. Cancellation stays cooperative, so
    /// a runner that never polls its token still blocks the slot.
    pub job_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            event_buffer: 256,
            job_timeout_secs: None,
        }
    }
}

/// Metadata provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub tmdb_api_key: Option<String>,
    pub language: String,
    /// MusicBrainz requires a meaningful User-Agent on every request.
    pub musicbrainz_user_agent: String,
    /// TMDB request budget per second.
    pub tmdb_requests_per_second: u32,
    /// MusicBrainz request budget per second (their policy is 1).
    pub musicbrainz_requests_per_second: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            language: "en-US".into(),
            musicbrainz_user_agent: concat!(
                "curatorr/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/curatorr/curatorr)"
            )
            .into(),
            tmdb_requests_per_second: 30,
            musicbrainz_requests_per_second: 1,
        }
    }
}

/// Local-folder scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// File extensions considered media files during a local scan.
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "mkv", "mp4", "m4v", "avi", "ts", "flac", "mp3", "m4a", "ogg", "opus",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Quality thresholds
// ---------------------------------------------------------------------------

/// Video bitrate cutoffs (kbps) for one resolution tier.
///
/// Effective bitrate below `medium_kbps` rates LOW, below `high_kbps` rates
/// MEDIUM, at or above `high_kbps` rates HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TierCutoffs {
    pub medium_kbps: u32,
    pub high_kbps: u32,
}

/// Per-tier video cutoffs plus the audio bitrate floor, used by the quality
/// classifier. Held in the server's config store behind a lock so a settings
/// change replaces the whole set at once (explicit cache invalidation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct QualityThresholds {
    pub sd: TierCutoffs,
    pub hd720: TierCutoffs,
    pub hd1080: TierCutoffs,
    pub uhd4k: TierCutoffs,
    /// Lossy audio at or above this bitrate rates MEDIUM; below rates LOW.
    pub audio_medium_kbps: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            sd: TierCutoffs {
                medium_kbps: 1_000,
                high_kbps: 2_000,
            },
            hd720: TierCutoffs {
                medium_kbps: 2_500,
                high_kbps: 5_000,
            },
            hd1080: TierCutoffs {
                medium_kbps: 4_000,
                high_kbps: 8_000,
            },
            uhd4k: TierCutoffs {
                medium_kbps: 10_000,
                high_kbps: 20_000,
            },
            audio_medium_kbps: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.scheduler.history_capacity, 50);
        assert!(cfg.scheduler.job_timeout_secs.is_none());
        assert_eq!(cfg.quality.hd1080.medium_kbps, 4_000);
        assert_eq!(cfg.metadata.musicbrainz_requests_per_second, 1);
    }

    #[test]
    fn default_config_warns_only_about_tmdb_key() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1, "unexpected warnings: {:?}", warnings);
        assert!(warnings[0].contains("tmdb_api_key"));
    }

    #[test]
    fn inverted_cutoffs_warn() {
        let mut cfg = Config::default();
        cfg.quality.hd1080 = TierCutoffs {
            medium_kbps: 9_000,
            high_kbps: 8_000,
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("quality.hd1080")));
    }

    #[test]
    fn zero_history_capacity_warns() {
        let mut cfg = Config::default();
        cfg.scheduler.history_capacity = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("history_capacity")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"server": {"port": 9090}, "scheduler": {"job_timeout_secs": 600}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.scheduler.job_timeout_secs, Some(600));
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.server.port, 8080);
    }
}
