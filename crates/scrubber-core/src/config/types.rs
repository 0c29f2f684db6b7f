//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root directory holding one subdirectory per session
    pub work_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("~/.scrubber/workdir"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker pool ceiling: transforms running at once
    pub parallel_workers: usize,

    /// Treat video submissions as unsupported
    pub image_only: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 5,
            image_only: false,
        }
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is dropped from the registry
    pub ttl_secs: u64,

    /// How often the background sweep runs
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum submission size in megabytes
    pub max_file_size_mb: u64,

    /// Image decode + encode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Transcoder process timeout in milliseconds
    pub transcode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 1024,
            decode_timeout_ms: 30_000,
            transcode_timeout_ms: 30 * 60 * 1000,
        }
    }
}

/// Image re-encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// JPEG quality (1-100)
    pub quality: u8,

    /// Extensions dispatched to the image transform
    pub extensions: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut extensions: Vec<String> =
            ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        #[cfg(feature = "heic")]
        extensions.extend(
            crate::transform::heif::HEIF_EXTENSIONS
                .iter()
                .map(|s| s.to_string()),
        );

        Self {
            quality: 90,
            extensions,
        }
    }
}

/// External transcoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    pub ffmpeg_path: PathBuf,

    /// Video codec passed to `-c:v`
    pub video_codec: String,

    /// Constant rate factor passed to `-crf`
    pub crf: u8,

    /// Encoder preset passed to `-preset`
    pub preset: String,

    /// Audio codec passed to `-c:a`
    pub audio_codec: String,

    /// Audio bitrate passed to `-b:a`
    pub audio_bitrate: String,

    /// Move the moov atom to the front of the file
    pub faststart: bool,

    /// Extensions dispatched to the video transform
    pub extensions: Vec<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_codec: "libx264".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            faststart: true,
            extensions: vec!["mov".to_string(), "mp4".to_string()],
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
