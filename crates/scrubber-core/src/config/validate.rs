//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_secs must be > 0".into(),
            ));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.transcode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.transcode_timeout_ms must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.image.quality) {
            return Err(ConfigError::ValidationError(
                "image.quality must be between 1 and 100".into(),
            ));
        }
        if self.video.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "video.ffmpeg_path must not be empty".into(),
            ));
        }
        for ext in &self.image.extensions {
            let ext = ext.trim_start_matches('.').to_lowercase();
            if self
                .video
                .extensions
                .iter()
                .any(|v| v.trim_start_matches('.').to_lowercase() == ext)
            {
                return Err(ConfigError::ValidationError(format!(
                    "extension '{ext}' is registered as both image and video"
                )));
            }
        }
        Ok(())
    }
}
