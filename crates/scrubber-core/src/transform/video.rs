//! Video transform: re-mux through an external transcoder.
//!
//! The transcoder is run with global metadata mapping disabled and a fixed
//! codec configuration, so identical inputs produce comparable outputs.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{MediaKind, Transform};
use crate::config::VideoConfig;
use crate::error::{PipelineError, PipelineResult};

/// How much of the transcoder's stderr is kept in failure messages.
const STDERR_TAIL_CHARS: usize = 2000;

/// Transform for video files, backed by ffmpeg.
#[derive(Debug, Clone)]
pub struct VideoTransform {
    settings: VideoConfig,
    timeout_ms: u64,
}

impl VideoTransform {
    pub fn new(settings: VideoConfig, timeout_ms: u64) -> Self {
        Self {
            settings,
            timeout_ms,
        }
    }

    /// Full argument list for one invocation.
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let s = &self.settings;
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.as_os_str().to_owned(),
            "-map_metadata".into(),
            "-1".into(),
            "-c:v".into(),
            s.video_codec.as_str().into(),
            "-crf".into(),
            s.crf.to_string().into(),
            "-preset".into(),
            s.preset.as_str().into(),
            "-c:a".into(),
            s.audio_codec.as_str().into(),
            "-b:a".into(),
            s.audio_bitrate.as_str().into(),
        ];
        if s.faststart {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
        args.push("-y".into());
        args.push(output.as_os_str().to_owned());
        args
    }

    fn transcode_error(input: &Path, message: impl Into<String>) -> PipelineError {
        PipelineError::Transcode {
            path: input.to_path_buf(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Transform for VideoTransform {
    fn name(&self) -> &str {
        "video"
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn output_extension(&self) -> &str {
        "mp4"
    }

    async fn apply(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        let program = &self.settings.ffmpeg_path;
        let mut cmd = Command::new(program);
        cmd.args(self.arguments(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %program.display(),
            input = %input.display(),
            "Invoking transcoder"
        );

        let child = cmd.spawn().map_err(|e| {
            Self::transcode_error(input, format!("failed to spawn {}: {e}", program.display()))
        })?;

        // Dropping the wait future on timeout kills the child (kill_on_drop)
        let waited = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            child.wait_with_output(),
        )
        .await;

        let result = match waited {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(Self::transcode_error(
                    input,
                    format!("I/O error waiting for transcoder: {e}"),
                ))
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: input.to_path_buf(),
                    stage: "transcode".to_string(),
                    timeout_ms: self.timeout_ms,
                })
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Self::transcode_error(
                input,
                format!("exited with {}: {}", result.status, tail(stderr.trim())),
            ));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(Self::transcode_error(input, "transcoder produced an empty file")),
            Err(e) => Err(Self::transcode_error(
                input,
                format!("transcoder output unreadable: {e}"),
            )),
        }
    }
}

fn tail(text: &str) -> &str {
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text;
    }
    let skip = count - STDERR_TAIL_CHARS;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(program: impl Into<PathBuf>) -> VideoConfig {
        VideoConfig {
            ffmpeg_path: program.into(),
            ..VideoConfig::default()
        }
    }

    #[test]
    fn test_arguments_strip_metadata_with_fixed_codecs() {
        let transform = VideoTransform::new(VideoConfig::default(), 1000);
        let args: Vec<String> = transform
            .arguments(Path::new("/in/clip.mov"), Path::new("/out/clip.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-i",
                "/in/clip.mov",
                "-map_metadata",
                "-1",
                "-c:v",
                "libx264",
                "-crf",
                "23",
                "-preset",
                "medium",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-movflags",
                "+faststart",
                "-y",
                "/out/clip.mp4",
            ]
        );
    }

    #[test]
    fn test_faststart_can_be_disabled() {
        let mut config = VideoConfig::default();
        config.faststart = false;
        let args = VideoTransform::new(config, 1000)
            .arguments(Path::new("a.mov"), Path::new("b.mp4"));
        assert!(!args.iter().any(|a| a == "-movflags"));
    }

    #[test]
    fn test_tail_keeps_end() {
        let long = "x".repeat(STDERR_TAIL_CHARS) + "END";
        let t = tail(&long);
        assert_eq!(t.chars().count(), STDERR_TAIL_CHARS);
        assert!(t.ends_with("END"));
        assert_eq!(tail("short"), "short");
    }

    #[tokio::test]
    async fn test_missing_program_is_transcode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transform = VideoTransform::new(settings("nonexistent_transcoder_xyz_12345"), 1000);
        let err = transform
            .apply(&dir.path().join("in.mov"), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transcode { .. }));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[cfg(unix)]
    mod fake_transcoder {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_success_writes_last_argument() {
            let dir = tempfile::tempdir().unwrap();
            // The output path is the final argument
            let program = script(
                dir.path(),
                "ok.sh",
                "for last; do true; done; echo transcoded > \"$last\"",
            );
            let output = dir.path().join("out.mp4");

            VideoTransform::new(settings(program), 5000)
                .apply(&dir.path().join("in.mov"), &output)
                .await
                .unwrap();
            assert_eq!(std::fs::read_to_string(&output).unwrap(), "transcoded\n");
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "fail.sh", "echo 'moov atom not found' >&2; exit 1");

            let err = VideoTransform::new(settings(program), 5000)
                .apply(&dir.path().join("in.mov"), &dir.path().join("out.mp4"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), crate::error::FailureKind::TranscodeFailure);
            assert!(err.to_string().contains("moov atom not found"));
        }

        #[tokio::test]
        async fn test_zero_exit_without_output_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "noop.sh", "exit 0");

            let err = VideoTransform::new(settings(program), 5000)
                .apply(&dir.path().join("in.mov"), &dir.path().join("out.mp4"))
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::Transcode { .. }));
        }

        #[tokio::test]
        async fn test_empty_output_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "empty.sh", "for last; do true; done; : > \"$last\"");

            let err = VideoTransform::new(settings(program), 5000)
                .apply(&dir.path().join("in.mov"), &dir.path().join("out.mp4"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("empty"));
        }

        #[tokio::test]
        async fn test_timeout_kills_transcoder() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "slow.sh", "sleep 10");

            let started = std::time::Instant::now();
            let err = VideoTransform::new(settings(program), 100)
                .apply(&dir.path().join("in.mov"), &dir.path().join("out.mp4"))
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::Timeout { ref stage, .. } if stage == "transcode"));
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
