//! Frame sampling behind an opaque trait.
//!
//! The default implementation shells out to `ffmpeg`, the same way the rest
//! of this codebase drives media tooling, and never links decoder libraries
//! into the pipeline process.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use video_caption_common::{CaptionError, EncodedFrame, Result};

/// Opaque source of per-video frame sequences.
///
/// Implementations must return at most `max_frames` frames, in display
/// order. Returning zero frames for a readable video is allowed here and
/// rejected later by the conversation formatter, which owns the
/// data-integrity invariant.
pub trait FrameSampler: Send + Sync {
    fn sample(&self, path: &Path, max_frames: usize) -> Result<Vec<EncodedFrame>>;
}

/// Frame sampler that extracts evenly spaced JPEG frames via an `ffmpeg`
/// subprocess.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSampler;

impl FfmpegFrameSampler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse `Duration: HH:MM:SS.cs` from ffmpeg's banner output
    fn parse_duration(stderr: &str) -> Option<f64> {
        let line = stderr.lines().find(|l| l.contains("Duration:"))?;
        let start = line.find("Duration:")? + "Duration:".len();
        let rest = line[start..].trim_start();
        let stamp = rest.split(',').next()?.trim();

        let mut parts = stamp.split(':');
        let hours: f64 = parts.next()?.parse().ok()?;
        let minutes: f64 = parts.next()?.parse().ok()?;
        let seconds: f64 = parts.next()?.parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    fn probe_duration(&self, path: &Path) -> Result<f64> {
        // `ffmpeg -i` with no output exits non-zero but still prints the
        // stream banner we need on stderr.
        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(path)
            .output()
            .map_err(|e| CaptionError::FFmpegError(format!("Failed to execute ffmpeg: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        Self::parse_duration(&stderr).ok_or_else(|| {
            CaptionError::FFmpegError(format!(
                "Could not parse duration for {}",
                path.display()
            ))
        })
    }

    /// Read the extracted frames back in display order and base64-encode
    /// them. Frame files sort lexicographically because ffmpeg numbers them
    /// with a zero-padded `%04d` pattern.
    fn encode_frames(scratch: &Path) -> Result<Vec<EncodedFrame>> {
        let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(scratch)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        frame_paths.sort();

        let mut frames = Vec::with_capacity(frame_paths.len());
        for frame_path in &frame_paths {
            let bytes = std::fs::read(frame_path)?;
            frames.push(EncodedFrame(BASE64.encode(bytes)));
        }
        Ok(frames)
    }
}

impl FrameSampler for FfmpegFrameSampler {
    fn sample(&self, path: &Path, max_frames: usize) -> Result<Vec<EncodedFrame>> {
        if !path.exists() {
            return Err(CaptionError::UnreadableSample {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }
        if max_frames == 0 {
            return Ok(Vec::new());
        }

        let duration = self.probe_duration(path)?;
        // Spread max_frames evenly across the video; fps must stay positive
        // for very short clips.
        let fps = max_frames as f64 / duration.max(0.001);

        // TempDir gives each extraction a unique directory, so concurrent
        // workers sampling same-stem videos never share output paths, and
        // its Drop cleans up on every return below.
        let scratch = tempfile::Builder::new()
            .prefix("frame_sample_")
            .tempdir()?;
        let pattern = scratch.path().join("frame_%04d.jpg");

        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(path)
            .arg("-vf")
            .arg(format!("fps={fps:.6}"))
            .arg("-frames:v")
            .arg(max_frames.to_string())
            .arg("-q:v")
            .arg("2")
            .arg("-y")
            .arg(&pattern)
            .output()
            .map_err(|e| CaptionError::FFmpegError(format!("Failed to execute ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptionError::UnreadableSample {
                path: path.to_path_buf(),
                reason: format!("ffmpeg frame extraction failed: {stderr}"),
            });
        }

        let frames = Self::encode_frames(scratch.path())?;
        debug!(
            "Sampled {} frames from {} ({:.2}s)",
            frames.len(),
            path.display(),
            duration
        );
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_from_ffmpeg_banner() {
        let stderr = "Input #0, mov,mp4, from 'clip.mp4':\n  Duration: 00:01:30.50, start: 0.000000, bitrate: 1200 kb/s\n";
        let duration = FfmpegFrameSampler::parse_duration(stderr).unwrap();
        assert!((duration - 90.5).abs() < 1e-9);
    }

    #[test]
    fn duration_parse_fails_without_banner() {
        assert!(FfmpegFrameSampler::parse_duration("no banner here").is_none());
    }

    #[test]
    fn missing_file_is_unreadable_sample() {
        let sampler = FfmpegFrameSampler::new();
        let err = sampler
            .sample(Path::new("/nonexistent/clip.mp4"), 8)
            .unwrap_err();
        assert!(matches!(err, CaptionError::UnreadableSample { .. }));
    }

    #[test]
    fn encoded_frames_come_back_in_display_order() {
        let scratch = tempfile::tempdir().unwrap();
        // Written out of order; the %04d naming must still sort correctly.
        std::fs::write(scratch.path().join("frame_0002.jpg"), b"second").unwrap();
        std::fs::write(scratch.path().join("frame_0010.jpg"), b"tenth").unwrap();
        std::fs::write(scratch.path().join("frame_0001.jpg"), b"first").unwrap();

        let frames = FfmpegFrameSampler::encode_frames(scratch.path()).unwrap();
        let payloads: Vec<_> = frames.iter().map(|f| f.0.as_str()).collect();
        assert_eq!(
            payloads,
            vec![
                BASE64.encode(b"first"),
                BASE64.encode(b"second"),
                BASE64.encode(b"tenth")
            ]
        );
    }

    #[test]
    fn encode_frames_on_missing_dir_is_an_error() {
        let scratch = tempfile::tempdir().unwrap();
        let gone = scratch.path().join("never_created");
        assert!(FfmpegFrameSampler::encode_frames(&gone).is_err());
    }

    #[test]
    fn zero_max_frames_short_circuits() {
        let sampler = FfmpegFrameSampler::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"not a real video").unwrap();

        let frames = sampler.sample(&path, 0).unwrap();
        assert!(frames.is_empty());
    }
}
