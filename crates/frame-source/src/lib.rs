//! Frame source: video discovery, opaque frame sampling, and the parallel
//! prefetching loader.
//!
//! Frame decoding itself is kept behind the [`FrameSampler`] trait; the rest
//! of the pipeline only ever sees `VideoSample`s with already-encoded frames.
//! The loader overlaps I/O-bound decoding with GPU-bound inference by running
//! `num_workers` sampler threads behind a bounded channel.

mod loader;
mod sampler;

pub use loader::{FrameLoader, FrameLoaderConfig};
pub use sampler::{FfmpegFrameSampler, FrameSampler};

use std::path::{Path, PathBuf};
use tracing::debug;
use video_caption_common::{CaptionError, Result};

/// Recursively discover video files under `root`, filtered by extension.
/// A `root` that is itself a file must carry a recognized extension.
///
/// Extensions are matched case-insensitively and without the leading dot.
/// Inside a directory walk, non-matching files are skipped at this
/// boundary; an unreadable directory is an error. Results are sorted for a
/// stable corpus order.
pub fn discover_videos(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        if has_video_extension(root, extensions) {
            return Ok(vec![root.to_path_buf()]);
        }
        return Err(CaptionError::UnsupportedExtension(
            root.display().to_string(),
        ));
    }
    if !root.is_dir() {
        return Err(CaptionError::Other(format!(
            "Input directory not found: {}",
            root.display()
        )));
    }

    let mut videos = Vec::with_capacity(64);
    collect_videos(root, extensions, &mut videos)?;
    videos.sort();
    Ok(videos)
}

fn collect_videos(dir: &Path, extensions: &[String], out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_videos(&path, extensions, out)?;
        } else if has_video_extension(&path, extensions) {
            out.push(path);
        } else {
            debug!("Skipping non-video file: {}", path.display());
        }
    }
    Ok(())
}

fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec![".mp4".to_string(), "mov".to_string()]
    }

    #[test]
    fn discovers_only_matching_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("b.MOV"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let found = discover_videos(dir.path(), &exts()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MOV"]);
    }

    #[test]
    fn discovers_recursively_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/z.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();

        let found = discover_videos(dir.path(), &exts()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.mp4"));
        assert!(found[1].ends_with("sub/z.mp4"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = discover_videos(Path::new("/nonexistent/corpus"), &exts());
        assert!(result.is_err());
    }

    #[test]
    fn single_file_root_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let found = discover_videos(&path, &exts()).unwrap();
        assert_eq!(found, vec![path]);
    }

    #[test]
    fn single_file_with_wrong_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"x").unwrap();

        let err = discover_videos(&path, &exts()).unwrap_err();
        assert!(matches!(err, CaptionError::UnsupportedExtension(_)));
    }
}
