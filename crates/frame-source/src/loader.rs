//! Parallel prefetching loader.
//!
//! Worker threads pull paths from a shared channel, run the frame sampler,
//! and push finished samples through a bounded channel so decoding overlaps
//! inference without unbounded memory growth. A decode failure is forwarded
//! in-band rather than dropped: silently losing a sample would desynchronize
//! the filename/output pairing downstream.

use crossbeam_channel::{bounded, Receiver};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use video_caption_common::{CaptionError, Result, VideoSample};

use crate::sampler::FrameSampler;

/// Loader configuration
#[derive(Debug, Clone)]
pub struct FrameLoaderConfig {
    /// Number of parallel sampler threads
    pub num_workers: usize,
    /// Max samples buffered ahead of the consumer
    pub channel_capacity: usize,
    /// Max frames sampled per video
    pub max_frames: usize,
}

impl Default for FrameLoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            channel_capacity: 16,
            max_frames: 8,
        }
    }
}

/// Streaming source of decoded samples backed by worker threads
pub struct FrameLoader {
    receiver: Receiver<Result<VideoSample>>,
    workers: Vec<JoinHandle<()>>,
}

impl FrameLoader {
    /// Spawn sampler workers over the given corpus.
    ///
    /// Samples are yielded in completion order; each input path is yielded
    /// exactly once, either as a sample or as an error.
    #[must_use]
    pub fn spawn(
        paths: Vec<PathBuf>,
        sampler: Arc<dyn FrameSampler>,
        config: &FrameLoaderConfig,
    ) -> Self {
        let num_workers = config.num_workers.max(1);
        let (path_tx, path_rx) = bounded::<PathBuf>(paths.len().max(1));
        let (sample_tx, sample_rx) = bounded::<Result<VideoSample>>(config.channel_capacity.max(1));

        for path in paths {
            // Capacity equals corpus size, so this never blocks.
            let _ = path_tx.send(path);
        }
        drop(path_tx);

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let path_rx = path_rx.clone();
            let sample_tx = sample_tx.clone();
            let sampler = sampler.clone();
            let max_frames = config.max_frames;

            workers.push(thread::spawn(move || {
                while let Ok(path) = path_rx.recv() {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());

                    let message = sampler
                        .sample(&path, max_frames)
                        .map(|frames| VideoSample { filename, frames });

                    if let Err(err) = &message {
                        warn!("Worker {worker_id} failed on {}: {err}", path.display());
                    }
                    if sample_tx.send(message).is_err() {
                        // Consumer went away; nothing left to do.
                        break;
                    }
                }
                debug!("Loader worker {worker_id} finished");
            }));
        }

        Self {
            receiver: sample_rx,
            workers,
        }
    }

    /// Wait for all worker threads after the stream has been drained
    pub fn join(self) -> Result<()> {
        drop(self.receiver);
        for worker in self.workers {
            worker
                .join()
                .map_err(|_| CaptionError::WorkerPanic("frame loader worker".to_string()))?;
        }
        Ok(())
    }
}

impl Iterator for &FrameLoader {
    type Item = Result<VideoSample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use video_caption_common::EncodedFrame;

    struct StubSampler;

    impl FrameSampler for StubSampler {
        fn sample(&self, path: &Path, max_frames: usize) -> Result<Vec<EncodedFrame>> {
            if path.to_string_lossy().contains("bad") {
                return Err(CaptionError::UnreadableSample {
                    path: path.to_path_buf(),
                    reason: "stub failure".to_string(),
                });
            }
            Ok(vec![EncodedFrame("Zm9v".to_string()); max_frames])
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn yields_every_path_exactly_once() {
        let config = FrameLoaderConfig {
            num_workers: 3,
            channel_capacity: 2,
            max_frames: 2,
        };
        let loader = FrameLoader::spawn(
            paths(&["a.mp4", "b.mp4", "c.mp4", "d.mp4"]),
            Arc::new(StubSampler),
            &config,
        );

        let mut seen = HashSet::new();
        for item in &loader {
            let sample = item.unwrap();
            assert_eq!(sample.frames.len(), 2);
            assert!(seen.insert(sample.filename));
        }
        assert_eq!(seen.len(), 4);
        loader.join().unwrap();
    }

    #[test]
    fn decode_failure_is_forwarded_not_dropped() {
        let loader = FrameLoader::spawn(
            paths(&["ok.mp4", "bad.mp4"]),
            Arc::new(StubSampler),
            &FrameLoaderConfig::default(),
        );

        let results: Vec<_> = (&loader).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        loader.join().unwrap();
    }

    #[test]
    fn empty_corpus_terminates_immediately() {
        let loader = FrameLoader::spawn(
            Vec::new(),
            Arc::new(StubSampler),
            &FrameLoaderConfig::default(),
        );
        assert_eq!((&loader).count(), 0);
        loader.join().unwrap();
    }
}
