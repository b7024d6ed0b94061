//! Durable result persistence, decoupled from inference.
//!
//! One dedicated worker thread consumes batches from a bounded channel and
//! appends them to two parallel output files. Each dequeued batch is one
//! atomic append unit: all of its filenames go to `videos.txt` and all of
//! its prompts to `captions.txt` before the next batch is touched, so line i
//! of both files always refers to the same sample. A type-distinct
//! [`WriterMessage::Shutdown`] sentinel terminates the worker; the dequeue
//! loop polls with a finite timeout so it stays responsive to it.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};
use video_caption_common::{CaptionError, Result};

/// Filenames output file
pub const VIDEOS_FILE: &str = "videos.txt";
/// Captions output file
pub const CAPTIONS_FILE: &str = "captions.txt";

const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// One atomic append unit: N filenames paired with N prompt texts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBatch {
    pub filenames: Vec<String>,
    pub prompts: Vec<String>,
}

/// Queue message for the writer worker
#[derive(Debug, Clone)]
pub enum WriterMessage {
    Results(ResultBatch),
    /// End-of-stream sentinel; never a real payload
    Shutdown,
}

/// Handle to the writer worker thread
pub struct ResultWriter {
    sender: Sender<WriterMessage>,
    worker: JoinHandle<Result<usize>>,
}

impl ResultWriter {
    /// Create the output directory and spawn the worker.
    pub fn spawn(output_dir: &Path, queue_capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;

        let (sender, receiver) = bounded::<WriterMessage>(queue_capacity.max(1));
        let videos_path = output_dir.join(VIDEOS_FILE);
        let captions_path = output_dir.join(CAPTIONS_FILE);

        let worker = thread::spawn(move || {
            let mut batches_written = 0usize;
            loop {
                match receiver.recv_timeout(DEQUEUE_TIMEOUT) {
                    Ok(WriterMessage::Results(batch)) => {
                        write_batch(&videos_path, &captions_path, &batch)?;
                        batches_written += 1;
                    }
                    Ok(WriterMessage::Shutdown) => {
                        debug!("Writer received shutdown sentinel");
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        // Producer dropped without a sentinel; treat as shutdown
                        // so already-written output stays intact.
                        error!("Writer channel disconnected before shutdown sentinel");
                        break;
                    }
                }
            }
            Ok(batches_written)
        });

        Ok(Self { sender, worker })
    }

    /// Queue one batch for durable appending. Blocks while the queue is full.
    pub fn enqueue(&self, batch: ResultBatch) -> Result<()> {
        self.sender
            .send(WriterMessage::Results(batch))
            .map_err(|_| CaptionError::Writer("writer thread is gone".to_string()))
    }

    /// Enqueue the shutdown sentinel, join the worker, and surface any write
    /// error. Called exactly once, on both the success and error paths.
    pub fn finish(self) -> Result<usize> {
        // A failed send means the worker already exited; join below will
        // surface its error.
        let _ = self.sender.send(WriterMessage::Shutdown);
        drop(self.sender);

        let batches = self
            .worker
            .join()
            .map_err(|_| CaptionError::WorkerPanic("result writer".to_string()))??;
        info!("Writer flushed {batches} batches");
        Ok(batches)
    }
}

/// Append one batch to both output streams as a unit.
///
/// Files are opened in append mode per flush and never truncated mid-run,
/// except to roll back: if the captions append fails after the videos
/// append succeeded, the videos file is truncated back to its prior length
/// so the two files never advance by different line counts.
fn write_batch(videos_path: &PathBuf, captions_path: &PathBuf, batch: &ResultBatch) -> Result<()> {
    if batch.filenames.len() != batch.prompts.len() {
        return Err(CaptionError::Writer(format!(
            "batch has {} filenames but {} prompts",
            batch.filenames.len(),
            batch.prompts.len()
        )));
    }

    let videos_len = std::fs::metadata(videos_path).map(|m| m.len()).unwrap_or(0);

    append_lines(videos_path, &batch.filenames)?;
    if let Err(err) = append_lines(captions_path, &batch.prompts) {
        if let Err(rollback_err) = truncate_to(videos_path, videos_len) {
            error!("Rollback of videos append failed: {rollback_err}");
        }
        return Err(err);
    }
    Ok(())
}

fn truncate_to(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    Ok(())
}

fn append_lines(path: &PathBuf, lines: &[String]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buffer = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        buffer.push_str(line);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn batch(names: &[&str]) -> ResultBatch {
        ResultBatch {
            filenames: names.iter().map(|n| format!("{n}.mp4")).collect(),
            prompts: names.iter().map(|n| format!("prompt for {n}")).collect(),
        }
    }

    #[test]
    fn writes_paired_lines_across_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();

        writer.enqueue(batch(&["a", "b"])).unwrap();
        writer.enqueue(batch(&["c"])).unwrap();
        let batches = writer.finish().unwrap();
        assert_eq!(batches, 2);

        let videos = read_lines(&dir.path().join(VIDEOS_FILE));
        let captions = read_lines(&dir.path().join(CAPTIONS_FILE));
        assert_eq!(videos.len(), captions.len());
        assert_eq!(videos, vec!["a.mp4", "b.mp4", "c.mp4"]);
        assert_eq!(
            captions,
            vec!["prompt for a", "prompt for b", "prompt for c"]
        );
    }

    #[test]
    fn each_filename_appears_once_at_matching_index() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::spawn(dir.path(), 2).unwrap();

        for chunk in [&["x", "y"][..], &["z"][..]] {
            writer.enqueue(batch(chunk)).unwrap();
        }
        writer.finish().unwrap();

        let videos = read_lines(&dir.path().join(VIDEOS_FILE));
        let captions = read_lines(&dir.path().join(CAPTIONS_FILE));
        for (i, name) in videos.iter().enumerate() {
            assert_eq!(videos.iter().filter(|v| *v == name).count(), 1);
            let stem = name.trim_end_matches(".mp4");
            assert_eq!(captions[i], format!("prompt for {stem}"));
        }
    }

    #[test]
    fn shutdown_without_results_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();
        assert_eq!(writer.finish().unwrap(), 0);

        assert!(!dir.path().join(VIDEOS_FILE).exists());
        assert!(!dir.path().join(CAPTIONS_FILE).exists());
    }

    #[test]
    fn mismatched_batch_is_rejected_by_worker() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();

        writer
            .enqueue(ResultBatch {
                filenames: vec!["a.mp4".to_string()],
                prompts: vec![],
            })
            .unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn failed_captions_append_rolls_back_videos_append() {
        let dir = tempfile::tempdir().unwrap();

        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();
        writer.enqueue(batch(&["a"])).unwrap();
        writer.finish().unwrap();

        // Block the captions stream so the next batch's second append fails
        // after its videos append has already landed.
        std::fs::remove_file(dir.path().join(CAPTIONS_FILE)).unwrap();
        std::fs::create_dir(dir.path().join(CAPTIONS_FILE)).unwrap();

        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();
        writer.enqueue(batch(&["b", "c"])).unwrap();
        assert!(writer.finish().is_err());

        // The failed batch left no trace: the videos file still matches the
        // captions that were durably written before it.
        assert_eq!(read_lines(&dir.path().join(VIDEOS_FILE)), vec!["a.mp4"]);
    }

    #[test]
    fn failed_first_batch_leaves_equal_line_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(CAPTIONS_FILE)).unwrap();

        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();
        writer.enqueue(batch(&["a", "b"])).unwrap();
        assert!(writer.finish().is_err());

        let videos = read_lines(&dir.path().join(VIDEOS_FILE));
        assert!(videos.is_empty());
    }

    #[test]
    fn appends_across_runs_without_truncation() {
        let dir = tempfile::tempdir().unwrap();

        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();
        writer.enqueue(batch(&["a"])).unwrap();
        writer.finish().unwrap();

        let writer = ResultWriter::spawn(dir.path(), 4).unwrap();
        writer.enqueue(batch(&["b"])).unwrap();
        writer.finish().unwrap();

        assert_eq!(
            read_lines(&dir.path().join(VIDEOS_FILE)),
            vec!["a.mp4", "b.mp4"]
        );
    }
}
