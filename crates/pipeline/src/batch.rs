//! Fixed-size batch grouping.
//!
//! Pure grouping with no inference-specific logic: arrival order is
//! preserved, every sample lands in exactly one batch, and the final batch
//! may be short.

use video_caption_common::{Batch, VideoSample};

/// Groups incoming samples into fixed-size batches
#[derive(Debug)]
pub struct BatchBuilder {
    batch_size: usize,
    current: Batch,
}

impl BatchBuilder {
    /// Create a builder.
    ///
    /// # Panics
    /// Panics if `batch_size` is zero.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        Self {
            batch_size,
            current: Batch::default(),
        }
    }

    /// Add a sample, returning a full batch once `batch_size` is reached
    pub fn push(&mut self, sample: VideoSample) -> Option<Batch> {
        self.current.push(sample);
        if self.current.len() == self.batch_size {
            Some(std::mem::take(&mut self.current))
        } else {
            None
        }
    }

    /// Take the final short batch, if any samples remain
    pub fn flush(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_caption_common::EncodedFrame;

    fn sample(name: &str) -> VideoSample {
        VideoSample {
            filename: name.to_string(),
            frames: vec![EncodedFrame("Zm9v".to_string())],
        }
    }

    #[test]
    fn ten_samples_batch_size_four_yields_4_4_2() {
        let mut builder = BatchBuilder::new(4);
        let mut batches = Vec::new();

        for i in 0..10 {
            if let Some(batch) = builder.push(sample(&format!("v{i}.mp4"))) {
                batches.push(batch);
            }
        }
        if let Some(batch) = builder.flush() {
            batches.push(batch);
        }

        let sizes: Vec<_> = batches.iter().map(video_caption_common::Batch::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn preserves_arrival_order_and_uniqueness() {
        let mut builder = BatchBuilder::new(3);
        let mut all_names = Vec::new();

        for i in 0..7 {
            if let Some(batch) = builder.push(sample(&format!("v{i}.mp4"))) {
                all_names.extend(batch.filenames);
            }
        }
        if let Some(batch) = builder.flush() {
            all_names.extend(batch.filenames);
        }

        let expected: Vec<_> = (0..7).map(|i| format!("v{i}.mp4")).collect();
        assert_eq!(all_names, expected);
    }

    #[test]
    fn flush_on_empty_builder_is_none() {
        let mut builder = BatchBuilder::new(4);
        assert!(builder.flush().is_none());
    }

    #[test]
    fn exact_multiple_leaves_nothing_to_flush() {
        let mut builder = BatchBuilder::new(2);
        assert!(builder.push(sample("a.mp4")).is_none());
        assert!(builder.push(sample("b.mp4")).is_some());
        assert!(builder.flush().is_none());
    }

    #[test]
    #[should_panic(expected = "batch_size must be positive")]
    fn zero_batch_size_panics() {
        let _ = BatchBuilder::new(0);
    }
}
