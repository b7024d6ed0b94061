//! Common types and utilities for the video captioning pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("Unsupported video extension: {0}")]
    UnsupportedExtension(String),

    #[error("Unreadable sample {path}: {reason}")]
    UnreadableSample { path: PathBuf, reason: String },

    #[error("Sample {0} has no frames")]
    EmptyFrameSet(String),

    #[error("Engine load failed: {0}")]
    EngineLoad(String),

    #[error("Engine request failed: {0}")]
    EngineRequest(String),

    #[error("Device busy: an engine is already loaded")]
    DeviceBusy,

    #[error("Response count mismatch: sent {requests} requests, got {responses} responses")]
    ResponseMisaligned { requests: usize, responses: usize },

    #[error("Result writer failed: {0}")]
    Writer(String),

    #[error("Worker thread panicked: {0}")]
    WorkerPanic(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, CaptionError>;

/// A single video frame encoded as a base64 JPEG data URL payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFrame(pub String);

impl EncodedFrame {
    /// Render the frame as an inline `data:` URL for chat image content
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.0)
    }
}

/// One decoded video: its identifier plus an ordered frame sequence.
/// Produced by the frame source, consumed exactly once by the batch builder.
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub filename: String,
    pub frames: Vec<EncodedFrame>,
}

/// A fixed-size group of samples submitted together to an inference engine.
///
/// Invariant: `filenames.len() == frames_per_sample.len()`, and index i of
/// every parallel vector refers to the same sample. Downstream pairing of
/// filenames to model outputs depends on this positional contract.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub filenames: Vec<String>,
    pub frames_per_sample: Vec<Vec<EncodedFrame>>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn push(&mut self, sample: VideoSample) {
        self.filenames.push(sample.filename);
        self.frames_per_sample.push(sample.frames);
    }
}

/// Stage-1 output for one batch: summaries positionally aligned with the
/// originating batch's filenames. Held in memory until stage 2 consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryBatch {
    pub filenames: Vec<String>,
    pub summaries: Vec<String>,
}

impl SummaryBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }
}

/// Final per-sample artifact: handed to the result writer as soon as it is
/// produced, never accumulated past the point of queuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub filename: String,
    pub prompt_text: String,
}

/// Message role in a chat conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One content block inside a chat message. Serializes into the
/// OpenAI-compatible wire shape consumed by the inference server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn image(frame: &EncodedFrame) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: frame.to_data_url(),
            },
        }
    }
}

/// A role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
        }
    }

    #[must_use]
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

/// A structured request payload for one sample. Ephemeral: exists only for
/// the duration of one inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Sampling configuration passed with every batch of conversations
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
}

impl SamplingParams {
    #[must_use]
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }
}
