//! Inference engine contract and lifecycle management.
//!
//! Engines are opaque batched request/response services: the pipeline hands
//! them a sequence of conversations and expects a same-length, same-order
//! sequence of text responses. Both stage engines are large, so the
//! [`DeviceSlot`] enforces that only one is ever live on the accelerator.

mod lifecycle;
mod vllm;

pub use lifecycle::{DeviceSlot, EngineGuard};
pub use vllm::{VllmEngine, VllmEngineConfig};

use video_caption_common::{Conversation, Result, SamplingParams};

/// One model response, exposing its primary text output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
}

/// A loaded inference engine.
///
/// `chat` is synchronous and blocking per batch: the engine is expected to
/// batch internally, and callers depend on responses coming back in input
/// order. `shutdown` must not return until the engine's device resources
/// have actually been released, because the next engine load assumes a
/// clear device.
pub trait InferenceEngine: Send {
    fn chat(
        &self,
        conversations: &[Conversation],
        sampling: &SamplingParams,
    ) -> Result<Vec<ChatResponse>>;

    fn shutdown(self: Box<Self>) -> Result<()>;
}
