//! Two-stage video captioning pipeline.
//!
//! Stage 1 summarizes every video's frames with a multimodal engine; stage 2
//! condenses each summary into a short generation prompt with a text-only
//! engine. The stages run strictly sequentially so the two large models
//! never coexist in device memory, and finished prompts are persisted by a
//! dedicated writer thread behind a bounded queue.

mod batch;
mod prompts;
mod scheduler;
mod task;
mod writer;

pub use batch::BatchBuilder;
pub use prompts::{DEFAULT_WORD_LIMIT, PROMPT_GEN_TEMPLATE, SUMMARY_USER_PROMPT, SYSTEM_PROMPT};
pub use scheduler::{strip_surrounding_quotes, EngineLoader, PipelineConfig, RunStats, StageScheduler};
pub use task::{build_prompt_conversations, build_summary_conversations, CaptionTask};
pub use writer::{ResultBatch, ResultWriter, WriterMessage};
