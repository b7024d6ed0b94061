//! Two-stage scheduler.
//!
//! Phases run strictly sequentially with no branching:
//! load the summary engine, summarize the whole corpus into memory, tear
//! the engine down (hard barrier: device memory cannot hold both models),
//! load the prompt engine, generate and enqueue all prompts, then drain the
//! writer. The drain step also runs on the error path, so the writer thread
//! is never orphaned and already-produced output is flushed before the
//! error propagates.

use std::sync::Arc;
use tracing::{error, info};
use video_caption_common::{CaptionError, Result, SamplingParams, SummaryBatch};
use video_caption_frame_source::FrameLoader;
use video_caption_inference::{DeviceSlot, EngineGuard, InferenceEngine};

use crate::batch::BatchBuilder;
use crate::task::{build_prompt_conversations, build_summary_conversations, CaptionTask};
use crate::writer::{ResultBatch, ResultWriter};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_summary_tokens: u32,
    pub max_prompt_tokens: u32,
    pub summary_task: CaptionTask,
    pub prompt_task: CaptionTask,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            max_summary_tokens: 512,
            max_prompt_tokens: 256,
            summary_task: CaptionTask::summarize_default(),
            prompt_task: CaptionTask::generate_prompt_default(),
        }
    }
}

/// Counters reported after a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub videos_processed: usize,
    pub batches_written: usize,
}

/// Loader callback producing a stage engine
pub type EngineLoader = Arc<dyn Fn() -> Result<Box<dyn InferenceEngine>> + Send + Sync>;

/// Orchestrates the two sequential inference stages
pub struct StageScheduler {
    config: PipelineConfig,
    device: DeviceSlot,
    summary_loader: EngineLoader,
    prompt_loader: EngineLoader,
}

impl StageScheduler {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        summary_loader: EngineLoader,
        prompt_loader: EngineLoader,
    ) -> Self {
        Self {
            config,
            device: DeviceSlot::new(),
            summary_loader,
            prompt_loader,
        }
    }

    /// Run both stages over the corpus and drain the writer.
    ///
    /// The writer's shutdown sentinel is enqueued exactly once, after the
    /// last real item on success or immediately on failure, and the writer
    /// is joined before this returns either way.
    pub fn run(&self, loader: FrameLoader, writer: ResultWriter) -> Result<RunStats> {
        let outcome = self.run_stages(loader, &writer);
        let drain = writer.finish();

        match (outcome, drain) {
            (Ok(videos_processed), Ok(batches_written)) => {
                info!("All stages complete; caption generation and saving done");
                Ok(RunStats {
                    videos_processed,
                    batches_written,
                })
            }
            (Err(err), drain) => {
                if let Err(drain_err) = drain {
                    error!("Writer drain after failure also failed: {drain_err}");
                }
                Err(err)
            }
            (Ok(_), Err(drain_err)) => Err(drain_err),
        }
    }

    fn run_stages(&self, loader: FrameLoader, writer: &ResultWriter) -> Result<usize> {
        // Phase 1+2: load the multimodal engine and summarize the corpus.
        let summaries = {
            let engine = self.device.acquire(|| (self.summary_loader)())?;
            let summaries = self.summarize_all(&engine, loader)?;
            // Phase 3: hard barrier. The next load assumes a clear device,
            // so teardown must complete before the prompt engine is touched.
            engine.release()?;
            summaries
        };

        let videos_processed = summaries.iter().map(SummaryBatch::len).sum();

        // Phase 4+5: load the text engine and generate prompts.
        let engine = self.device.acquire(|| (self.prompt_loader)())?;
        let result = self.generate_all(&engine, &summaries, writer);
        engine.release()?;
        result?;

        Ok(videos_processed)
    }

    /// Phase 2: summarize every batch, accumulating results in memory.
    ///
    /// Summaries are an intermediate artifact and are never persisted; no
    /// output exists until a prompt has been generated for it.
    fn summarize_all(
        &self,
        engine: &EngineGuard,
        loader: FrameLoader,
    ) -> Result<Vec<SummaryBatch>> {
        let CaptionTask::Summarize {
            prompt,
            system_instruction,
        } = &self.config.summary_task
        else {
            return Err(CaptionError::Other(
                "summary stage configured with a non-summarize task".to_string(),
            ));
        };

        let sampling = SamplingParams::new(self.config.max_summary_tokens);
        let mut builder = BatchBuilder::new(self.config.batch_size);
        let mut summaries = Vec::with_capacity(16);

        let mut process = |batch| -> Result<()> {
            summaries.push(self.summarize_batch(
                engine,
                batch,
                prompt,
                system_instruction.as_deref(),
                &sampling,
            )?);
            Ok(())
        };

        for item in &loader {
            // A malformed sample fails the run; dropping it here would
            // desynchronize filename/output pairing.
            let sample = item?;
            if let Some(batch) = builder.push(sample) {
                process(batch)?;
            }
        }
        if let Some(batch) = builder.flush() {
            process(batch)?;
        }
        loader.join()?;

        let total: usize = summaries.iter().map(SummaryBatch::len).sum();
        info!("Stage 1 complete: {total} videos summarized");
        Ok(summaries)
    }

    fn summarize_batch(
        &self,
        engine: &EngineGuard,
        batch: video_caption_common::Batch,
        prompt: &str,
        system_instruction: Option<&str>,
        sampling: &SamplingParams,
    ) -> Result<SummaryBatch> {
        let conversations = build_summary_conversations(&batch, prompt, system_instruction)?;
        let responses = engine.engine().chat(&conversations, sampling)?;
        ensure_aligned(conversations.len(), responses.len())?;

        Ok(SummaryBatch {
            filenames: batch.filenames,
            summaries: responses.into_iter().map(|r| r.text).collect(),
        })
    }

    /// Phase 5: generate prompts per summary batch and enqueue them
    /// immediately; prompt records are never accumulated past queuing.
    fn generate_all(
        &self,
        engine: &EngineGuard,
        summaries: &[SummaryBatch],
        writer: &ResultWriter,
    ) -> Result<()> {
        let CaptionTask::GeneratePrompt {
            template,
            word_limit,
        } = &self.config.prompt_task
        else {
            return Err(CaptionError::Other(
                "prompt stage configured with a non-prompt task".to_string(),
            ));
        };

        let sampling = SamplingParams::new(self.config.max_prompt_tokens);

        for summary_batch in summaries {
            let conversations = build_prompt_conversations(summary_batch, template, *word_limit);
            let responses = engine.engine().chat(&conversations, &sampling)?;
            ensure_aligned(conversations.len(), responses.len())?;

            let prompts = responses
                .into_iter()
                .map(|r| strip_surrounding_quotes(&r.text).to_string())
                .collect();

            writer.enqueue(ResultBatch {
                filenames: summary_batch.filenames.clone(),
                prompts,
            })?;
        }

        info!("Stage 2 complete: all prompt batches queued");
        Ok(())
    }
}

fn ensure_aligned(requests: usize, responses: usize) -> Result<()> {
    if requests == responses {
        Ok(())
    } else {
        Err(CaptionError::ResponseMisaligned {
            requests,
            responses,
        })
    }
}

/// Drop the model's surrounding quotation marks: one leading and one
/// trailing character. Strings shorter than 2 characters pass through
/// unchanged.
#[must_use]
pub fn strip_surrounding_quotes(text: &str) -> &str {
    let mut chars = text.chars();
    let (Some(_), Some(_)) = (chars.next(), chars.next_back()) else {
        return text;
    };
    chars.as_str()
}
