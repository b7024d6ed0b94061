//! Conversation construction for the two caption tasks.
//!
//! Both builders uphold the positional contract: the output sequence has
//! exactly the length and order of the input batch, because the engine
//! returns outputs in input order and downstream pairing of filenames to
//! outputs depends on it. A malformed sample is an error, never a skip.

use video_caption_common::{
    Batch, CaptionError, ContentPart, Conversation, Message, Result, SummaryBatch,
};

use crate::prompts::{DEFAULT_WORD_LIMIT, PROMPT_GEN_TEMPLATE, SUMMARY_USER_PROMPT, SYSTEM_PROMPT};

/// Task variant selecting how conversations are constructed
#[derive(Debug, Clone)]
pub enum CaptionTask {
    /// Describe a video from its frames.
    ///
    /// `system_instruction` is a per-task slot that deliberately defaults
    /// to absent for this task in the current configuration.
    Summarize {
        prompt: String,
        system_instruction: Option<String>,
    },
    /// Condense a summary into a generation prompt
    GeneratePrompt { template: String, word_limit: u32 },
}

impl CaptionTask {
    #[must_use]
    pub fn summarize_default() -> Self {
        Self::Summarize {
            prompt: SUMMARY_USER_PROMPT.to_string(),
            system_instruction: None,
        }
    }

    #[must_use]
    pub fn generate_prompt_default() -> Self {
        Self::GeneratePrompt {
            template: PROMPT_GEN_TEMPLATE.to_string(),
            word_limit: DEFAULT_WORD_LIMIT,
        }
    }
}

/// Build one multimodal conversation per sample: the task prompt followed by
/// every frame of that sample as inline image content.
///
/// # Errors
/// Fails on a sample with zero frames. Skipping it instead would
/// desynchronize the filename/output pairing for the rest of the batch.
pub fn build_summary_conversations(
    batch: &Batch,
    prompt: &str,
    system_instruction: Option<&str>,
) -> Result<Vec<Conversation>> {
    let mut conversations = Vec::with_capacity(batch.len());

    for (filename, frames) in batch.filenames.iter().zip(&batch.frames_per_sample) {
        if frames.is_empty() {
            return Err(CaptionError::EmptyFrameSet(filename.clone()));
        }

        let mut content = Vec::with_capacity(frames.len() + 1);
        content.push(ContentPart::text(prompt));
        for frame in frames {
            content.push(ContentPart::image(frame));
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(instruction) = system_instruction {
            messages.push(Message::system(instruction));
        }
        messages.push(Message::user(content));
        conversations.push(Conversation::new(messages));
    }

    Ok(conversations)
}

/// Build one text conversation per summary: the fixed system persona plus a
/// user turn interpolating the summary and word limit into the template.
#[must_use]
pub fn build_prompt_conversations(
    summaries: &SummaryBatch,
    template: &str,
    word_limit: u32,
) -> Vec<Conversation> {
    summaries
        .summaries
        .iter()
        .map(|summary| {
            let text = template
                .replace("{summary}", summary)
                .replace("{word_limit}", &word_limit.to_string());
            Conversation::new(vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(vec![ContentPart::text(text)]),
            ])
        })
        .collect()
}
