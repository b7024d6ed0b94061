//! Video Caption CLI - Batch video-to-prompt generation
//!
//! Walks a directory of videos and produces one short generation prompt per
//! video in two sequential stages: a multimodal engine summarizes sampled
//! frames, then a text-only engine condenses each summary into a prompt.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use video_caption_frame_source::{
    discover_videos, FfmpegFrameSampler, FrameLoader, FrameLoaderConfig,
};
use video_caption_inference::{InferenceEngine, VllmEngine, VllmEngineConfig};
use video_caption_pipeline::{
    CaptionTask, PipelineConfig, ResultWriter, StageScheduler, DEFAULT_WORD_LIMIT,
    PROMPT_GEN_TEMPLATE, SUMMARY_USER_PROMPT,
};

#[derive(Parser)]
#[command(
    name = "video-caption",
    version,
    about = "Generate natural-language video prompts from a directory of videos",
    after_help = "EXAMPLES:\n  \
                  # Caption every .mp4 under ./clips into ./out\n  \
                  video-caption ./clips --output-dir ./out\n\n  \
                  # Multi-GPU, larger batches, cached model weights\n  \
                  video-caption ./clips -o ./out --num-devices 4 --batch-size 16 \\\n      \
                  --download-dir /models"
)]
struct Cli {
    /// Directory to scan recursively for videos, or a single video file
    video_dir: PathBuf,

    /// Directory receiving videos.txt and captions.txt
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Multimodal model used for frame summarization
    #[arg(long, default_value = "openbmb/MiniCPM-V-2_6")]
    summary_model: String,

    /// Text-only model used for prompt generation
    #[arg(long, default_value = "meta-llama/Meta-Llama-3.1-8B-Instruct")]
    prompt_model: String,

    /// Number of accelerator devices (tensor-parallel size)
    #[arg(long, default_value_t = 1)]
    num_devices: usize,

    /// Frames sampled per video, spread evenly across its duration
    #[arg(long, default_value_t = 8)]
    max_frames: usize,

    /// Token budget for each frame summary
    #[arg(long, default_value_t = 512)]
    max_summary_tokens: u32,

    /// Token budget for each generated prompt
    #[arg(long, default_value_t = 256)]
    max_prompt_tokens: u32,

    /// Word limit requested of the prompt-generation model
    #[arg(long, default_value_t = DEFAULT_WORD_LIMIT)]
    word_limit: u32,

    /// Override the summarization user prompt
    #[arg(long)]
    summary_prompt: Option<String>,

    /// Override the prompt-generation template ({summary} and
    /// {word_limit} are interpolated per sample)
    #[arg(long)]
    prompt_template: Option<String>,

    /// Video file extensions to pick up
    #[arg(long, value_delimiter = ',', default_value = ".mp4")]
    extensions: Vec<String>,

    /// Frame-decoding worker threads
    #[arg(long, default_value_t = 4)]
    data_workers: usize,

    /// Videos per inference request
    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    /// Finished batches buffered ahead of the writer thread
    #[arg(long, default_value_t = 16)]
    queue_capacity: usize,

    /// Model-weights cache directory
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Allow engines to execute model-provided code
    #[arg(long)]
    trust_remote_code: bool,

    /// Port the inference server listens on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let videos = discover_videos(&cli.video_dir, &cli.extensions)?;
    if videos.is_empty() {
        bail!(
            "No videos matching {:?} under {}",
            cli.extensions,
            cli.video_dir.display()
        );
    }
    info!("Found {} videos under {}", videos.len(), cli.video_dir.display());

    let loader = FrameLoader::spawn(
        videos,
        Arc::new(FfmpegFrameSampler::new()),
        &FrameLoaderConfig {
            num_workers: cli.data_workers,
            channel_capacity: cli.batch_size.max(1) * 2,
            max_frames: cli.max_frames,
        },
    );

    // The summarization engine sees a whole batch of frame sets per request;
    // the prompt engine is text-only and needs no image allowance.
    let mut summary_config = VllmEngineConfig::new(&cli.summary_model);
    summary_config.num_devices = cli.num_devices;
    summary_config.limit_images_per_request = Some(cli.batch_size * cli.max_frames);
    summary_config.download_dir = cli.download_dir.clone();
    summary_config.trust_remote_code = cli.trust_remote_code;
    summary_config.port = cli.port;

    let mut prompt_config = VllmEngineConfig::new(&cli.prompt_model);
    prompt_config.num_devices = cli.num_devices;
    prompt_config.download_dir = cli.download_dir.clone();
    prompt_config.trust_remote_code = cli.trust_remote_code;
    prompt_config.port = cli.port;

    let scheduler = StageScheduler::new(
        PipelineConfig {
            batch_size: cli.batch_size,
            max_summary_tokens: cli.max_summary_tokens,
            max_prompt_tokens: cli.max_prompt_tokens,
            summary_task: CaptionTask::Summarize {
                prompt: cli
                    .summary_prompt
                    .unwrap_or_else(|| SUMMARY_USER_PROMPT.to_string()),
                system_instruction: None,
            },
            prompt_task: CaptionTask::GeneratePrompt {
                template: cli
                    .prompt_template
                    .unwrap_or_else(|| PROMPT_GEN_TEMPLATE.to_string()),
                word_limit: cli.word_limit,
            },
        },
        Arc::new(move || {
            Ok(Box::new(VllmEngine::load(summary_config.clone())?) as Box<dyn InferenceEngine>)
        }),
        Arc::new(move || {
            Ok(Box::new(VllmEngine::load(prompt_config.clone())?) as Box<dyn InferenceEngine>)
        }),
    );

    let writer = ResultWriter::spawn(&cli.output_dir, cli.queue_capacity)?;
    let stats = scheduler.run(loader, writer)?;

    info!(
        "Done: {} videos captioned across {} batches, results in {}",
        stats.videos_processed,
        stats.batches_written,
        cli.output_dir.display()
    );
    Ok(())
}
