use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use voxcut::config::Config;
use voxcut::pipeline::{self, PipelineConfig};

#[derive(Parser)]
#[command(name = "voxcut")]
#[command(version, about = "Speaker-segmented clip extraction")]
#[command(
    long_about = "Split a recording into per-speaker clips, isolate vocal and background \
                  stems for each clip, and optionally produce bilingual transcripts."
)]
struct Cli {
    /// Input video file
    input: PathBuf,

    /// Output directory for per-segment artifacts
    #[arg(short, long, default_value = "segments")]
    output: PathBuf,

    /// Skip the transcription/translation stage
    #[arg(long)]
    no_annotate: bool,

    /// Number of segments processed concurrently
    #[arg(short, long, default_value = "1")]
    concurrency: usize,

    /// Separation model name
    #[arg(long)]
    model: Option<String>,

    /// Source language code (e.g. ta, ja, es)
    #[arg(short, long)]
    language: Option<String>,

    /// Target language for the translated transcript half
    #[arg(long)]
    translate_to: Option<String>,

    /// Delete each clip's audio once stems were derived from it
    #[arg(long)]
    discard_clip_audio: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(model) = cli.model {
        config.demucs_model = model;
    }
    if let Some(language) = cli.language {
        config.source_language = language;
    }
    if let Some(language) = cli.translate_to {
        config.target_language = language;
    }
    config.concurrency = cli.concurrency;

    let annotate = !cli.no_annotate;
    config
        .validate(annotate)
        .context("Configuration validation failed")?;

    let pipeline_config = PipelineConfig {
        annotate,
        concurrency: config.concurrency,
        keep_clip_audio: !cli.discard_clip_audio,
        show_progress: !cli.no_progress,
    };

    info!("Input:      {}", cli.input.display());
    info!("Output:     {}", cli.output.display());
    info!("Model:      {}", config.demucs_model);
    info!("Language:   {}", config.source_language);
    if annotate {
        info!("Translate:  {}", config.target_language);
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancelled.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling after the in-flight segment...");
        cancel_flag.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl+C handler")?;

    // Fatal errors exit non-zero here. Per-segment failures are enumerated in
    // the summary and do not change the exit code.
    let result = pipeline::run_with_cancel(
        &cli.input,
        &cli.output,
        &config,
        pipeline_config,
        cancelled,
    )
    .await
    .context("Pipeline run failed")?;

    pipeline::print_summary(&result);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["voxcut", "input.mp4"]);
        assert_eq!(cli.output, PathBuf::from("segments"));
        assert_eq!(cli.concurrency, 1);
        assert!(!cli.no_annotate);
        assert!(!cli.discard_clip_audio);
    }
}
