use crate::annotate::GeminiAnnotator;
use crate::config::Config;
use crate::diarize::{CommandDiarizer, Diarizer};
use crate::error::{Result, VoxcutError};
use crate::media::{check_ffmpeg, check_ffprobe, extract_audio, extract_clip, wav_duration};
use crate::segment::{merge_turns, Segment};
use crate::separate::StemSeparator;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run the transcription/translation stage for each vocal stem.
    pub annotate: bool,
    /// Bounded concurrency for the per-segment loop. 1 processes segments
    /// sequentially in chronological order.
    pub concurrency: usize,
    /// Keep the per-segment audio clip after stems were derived from it.
    pub keep_clip_audio: bool,
    /// Show progress bars.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            annotate: true,
            concurrency: 1,
            keep_clip_audio: true,
            show_progress: true,
        }
    }
}

/// Pipeline stages, used to label logs and per-segment failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractingAudio,
    Diarizing,
    Merging,
    ExtractingClip,
    Separating,
    Annotating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ExtractingAudio => "audio extraction",
            Stage::Diarizing => "diarization",
            Stage::Merging => "merging",
            Stage::ExtractingClip => "clip extraction",
            Stage::Separating => "separation",
            Stage::Annotating => "annotation",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one segment's trip through the loop. Absent paths mean the
/// artifact was not produced, whether by failure or by soft absence.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub index: usize,
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    pub video_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub vocal_path: Option<PathBuf>,
    pub background_path: Option<PathBuf>,
    pub transcript_path: Option<PathBuf>,
    pub failure: Option<(Stage, String)>,
}

impl SegmentReport {
    fn new(segment: &Segment, index: usize) -> Self {
        Self {
            index,
            speaker: segment.speaker.clone(),
            start: segment.start,
            end: segment.end,
            video_path: None,
            audio_path: None,
            vocal_path: None,
            background_path: None,
            transcript_path: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn artifacts_produced(&self) -> usize {
        [
            self.video_path.is_some(),
            self.audio_path.is_some(),
            self.vocal_path.is_some(),
            self.background_path.is_some(),
            self.transcript_path.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Statistics from one run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub diarization_time: Duration,
    pub audio_duration_secs: f64,
    pub raw_turns: usize,
    pub segments_total: usize,
    pub segments_failed: usize,
}

/// Result of a full pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub output_dir: PathBuf,
    pub reports: Vec<SegmentReport>,
    pub stats: PipelineStats,
}

/// Run the full pipeline over one input video.
pub async fn run(
    input: &Path,
    output_dir: &Path,
    config: &Config,
    pipeline_config: PipelineConfig,
) -> Result<PipelineResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    run_with_cancel(input, output_dir, config, pipeline_config, cancelled).await
}

/// Run the full pipeline with cooperative cancellation: the flag is checked
/// between stages and between segments, the in-flight segment is finished,
/// and the run then stops with a non-zero status.
pub async fn run_with_cancel(
    input: &Path,
    output_dir: &Path,
    config: &Config,
    pipeline_config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let start_time = Instant::now();

    if !input.exists() {
        return Err(VoxcutError::FileNotFound(input.display().to_string()));
    }

    // Fatal dependency checks happen before any work is started.
    check_ffmpeg()?;
    check_ffprobe()?;

    let separator = StemSeparator::new(
        config.demucs_model.clone(),
        Duration::from_secs(config.separation_timeout_secs),
    );
    separator.check_available()?;

    let diarizer = CommandDiarizer::new(
        &config.diarizer_command,
        Duration::from_secs(config.diarization_timeout_secs),
    );
    diarizer.check_available()?;

    let annotator = if pipeline_config.annotate {
        let api_key = config.gemini_api_key.clone().ok_or_else(|| {
            VoxcutError::Config("GEMINI_API_KEY not set but annotation enabled".to_string())
        })?;
        Some(GeminiAnnotator::new(
            api_key,
            config.source_language.clone(),
            config.target_language.clone(),
            Duration::from_secs(config.annotation_timeout_secs),
        ))
    } else {
        None
    };

    std::fs::create_dir_all(output_dir)?;

    // The whole-input audio is intermediate; the TempDir releases it on
    // every exit path, including errors raised inside the loop.
    let temp_dir = TempDir::new()?;
    let audio_path = temp_dir.path().join("audio.wav");
    debug!("Staging whole-input audio at {}", audio_path.display());

    let multi_progress = pipeline_config.show_progress.then(MultiProgress::new);

    // ── Stage 1: whole-input audio extraction ──────────────────────────────
    info!("Stage 1/4 ({}): {}", Stage::ExtractingAudio, input.display());
    let extraction_start = Instant::now();

    let extraction_pb = spinner(&multi_progress, "Extracting audio...");
    extract_audio(input, &audio_path).await?;
    let audio_duration_secs = wav_duration(&audio_path).unwrap_or(0.0);
    if let Some(pb) = extraction_pb {
        pb.finish_with_message(format!("Audio extracted ({audio_duration_secs:.1}s)"));
    }
    let extraction_time = extraction_start.elapsed();

    check_cancelled(&cancelled)?;

    // ── Stage 2: diarization ───────────────────────────────────────────────
    info!("Stage 2/4 ({})", Stage::Diarizing);
    let diarization_start = Instant::now();

    let diarization_pb = spinner(&multi_progress, "Detecting speaker turns...");
    let turns = diarizer.diarize(&audio_path).await?;
    if let Some(pb) = diarization_pb {
        pb.finish_with_message(format!("Found {} raw turns", turns.len()));
    }
    let diarization_time = diarization_start.elapsed();
    info!("Diarization produced {} raw turns", turns.len());

    check_cancelled(&cancelled)?;

    // ── Stage 3: merging ───────────────────────────────────────────────────
    info!("Stage 3/4 ({})", Stage::Merging);
    let segments = merge_turns(&turns);
    info!(
        "Merged {} turns into {} speaker segments",
        turns.len(),
        segments.len()
    );

    if segments.is_empty() {
        warn!("No speaker segments detected; nothing to extract");
        return Ok(PipelineResult {
            output_dir: output_dir.to_path_buf(),
            reports: Vec::new(),
            stats: PipelineStats {
                total_time: start_time.elapsed(),
                extraction_time,
                diarization_time,
                audio_duration_secs,
                raw_turns: turns.len(),
                segments_total: 0,
                segments_failed: 0,
            },
        });
    }

    // ── Stage 4: per-segment loop ──────────────────────────────────────────
    info!(
        "Stage 4/4: processing {} segments (concurrency: {})",
        segments.len(),
        pipeline_config.concurrency
    );

    let progress_bar = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(segments.len() as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });

    let semaphore = Arc::new(Semaphore::new(pipeline_config.concurrency));
    let keep_clip_audio = pipeline_config.keep_clip_audio;
    let mut futures = FuturesUnordered::new();

    for (index, segment) in segments.iter().enumerate() {
        let sem = semaphore.clone();
        let cancelled = cancelled.clone();
        let pb = progress_bar.clone();
        let separator = &separator;
        let annotator = annotator.as_ref();
        let audio_path = &audio_path;

        futures.push(async move {
            let _permit = sem.acquire().await.expect("Semaphore closed");

            // Segments not yet started are abandoned on cancellation; the
            // in-flight ones run to completion.
            if cancelled.load(Ordering::Relaxed) {
                return None;
            }

            let report = process_segment(
                input,
                audio_path,
                segment,
                index,
                output_dir,
                separator,
                annotator,
                keep_clip_audio,
            )
            .await;

            if let Some(pb) = pb {
                pb.inc(1);
            }
            Some(report)
        });
    }

    let mut reports: Vec<SegmentReport> = Vec::with_capacity(segments.len());
    while let Some(outcome) = futures.next().await {
        if let Some(report) = outcome {
            reports.push(report);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Segments processed");
    }

    if cancelled.load(Ordering::Relaxed) {
        return Err(VoxcutError::Cancelled);
    }

    reports.sort_by_key(|r| r.index);

    let segments_failed = reports.iter().filter(|r| !r.succeeded()).count();
    info!(
        "Run complete: {}/{} segments fully succeeded in {:.2}s",
        reports.len() - segments_failed,
        reports.len(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(PipelineResult {
        output_dir: output_dir.to_path_buf(),
        reports,
        stats: PipelineStats {
            total_time: start_time.elapsed(),
            extraction_time,
            diarization_time,
            audio_duration_secs,
            raw_turns: turns.len(),
            segments_total: segments.len(),
            segments_failed,
        },
    })
}

/// Drive one segment through extraction, separation and annotation. Errors
/// are converted into the report's failure entry here, at the loop boundary,
/// so one bad segment never aborts the run.
#[allow(clippy::too_many_arguments)]
async fn process_segment(
    video: &Path,
    audio: &Path,
    segment: &Segment,
    index: usize,
    output_dir: &Path,
    separator: &StemSeparator,
    annotator: Option<&GeminiAnnotator>,
    keep_clip_audio: bool,
) -> SegmentReport {
    let mut report = SegmentReport::new(segment, index);

    debug!(
        "Segment {}: {} {:.2}-{:.2}s",
        index, segment.speaker, segment.start, segment.end
    );

    let clip = match extract_clip(video, audio, segment, index, output_dir).await {
        Ok(clip) => clip,
        Err(e) => {
            warn!("Segment {index}: {} failed: {e}", Stage::ExtractingClip);
            report.failure = Some((Stage::ExtractingClip, e.to_string()));
            return report;
        }
    };
    report.video_path = Some(clip.video_path.clone());
    report.audio_path = Some(clip.audio_path.clone());

    let stems = match separator.separate(&clip.audio_path, output_dir).await {
        Ok(stems) => stems,
        Err(e) => {
            warn!("Segment {index}: {} failed: {e}", Stage::Separating);
            report.failure = Some((Stage::Separating, e.to_string()));
            return report;
        }
    };
    report.vocal_path = stems.vocal_path.clone();
    report.background_path = stems.background_path.clone();

    // With stems derived, the clip audio has served its purpose; the caller
    // may have asked to reclaim it. The video clip is terminal output and is
    // never deleted.
    if !keep_clip_audio && !stems.is_empty() {
        match std::fs::remove_file(&clip.audio_path) {
            Ok(()) => report.audio_path = None,
            Err(e) => warn!(
                "Segment {index}: failed to remove clip audio {}: {e}",
                clip.audio_path.display()
            ),
        }
    }

    match (annotator, stems.vocal_path.as_deref()) {
        (Some(annotator), Some(vocal)) => {
            match annotator.annotate(vocal, output_dir).await {
                Ok(transcript) => report.transcript_path = Some(transcript.path),
                Err(e) => {
                    warn!("Segment {index}: {} failed: {e}", Stage::Annotating);
                    report.failure = Some((Stage::Annotating, e.to_string()));
                }
            }
        }
        (Some(_), None) => {
            debug!("Segment {index}: no vocal stem, transcript skipped");
        }
        (None, _) => {}
    }

    report
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        Err(VoxcutError::Cancelled)
    } else {
        Ok(())
    }
}

fn spinner(multi_progress: &Option<MultiProgress>, message: &str) -> Option<ProgressBar> {
    multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    })
}

/// Print the per-segment outcome summary: which artifacts exist, which
/// stages failed or were skipped. A run never ends with silent partial
/// output.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                        Extraction Complete                     ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:    {}", result.output_dir.display());
    println!(
        "  Audio:     {:.1}s, {} raw turns, {} segments",
        result.stats.audio_duration_secs, result.stats.raw_turns, result.stats.segments_total
    );
    println!();

    for report in &result.reports {
        let mut artifacts = Vec::new();
        if report.video_path.is_some() {
            artifacts.push("video");
        }
        if report.audio_path.is_some() {
            artifacts.push("audio");
        }
        if report.vocal_path.is_some() {
            artifacts.push("vocal");
        }
        if report.background_path.is_some() {
            artifacts.push("background");
        }
        match &report.transcript_path {
            Some(_) => artifacts.push("transcript"),
            None if report.vocal_path.is_none() => artifacts.push("transcript skipped"),
            None => {}
        }

        let artifacts = if artifacts.is_empty() {
            "none".to_string()
        } else {
            artifacts.join(", ")
        };

        match &report.failure {
            Some((stage, message)) => println!(
                "  [{:>3}] {} {:>7.1}-{:<7.1}s  {} — {} failed: {}",
                report.index, report.speaker, report.start, report.end, artifacts, stage, message
            ),
            None => println!(
                "  [{:>3}] {} {:>7.1}-{:<7.1}s  {}",
                report.index, report.speaker, report.start, report.end, artifacts
            ),
        }
    }

    println!();
    println!(
        "  Timing:    extract {:.2}s, diarize {:.2}s, total {:.2}s",
        result.stats.extraction_time.as_secs_f64(),
        result.stats.diarization_time.as_secs_f64(),
        result.stats.total_time.as_secs_f64()
    );
    if result.stats.segments_failed > 0 {
        println!(
            "  Failures:  {} of {} segments (see above)",
            result.stats.segments_failed, result.stats.segments_total
        );
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
