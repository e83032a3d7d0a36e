use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, VoxcutError};
use crate::segment::Segment;

use super::probe::media_duration;
use super::{ClipArtifact, MediaMetadata};

/// Tolerance when checking a segment against the probed source duration.
/// Diarization timestamps routinely land a few frames past the container end.
const DURATION_SLACK_SECS: f64 = 0.1;

/// Extract the full audio track from a video file as 44.1 kHz stereo PCM,
/// the input format the separation collaborator works best with.
pub async fn extract_audio(input: &Path, output: &Path) -> Result<MediaMetadata> {
    if !input.exists() {
        return Err(VoxcutError::FileNotFound(input.display().to_string()));
    }

    info!("Extracting audio from {}", input.display());

    let duration = media_duration(input)?;
    debug!("Input duration: {:.2}s", duration);

    let status = Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"])
        .arg(output)
        .status()
        .await
        .map_err(|e| VoxcutError::AudioExtraction(format!("Failed to run FFmpeg: {e}")))?;

    if !status.success() {
        return Err(VoxcutError::AudioExtraction(
            "FFmpeg audio extraction failed".to_string(),
        ));
    }

    if !output.exists() {
        return Err(VoxcutError::AudioExtraction(
            "Output file was not created".to_string(),
        ));
    }

    info!("Audio extracted to {}", output.display());

    Ok(MediaMetadata {
        duration_secs: duration,
        sample_rate: 44100,
        channels: 2,
    })
}

/// Slice the source video and audio to one segment's time range, writing
/// `<speaker>_segment_<i>.mp4` and `<speaker>_segment_<i>.wav` into
/// `output_dir`. Source media is never modified.
pub async fn extract_clip(
    video: &Path,
    audio: &Path,
    segment: &Segment,
    index: usize,
    output_dir: &Path,
) -> Result<ClipArtifact> {
    let source_duration = media_duration(video)?;
    if segment.start >= source_duration || segment.end > source_duration + DURATION_SLACK_SECS {
        return Err(VoxcutError::ClipExtraction(format!(
            "Segment {:.2}-{:.2}s is out of bounds for {:.2}s source",
            segment.start, segment.end, source_duration
        )));
    }
    if segment.duration() == 0.0 {
        return Err(VoxcutError::ClipExtraction(
            "Segment duration is zero".to_string(),
        ));
    }

    let stem = segment.artifact_stem(index);
    let video_path = output_dir.join(format!("{stem}.mp4"));
    let audio_path = output_dir.join(format!("{stem}.wav"));

    let start = format!("{:.3}", segment.start);
    let duration = format!("{:.3}", segment.duration());

    debug!(
        "Extracting clip {}: start={} duration={}",
        stem, start, duration
    );

    let video_status = Command::new("ffmpeg")
        .args(["-y", "-ss", start.as_str(), "-t", duration.as_str(), "-i"])
        .arg(video)
        .args(["-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac"])
        .arg(&video_path)
        .status()
        .await
        .map_err(|e| VoxcutError::ClipExtraction(format!("Failed to run FFmpeg: {e}")))?;

    if !video_status.success() {
        return Err(VoxcutError::ClipExtraction(format!(
            "FFmpeg failed writing {}",
            video_path.display()
        )));
    }

    let audio_status = Command::new("ffmpeg")
        .args(["-y", "-ss", start.as_str(), "-t", duration.as_str(), "-i"])
        .arg(audio)
        .args(["-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"])
        .arg(&audio_path)
        .status()
        .await
        .map_err(|e| VoxcutError::ClipExtraction(format!("Failed to run FFmpeg: {e}")))?;

    if !audio_status.success() {
        return Err(VoxcutError::ClipExtraction(format!(
            "FFmpeg failed writing {}",
            audio_path.display()
        )));
    }

    Ok(ClipArtifact {
        segment: segment.clone(),
        index,
        video_path,
        audio_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_audio_file_not_found() {
        let result = extract_audio(
            Path::new("/nonexistent/input.mp4"),
            Path::new("/tmp/out.wav"),
        )
        .await;
        assert!(matches!(result, Err(VoxcutError::FileNotFound(_))));
    }

    #[test]
    fn test_clip_paths_follow_segment_naming() {
        let segment = Segment {
            speaker: "SPEAKER_00".to_string(),
            start: 0.0,
            end: 5.0,
        };
        let stem = segment.artifact_stem(7);
        assert_eq!(stem, "SPEAKER_00_segment_7");

        let dir = Path::new("/tmp/out");
        assert_eq!(
            dir.join(format!("{stem}.mp4")),
            Path::new("/tmp/out/SPEAKER_00_segment_7.mp4")
        );
        assert_eq!(
            dir.join(format!("{stem}.wav")),
            Path::new("/tmp/out/SPEAKER_00_segment_7.wav")
        );
    }
}
