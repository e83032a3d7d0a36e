use crate::error::{Result, VoxcutError};
use crate::segment::{normalize_turns, RawTurn};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Source of raw speaker turns for an audio file.
///
/// The inference engine is a black box behind this trait; the pipeline only
/// sees an ordered, normalized turn list.
#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, audio: &Path) -> Result<Vec<RawTurn>>;
    fn name(&self) -> &'static str;
}

/// Diarizer that shells out to a configured external command with the audio
/// path appended as the last argument. The tool emits one JSON object per
/// stdout line: `{"speaker":"SPEAKER_00","start":0.03,"end":2.48}`.
pub struct CommandDiarizer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDiarizer {
    /// Build from a command string; whitespace splits program and fixed args.
    pub fn new(command: &str, timeout: Duration) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
            timeout,
        }
    }

    /// Check the diarization command is installed and accessible.
    pub fn check_available(&self) -> Result<()> {
        let output = std::process::Command::new(&self.program)
            .arg("--help")
            .output()
            .map_err(|e| {
                VoxcutError::DependencyMissing(format!(
                    "Diarization command '{}' not found. Ensure it is in your PATH. Error: {e}",
                    self.program
                ))
            })?;

        if !output.status.success() {
            return Err(VoxcutError::DependencyMissing(format!(
                "Diarization command '{}' failed its availability check",
                self.program
            )));
        }

        debug!("Diarizer '{}' is available", self.program);
        Ok(())
    }

    fn parse_turns(&self, stdout: &str) -> Result<Vec<RawTurn>> {
        let mut turns = Vec::new();
        for (line_no, line) in stdout.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let turn: RawTurn = serde_json::from_str(line).map_err(|e| {
                VoxcutError::Diarization(format!(
                    "Malformed turn on output line {}: {e}",
                    line_no + 1
                ))
            })?;
            turns.push(turn);
        }
        Ok(turns)
    }
}

#[async_trait]
impl Diarizer for CommandDiarizer {
    async fn diarize(&self, audio: &Path) -> Result<Vec<RawTurn>> {
        if !audio.exists() {
            return Err(VoxcutError::FileNotFound(audio.display().to_string()));
        }

        debug!("Running diarizer '{}' on {}", self.program, audio.display());

        let run = Command::new(&self.program)
            .args(&self.args)
            .arg(audio)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                VoxcutError::Diarization(format!(
                    "Diarizer timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| VoxcutError::Diarization(format!("Failed to run diarizer: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoxcutError::Diarization(format!(
                "Diarizer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let raw = self.parse_turns(&stdout)?;
        let raw_len = raw.len();
        let turns = normalize_turns(raw);
        if turns.len() < raw_len {
            warn!(
                "Dropped {} degenerate turn(s) from diarizer output",
                raw_len - turns.len()
            );
        }

        debug!("Diarizer produced {} turns", turns.len());
        Ok(turns)
    }

    fn name(&self) -> &'static str {
        "external diarizer"
    }
}
