use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, VoxcutError};

/// The stems recovered from one separated audio clip. Either stem may be
/// absent when the collaborator did not emit it; downstream stages skip
/// rather than fail on an absent stem.
#[derive(Debug, Clone, Default)]
pub struct StemArtifact {
    pub vocal_path: Option<PathBuf>,
    pub background_path: Option<PathBuf>,
}

impl StemArtifact {
    pub fn is_complete(&self) -> bool {
        self.vocal_path.is_some() && self.background_path.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.vocal_path.is_none() && self.background_path.is_none()
    }
}

/// Removes the collaborator's staging tree on drop, so the disk is reclaimed
/// whether separation succeeds, partially succeeds, fails or times out.
struct StagingGuard {
    dir: PathBuf,
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                warn!("Failed to remove staging dir {}: {e}", self.dir.display());
            } else {
                debug!("Removed staging dir {}", self.dir.display());
            }
        }
    }
}

/// Wrapper around the external source-separation process.
///
/// The collaborator writes `<output_dir>/<model>/<input_basename>/` with one
/// file per stem; this wrapper recovers the vocal and background stems and
/// cleans up everything else.
pub struct StemSeparator {
    program: String,
    model: String,
    timeout: Duration,
}

impl StemSeparator {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: "demucs".to_string(),
            model: model.into(),
            timeout,
        }
    }

    /// Override the separator binary. Intended for tests, which drive the
    /// wrapper against a stub that reproduces the collaborator's layout.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Check the separator is installed and accessible. Missing separator is
    /// fatal for the run, not scoped to a segment.
    pub fn check_available(&self) -> Result<()> {
        let output = std::process::Command::new(&self.program)
            .arg("--help")
            .output()
            .map_err(|e| {
                VoxcutError::DependencyMissing(format!(
                    "Separator '{}' not found. Install it with 'pip install demucs'. Error: {e}",
                    self.program
                ))
            })?;

        if !output.status.success() {
            return Err(VoxcutError::DependencyMissing(format!(
                "Separator '{}' failed its availability check",
                self.program
            )));
        }

        debug!("Separator '{}' is available", self.program);
        Ok(())
    }

    /// Run separation on one audio clip and recover the stems of interest.
    ///
    /// The vocal stem lands at `<basename>_refined.wav`, the background stem
    /// at `<basename>_back_music.wav`, both in `output_dir`. A stem the
    /// collaborator did not produce is reported as `None`, not as an error.
    pub async fn separate(&self, audio_path: &Path, output_dir: &Path) -> Result<StemArtifact> {
        let basename = audio_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                VoxcutError::Separation(format!(
                    "Input path has no usable basename: {}",
                    audio_path.display()
                ))
            })?;

        // The guard owns the staging tree from before the spawn, so cleanup
        // runs on every exit path below, including timeout and early error.
        let _staging = StagingGuard {
            dir: output_dir.join(&self.model),
        };

        debug!("Separating {} with {}", audio_path.display(), self.program);

        let run = Command::new(&self.program)
            .args(["-n", self.model.as_str(), "-o"])
            .arg(output_dir)
            .arg(audio_path)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                VoxcutError::Separation(format!(
                    "Separator timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| VoxcutError::Separation(format!("Failed to run separator: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoxcutError::Separation(format!(
                "Separator exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stem_dir = output_dir.join(&self.model).join(basename);
        if !stem_dir.exists() {
            return Err(VoxcutError::Separation(format!(
                "Separator reported success but produced no output at {}",
                stem_dir.display()
            )));
        }

        let vocal_path = recover_stem(
            &stem_dir.join("vocals.wav"),
            &output_dir.join(format!("{basename}_refined.wav")),
        );
        let background_path = recover_stem(
            &stem_dir.join("other.wav"),
            &output_dir.join(format!("{basename}_back_music.wav")),
        );

        if vocal_path.is_some() {
            info!("Vocal stem saved for {basename}");
        }
        if background_path.is_some() {
            info!("Background stem saved for {basename}");
        }

        Ok(StemArtifact {
            vocal_path,
            background_path,
        })
    }
}

/// Move one stem out of the staging tree, or report its absence.
fn recover_stem(src: &Path, dest: &Path) -> Option<PathBuf> {
    if !src.exists() {
        warn!("Stem not produced: {}", src.display());
        return None;
    }
    match std::fs::rename(src, dest) {
        Ok(()) => Some(dest.to_path_buf()),
        Err(e) => {
            warn!("Failed to move stem {}: {e}", src.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_artifact_states() {
        let empty = StemArtifact::default();
        assert!(empty.is_empty());
        assert!(!empty.is_complete());

        let partial = StemArtifact {
            vocal_path: Some(PathBuf::from("/tmp/a_refined.wav")),
            background_path: None,
        };
        assert!(!partial.is_empty());
        assert!(!partial.is_complete());

        let full = StemArtifact {
            vocal_path: Some(PathBuf::from("/tmp/a_refined.wav")),
            background_path: Some(PathBuf::from("/tmp/a_back_music.wav")),
        };
        assert!(full.is_complete());
    }

    #[test]
    fn test_staging_guard_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("htdemucs");
        std::fs::create_dir_all(staging.join("clip")).unwrap();
        std::fs::write(staging.join("clip").join("drums.wav"), b"x").unwrap();

        {
            let _guard = StagingGuard {
                dir: staging.clone(),
            };
        }
        assert!(!staging.exists());
    }

    #[test]
    fn test_check_available_missing_binary() {
        let separator = StemSeparator::new("htdemucs", Duration::from_secs(5))
            .with_program("voxcut-no-such-separator");
        assert!(matches!(
            separator.check_available(),
            Err(VoxcutError::DependencyMissing(_))
        ));
    }

    #[cfg(unix)]
    mod stub_separator {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        /// Write a stub separator script that recreates the collaborator's
        /// nested layout, emitting only the listed stems.
        fn write_stub(dir: &Path, stems: &[&str], exit_code: i32) -> PathBuf {
            let script = dir.join("fake-demucs");
            let mut f = std::fs::File::create(&script).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            // args: -n <model> -o <outdir> <input>
            writeln!(f, "model=$2; outdir=$4; input=$5").unwrap();
            writeln!(f, "base=$(basename \"$input\" .wav)").unwrap();
            writeln!(f, "mkdir -p \"$outdir/$model/$base\"").unwrap();
            for stem in stems {
                writeln!(f, "echo data > \"$outdir/$model/$base/{stem}.wav\"").unwrap();
            }
            writeln!(f, "exit {exit_code}").unwrap();
            drop(f);
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        fn separator_for(script: &Path) -> StemSeparator {
            StemSeparator::new("htdemucs", Duration::from_secs(10))
                .with_program(script.to_str().unwrap())
        }

        #[tokio::test]
        async fn test_separate_recovers_both_stems() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), &["vocals", "other", "drums", "bass"], 0);
            let audio = dir.path().join("SPEAKER_00_segment_0.wav");
            std::fs::write(&audio, b"stub").unwrap();

            let artifact = separator_for(&script)
                .separate(&audio, dir.path())
                .await
                .unwrap();

            assert!(artifact.is_complete());
            assert_eq!(
                artifact.vocal_path.as_deref(),
                Some(dir.path().join("SPEAKER_00_segment_0_refined.wav").as_path())
            );
            assert_eq!(
                artifact.background_path.as_deref(),
                Some(
                    dir.path()
                        .join("SPEAKER_00_segment_0_back_music.wav")
                        .as_path()
                )
            );
            // Staging tree gone even though drums/bass were never recovered.
            assert!(!dir.path().join("htdemucs").exists());
        }

        #[tokio::test]
        async fn test_separate_vocal_only_is_soft_absence() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), &["vocals"], 0);
            let audio = dir.path().join("clip.wav");
            std::fs::write(&audio, b"stub").unwrap();

            let artifact = separator_for(&script)
                .separate(&audio, dir.path())
                .await
                .unwrap();

            assert!(artifact.vocal_path.is_some());
            assert!(artifact.background_path.is_none());
            assert!(!dir.path().join("htdemucs").exists());
        }

        #[tokio::test]
        async fn test_separate_nonzero_exit_cleans_staging() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_stub(dir.path(), &["vocals"], 1);
            let audio = dir.path().join("clip.wav");
            std::fs::write(&audio, b"stub").unwrap();

            let result = separator_for(&script).separate(&audio, dir.path()).await;

            assert!(matches!(result, Err(VoxcutError::Separation(_))));
            // Partial output is still cleaned up on failure.
            assert!(!dir.path().join("htdemucs").exists());
        }
    }
}
