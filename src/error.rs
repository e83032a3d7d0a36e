use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxcutError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Required dependency missing: {0}")]
    DependencyMissing(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Audio extraction failed: {0}")]
    AudioExtraction(String),

    #[error("Diarization failed: {0}")]
    Diarization(String),

    #[error("Clip extraction failed: {0}")]
    ClipExtraction(String),

    #[error("Stem separation failed: {0}")]
    Separation(String),

    #[error("Annotation failed: {0}")]
    Annotation(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoxcutError {
    /// Whether this error aborts the whole run. Everything else is scoped to
    /// a single segment: the loop records it and moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoxcutError::FileNotFound(_)
                | VoxcutError::DependencyMissing(_)
                | VoxcutError::Config(_)
                | VoxcutError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, VoxcutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(VoxcutError::FileNotFound("x.mp4".into()).is_fatal());
        assert!(VoxcutError::DependencyMissing("demucs".into()).is_fatal());
        assert!(VoxcutError::Cancelled.is_fatal());
        assert!(!VoxcutError::ClipExtraction("bad range".into()).is_fatal());
        assert!(!VoxcutError::Separation("exit 1".into()).is_fatal());
        assert!(!VoxcutError::Annotation("upload failed".into()).is_fatal());
    }
}
