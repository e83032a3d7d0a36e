use crate::error::{Result, VoxcutError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Default API root; overridable for tests.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Threshold for inline base64 payloads vs the Files API (20 MB).
const INLINE_SIZE_THRESHOLD: u64 = 20 * 1024 * 1024;

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Bilingual transcript produced for one vocal stem.
#[derive(Debug, Clone)]
pub struct TranscriptArtifact {
    pub source_text: String,
    pub target_text: String,
    pub path: PathBuf,
}

/// Client for the transcription/translation collaborator.
///
/// Credentials and model identifiers are injected at construction. Each
/// annotation is two generateContent calls: a transcription of the vocal
/// audio, then a translation of that text into the target language.
pub struct GeminiAnnotator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    source_language: String,
    target_language: String,
}

impl GeminiAnnotator {
    pub fn new(
        api_key: String,
        source_language: String,
        target_language: String,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model: "gemini-2.0-flash".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            source_language,
            target_language,
        }
    }

    /// Set a different model (e.g. "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root. Intended for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Transcribe a vocal stem, translate the transcription, and persist the
    /// bilingual document as `<vocal_stem>_transcript.txt` in `output_dir`.
    pub async fn annotate(&self, vocal_path: &Path, output_dir: &Path) -> Result<TranscriptArtifact> {
        let source_text = self.transcribe(vocal_path).await?;
        let target_text = self.translate(&source_text).await?;

        let stem = vocal_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                VoxcutError::Annotation(format!(
                    "Vocal path has no usable basename: {}",
                    vocal_path.display()
                ))
            })?;

        let document = format!(
            "{}:\n{}\n\n{}:\n{}\n",
            language_name(&self.source_language),
            source_text.trim(),
            language_name(&self.target_language),
            target_text.trim()
        );

        let path = output_dir.join(format!("{stem}_transcript.txt"));
        std::fs::write(&path, &document)
            .map_err(|e| VoxcutError::Annotation(format!("Failed to write transcript: {e}")))?;

        info!("Transcript saved: {}", path.display());

        Ok(TranscriptArtifact {
            source_text,
            target_text,
            path,
        })
    }

    async fn transcribe(&self, vocal_path: &Path) -> Result<String> {
        let metadata = fs::metadata(vocal_path)
            .await
            .map_err(|e| VoxcutError::Annotation(format!("Cannot read vocal stem: {e}")))?;

        let prompt = format!(
            "Transcribe this audio. The speech is in {}. Return only the transcription.",
            language_name(&self.source_language)
        );

        let audio_part = if metadata.len() < INLINE_SIZE_THRESHOLD {
            debug!("Using inline audio data ({} bytes)", metadata.len());
            let audio_bytes = fs::read(vocal_path)
                .await
                .map_err(|e| VoxcutError::Annotation(format!("Cannot read vocal stem: {e}")))?;
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: "audio/wav".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(&audio_bytes),
                },
            }
        } else {
            debug!("Uploading vocal stem ({} bytes)", metadata.len());
            let file_uri = self.upload_file(vocal_path).await?;
            Part::FileData {
                file_data: FileData {
                    mime_type: "audio/wav".to_string(),
                    file_uri,
                },
            }
        };

        self.call_generate_content(vec![Part::Text { text: prompt }, audio_part])
            .await
    }

    async fn translate(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Translate the following text to {}. Return only the translation, \
             preserving line breaks.\n\n{}",
            language_name(&self.target_language),
            text
        );
        self.call_generate_content(vec![Part::Text { text: prompt }])
            .await
    }

    /// Upload a file through the Files API and return its URI.
    async fn upload_file(&self, path: &Path) -> Result<String> {
        let file_bytes = fs::read(path)
            .await
            .map_err(|e| VoxcutError::Annotation(format!("Cannot read upload source: {e}")))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav");

        let url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);

        let response = self
            .client
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("Content-Type", "audio/wav")
            .header("X-Goog-Upload-File-Name", file_name)
            .body(file_bytes)
            .send()
            .await
            .map_err(|e| VoxcutError::Annotation(format!("Upload failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoxcutError::Annotation(format!(
                "Upload failed: {error_text}"
            )));
        }

        let upload_response: FileUploadResponse = response
            .json()
            .await
            .map_err(|e| VoxcutError::Annotation(format!("Bad upload response: {e}")))?;
        Ok(upload_response.file.uri)
    }

    /// Call generateContent with retries. Server errors back off and retry;
    /// client errors fail immediately.
    async fn call_generate_content(&self, parts: Vec<Part>) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.0),
            }),
        };

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self.client.post(&url).json(&request).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    debug!("Annotation API response status: {}", status);

                    if status.is_success() {
                        let parsed: GenerateContentResponse = resp
                            .json()
                            .await
                            .map_err(|e| VoxcutError::Annotation(format!("Bad response: {e}")))?;
                        return extract_text(parsed);
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    if status.is_client_error() {
                        return Err(VoxcutError::Annotation(format!(
                            "API error ({status}): {error_body}"
                        )));
                    }

                    warn!("API server error ({status}): {error_body}");
                    last_error = Some(VoxcutError::Annotation(format!(
                        "API server error: {status}"
                    )));
                }
                Err(e) => {
                    warn!("Annotation request failed: {e}");
                    last_error = Some(VoxcutError::Annotation(format!("Request failed: {e}")));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| VoxcutError::Annotation("Unknown API error".to_string())))
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    if let Some(error) = response.error {
        return Err(VoxcutError::Annotation(error.message));
    }

    let text = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|p| p.into_iter().next())
        .and_then(|p| p.text);

    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(VoxcutError::Annotation(
            "API returned no text".to_string(),
        )),
    }
}

/// Human-readable language name for prompting; falls back for unknown codes.
fn language_name(code: &str) -> &'static str {
    match code.to_lowercase().as_str() {
        "en" => "English",
        "ta" => "Tamil",
        "hi" => "Hindi",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "ar" => "Arabic",
        "te" => "Telugu",
        "ml" => "Malayalam",
        "kn" => "Kannada",
        "bn" => "Bengali",
        _ => "the source language",
    }
}

// Request/Response types

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
    FileData { file_data: FileData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    uri: String,
}
