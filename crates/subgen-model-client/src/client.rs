//! Gemini-style multimodal generation client, grounded on
//! `vclip-worker::gemini::GeminiClient`'s request/response shape, generalized
//! from "highlight JSON" to opaque "subtitle SRT text" and from a text
//! transcript input to a `fileData` reference at a remote chunk URI.

use serde::{Deserialize, Serialize};
use reqwest::{Client, StatusCode};
use tracing::warn;

use subgen_models::{GenerationFlags, LanguageCode};

use crate::error::{ModelError, ModelResult};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const ENDPOINT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Prompt variant for the Hindi "dual-method" special case (§4.8): the
/// scheduler issues one work item per method and the merger later prefers
/// `Direct` over `Translate`. Every other language always uses `Direct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMethod {
    Direct,
    Translate,
}

impl GenerationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMethod::Direct => "direct",
            GenerationMethod::Translate => "translate",
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    Text {
        text: String,
    },
}

#[derive(Serialize)]
struct FileData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// Single-operation model port. Holds only a `reqwest::Client` and an API
/// key — no interior mutability beyond what the client's own connection
/// pool provides — so it is `Clone` and safe to share across scheduler
/// workers.
#[derive(Clone)]
pub struct ModelClient {
    http: Client,
    api_key: String,
    model: String,
}

impl ModelClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Generate subtitle text for one (chunk, language, flags, method)
    /// combination. Returns opaque SRT text — parsing happens downstream in
    /// the merger.
    pub async fn generate(
        &self,
        chunk_remote_uri: &str,
        language: LanguageCode,
        flags: GenerationFlags,
        method: GenerationMethod,
    ) -> ModelResult<String> {
        let prompt = build_prompt(language, flags, method);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::FileData {
                        file_data: FileData {
                            mime_type: "video/mp4".to_string(),
                            file_uri: chunk_remote_uri.to_string(),
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "text/plain".to_string(),
            },
        };

        let url = format!("{ENDPOINT_BASE}/{}:generateContent?key={}", self.model, self.api_key);

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &body));
        }

        let parsed: GenerateResponse = response.json().await?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ModelError::SafetyBlocked(reason));
        }

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::TransientModelError("no candidates in response".to_string()))?;

        if let Some(reason) = &candidate.finish_reason {
            if reason == "SAFETY" || reason == "RECITATION" {
                return Err(ModelError::SafetyBlocked(reason.clone()));
            }
        }

        let text = candidate
            .content
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ModelError::TransientModelError("empty response content".to_string()))?;

        Ok(text)
    }
}

fn classify_http_failure(status: StatusCode, body: &str) -> ModelError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ModelError::AuthError(format!("{status}: {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => ModelError::QuotaError(format!("{status}: {body}")),
        StatusCode::BAD_REQUEST => ModelError::ValidationError(format!("{status}: {body}")),
        status if status.is_server_error() => ModelError::TransientModelError(format!("{status}: {body}")),
        status => {
            warn!(%status, body, "unclassified model HTTP failure, treating as transient");
            ModelError::TransientModelError(format!("{status}: {body}"))
        }
    }
}

fn build_prompt(language: LanguageCode, flags: GenerationFlags, method: GenerationMethod) -> String {
    let sdh_clause = if flags.sdh {
        "Include non-speech sound cues in brackets, e.g. [door creaks], [music playing], suitable for deaf and hard-of-hearing viewers."
    } else {
        "Transcribe spoken dialogue only, no non-speech cues."
    };

    let method_clause = match method {
        GenerationMethod::Direct => {
            format!("Produce subtitles directly in the target language ({language}) from the audio.")
        }
        GenerationMethod::Translate => {
            format!("Transcribe the audio, then translate the transcript into the target language ({language}).")
        }
    };

    format!(
        "You are generating subtitles for a single video chunk.\n\
         Target language: {language}.\n\
         {method_clause}\n\
         {sdh_clause}\n\
         Return ONLY a well-formed SubRip (SRT) document: sequential numbered\n\
         blocks of `HH:MM:SS,mmm --> HH:MM:SS,mmm` timestamps followed by text,\n\
         separated by blank lines. Do not wrap the output in markdown code\n\
         fences or add any commentary before or after the SRT content."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_method_prompt_names_the_target_language() {
        let lang = LanguageCode::parse("hin").unwrap();
        let prompt = build_prompt(lang, GenerationFlags { sdh: false }, GenerationMethod::Direct);
        assert!(prompt.contains("directly in the target language (hin)"));
    }

    #[test]
    fn translate_method_prompt_mentions_translation() {
        let lang = LanguageCode::parse("hin").unwrap();
        let prompt = build_prompt(lang, GenerationFlags { sdh: false }, GenerationMethod::Translate);
        assert!(prompt.contains("translate the transcript"));
    }

    #[test]
    fn sdh_flag_requests_non_speech_cues() {
        let lang = LanguageCode::parse("eng").unwrap();
        let prompt = build_prompt(lang, GenerationFlags { sdh: true }, GenerationMethod::Direct);
        assert!(prompt.contains("non-speech sound cues"));
    }

    #[test]
    fn unauthorized_status_classifies_as_auth_error() {
        let err = classify_http_failure(StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, ModelError::AuthError(_)));
    }

    #[test]
    fn too_many_requests_classifies_as_quota_error() {
        let err = classify_http_failure(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, ModelError::QuotaError(_)));
    }

    #[test]
    fn server_error_classifies_as_transient() {
        let err = classify_http_failure(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert!(matches!(err, ModelError::TransientModelError(_)));
    }
}
