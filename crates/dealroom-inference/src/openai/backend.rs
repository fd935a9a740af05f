//! OpenAI-compatible model backend implementation.
//!
//! One HTTP backend serves both halves of the core: streaming answer
//! generation for the Q&A path and single-shot field extraction for
//! summary jobs.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dealroom_core::{
    AnswerModel, CancelToken, Error, ExtractionModel, FieldExtraction, FieldSpec, Passage, Result,
    TokenStream,
};

use super::streaming::parse_sse_stream;
use super::types::*;

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = "gpt-4o-mini";

/// Default timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model used for answer generation and extraction.
    pub gen_model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Skip TLS verification (for self-signed certs in local environments).
    pub skip_tls_verify: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            skip_tls_verify: false,
        }
    }
}

/// OpenAI-compatible backend for answer generation and field extraction.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Model(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing OpenAI backend: url={}, model={}",
            config.base_url, config.gen_model
        );

        Ok(Self { client, config })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(OpenAIConfig::default())
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
    /// | `OPENAI_API_KEY` | unset |
    /// | `OPENAI_GEN_MODEL` | `gpt-4o-mini` |
    /// | `OPENAI_TIMEOUT` | `300` |
    /// | `OPENAI_SKIP_TLS_VERIFY` | `false` |
    pub fn from_env() -> Result<Self> {
        let config = OpenAIConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            gen_model: std::env::var("OPENAI_GEN_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string()),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            skip_tls_verify: std::env::var("OPENAI_SKIP_TLS_VERIFY")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        };

        Self::new(config)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Map a non-success HTTP status to a typed error, honoring Retry-After.
    fn classify_status(response: &reqwest::Response) -> Option<Error> {
        let status = response.status();
        if status.is_success() {
            return None;
        }
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Some(Error::RateLimited { retry_after_secs });
        }
        Some(Error::Model(format!("Upstream returned {}", status)))
    }

    fn grounded_prompt(question: &str, passages: &[Passage]) -> String {
        let mut prompt = String::from(
            "Answer the question using only the evidence passages below. \
             Quote figures exactly as they appear.\n\nEvidence:\n",
        );
        for p in passages {
            prompt.push_str(&format!(
                "[{} p.{}] {}\n",
                p.document_title, p.page, p.text
            ));
        }
        prompt.push_str(&format!("\nQuestion: {}\n", question));
        prompt
    }

    fn extraction_prompt(spec: &FieldSpec) -> String {
        let hint = spec
            .hint
            .as_deref()
            .map(|h| format!(" Hint: {}", h))
            .unwrap_or_default();
        format!(
            "Locate the value of \"{}\" ({:?}) in the document.{}\n\
             Respond with JSON only: \
             {{\"value\": string or null, \"confidence\": number, \
             \"page\": number or null, \"evidence\": string or null}}",
            spec.label, spec.field_type, hint
        )
    }
}

#[async_trait]
impl AnswerModel for OpenAIBackend {
    async fn generate(
        &self,
        question: &str,
        passages: &[Passage],
        cancel: CancelToken,
    ) -> Result<TokenStream> {
        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Self::grounded_prompt(question, passages),
            }],
            temperature: Some(0.0),
            max_tokens: None,
            stream: true,
        };

        debug!(model = %self.config.gen_model, "Starting streaming generation");

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await?;

        if let Some(err) = Self::classify_status(&response) {
            warn!(error = %err, "Generation request rejected");
            return Err(err);
        }

        // Dropping the byte stream aborts the connection; take_until stops
        // pulling as soon as cancellation fires between tokens.
        let mut cancel = cancel;
        let tokens = parse_sse_stream(response.bytes_stream())
            .take_until(Box::pin(async move { cancel.cancelled().await }));

        Ok(Box::pin(tokens))
    }
}

#[async_trait]
impl ExtractionModel for OpenAIBackend {
    async fn extract_field(&self, document_id: Uuid, spec: &FieldSpec) -> Result<FieldExtraction> {
        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: format!("You are extracting fields from document {}.", document_id),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::extraction_prompt(spec),
                },
            ],
            temperature: Some(0.0),
            max_tokens: Some(512),
            stream: false,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await?;

        if let Some(err) = Self::classify_status(&response) {
            return Err(err);
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Extraction("Empty completion".to_string()))?;

        let payload: ExtractionPayload = serde_json::from_str(content.trim())
            .map_err(|e| Error::Extraction(format!("Unparseable extraction payload: {}", e)))?;

        Ok(FieldExtraction {
            raw: payload.value,
            confidence: payload.confidence.clamp(0.0, 1.0),
            source_page: payload.page,
            evidence: payload.evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealroom_core::FieldType;

    #[test]
    fn test_config_default() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, DEFAULT_OPENAI_URL);
        assert_eq!(config.gen_model, DEFAULT_GEN_MODEL);
        assert!(config.api_key.is_none());
        assert!(!config.skip_tls_verify);
    }

    #[test]
    fn test_grounded_prompt_includes_passages() {
        let passages = vec![Passage {
            document_id: Uuid::nil(),
            document_title: "FY25 Financials".to_string(),
            page: 12,
            chunk_id: None,
            text: "ARR grew 45% YoY".to_string(),
            relevance: 0.9,
        }];
        let prompt = OpenAIBackend::grounded_prompt("What is the ARR growth rate?", &passages);
        assert!(prompt.contains("[FY25 Financials p.12] ARR grew 45% YoY"));
        assert!(prompt.contains("Question: What is the ARR growth rate?"));
    }

    #[test]
    fn test_extraction_prompt_includes_hint() {
        let spec = FieldSpec {
            key: "arr".to_string(),
            label: "Annual Recurring Revenue".to_string(),
            field_type: FieldType::Currency,
            required: true,
            hint: Some("look in the financial summary".to_string()),
        };
        let prompt = OpenAIBackend::extraction_prompt(&spec);
        assert!(prompt.contains("Annual Recurring Revenue"));
        assert!(prompt.contains("look in the financial summary"));
    }
}
