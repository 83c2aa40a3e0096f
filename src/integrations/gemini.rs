//! Google Gemini vision client used for image transcription.

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Prompt asking for a verbatim transcription.
pub const TRANSCRIBE_PROMPT: &str = "Перепиши весь текст с изображения дословно, \
сохраняя переносы строк. Не добавляй комментариев. Если текста нет, ответь пустой строкой.";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Client keyed by GOOGLE_API_KEY.
    pub fn from_env(model: &str) -> Result<Self> {
        let api_key = env::var("GOOGLE_API_KEY")
            .map_err(|_| Error::ConfigError("GOOGLE_API_KEY не установлен".to_string()))?;
        Self::new(api_key, model)
    }

    pub fn new<S: Into<String>>(api_key: S, model: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("GOOGLE_API_KEY пустой".to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("tg_collector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::OcrError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: GEMINI_API_URL.to_string(),
            model: model.to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Point the client at another API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send an image with an instruction and return the text reply.
    pub async fn analyze_image(
        &self,
        image_data: &[u8],
        prompt: &str,
        mime_type: &str,
    ) -> Result<String> {
        use base64::Engine;
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let payload = GeminiRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: image_base64,
                        },
                    },
                    Part::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 4096,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::OcrError(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::OcrError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::OcrError(format!(
                "Gemini Vision error {}: {}",
                status, text
            )));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| Error::OcrError(format!("Invalid response: {}", e)))?;

        // A candidate without parts means the model saw no text.
        Ok(gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text.as_str()),
                        Part::InlineData { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }

    pub async fn transcribe(&self, image_data: &[u8], mime_type: &str) -> Result<String> {
        self.analyze_image(image_data, TRANSCRIBE_PROMPT, mime_type)
            .await
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key", "gemini-2.0-flash")
            .unwrap()
            .with_base_url(&server.base_url())
    }

    #[test]
    fn new_rejects_empty_key() {
        let err = GeminiClient::new("   ", "gemini-2.0-flash").unwrap_err();
        assert!(format!("{}", err).contains("пустой"));
    }

    #[test]
    fn with_model_overrides_default() {
        let client = GeminiClient::new("k", "gemini-2.0-flash")
            .unwrap()
            .with_model("gemini-2.5-flash");
        assert_eq!(client.model(), "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn transcribe_sends_inline_image() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.0-flash:generateContent")
                .query_param("key", "test-key")
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("\"mimeType\":\"image/png\"") && body.contains("\"data\":\"AQID\"")
                });
            then.status(200).json_body(serde_json::json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{"text": "Счёт №42\n"}, {"text": "Итого: 100"}]
                    }
                }]
            }));
        });

        let text = client_for(&server)
            .transcribe(&[1, 2, 3], "image/png")
            .await
            .unwrap();

        assert_eq!(text, "Счёт №42\nИтого: 100");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn empty_candidates_mean_no_text() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(serde_json::json!({ "candidates": [] }));
        });

        let text = client_for(&server)
            .transcribe(b"img", "image/jpeg")
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn http_errors_become_ocr_errors() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST);
            then.status(429).body("quota");
        });

        let err = client_for(&server)
            .transcribe(b"img", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OcrError(_)));
        assert!(err.to_string().contains("quota"));
    }
}
