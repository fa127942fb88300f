// src/vision/remote.rs
// Remote vision providers for dot counting, selected by configuration

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::settings::ProviderConfig;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const CLAUDE_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

const PROMPT: &str = r#"You are a precise visual counter for a two-sided dice/dot table.

The screenshot shows one game window split into a LEFT half and a RIGHT half,
each displaying between 0 and 6 dots.

Count the dots on each side and return ONLY valid JSON, no markdown, no
comments, exactly this schema:

{"leftCount": <0-6 integer>, "rightCount": <0-6 integer>}

Do not guess counts you cannot see. Never return null."#;

/// Wire output of a remote analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCounts {
    pub left_count: u8,
    pub right_count: u8,
}

/// External, paid recognition service. Providers are interchangeable; the
/// pipeline only sees this trait.
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    async fn analyze(&self, png_bytes: &[u8]) -> Result<RemoteCounts>;

    fn name(&self) -> &'static str;
}

/// Select and build the configured provider.
pub fn build_analyzer(config: &ProviderConfig) -> Result<Box<dyn RemoteAnalyzer>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiAnalyzer::new(config))),
        "claude" => Ok(Box::new(ClaudeAnalyzer::new(config))),
        other => bail!("unknown remote provider {other:?} (expected \"openai\" or \"claude\")"),
    }
}

/// Models sometimes wrap their JSON in markdown fences despite the prompt.
fn strip_markdown_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_counts(text: &str) -> Result<RemoteCounts> {
    let clean = strip_markdown_fences(text);
    let counts: RemoteCounts = serde_json::from_str(clean)
        .with_context(|| format!("malformed analyzer response: {clean}"))?;
    Ok(counts)
}

// ============================================
// OpenAI
// ============================================

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: Vec<OpenAiContentPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OpenAiContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageUrl,
    },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiAnalyzer {
    pub fn new(config: &ProviderConfig) -> OpenAiAnalyzer {
        OpenAiAnalyzer {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_ENDPOINT.to_string()),
        }
    }
}

#[async_trait]
impl RemoteAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, png_bytes: &[u8]) -> Result<RemoteCounts> {
        let base64_image = general_purpose::STANDARD.encode(png_bytes);

        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: vec![
                    OpenAiContentPart::Text {
                        content_type: "text".to_string(),
                        text: PROMPT.to_string(),
                    },
                    OpenAiContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageUrl {
                            url: format!("data:image/png;base64,{base64_image}"),
                        },
                    },
                ],
            }],
            max_tokens: 64,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("OpenAI request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI API error ({status}): {body}");
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .context("failed to decode OpenAI response")?;
        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("empty OpenAI response"))?;

        parse_counts(text)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ============================================
// Claude
// ============================================

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: Vec<ClaudeContentBlock>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ClaudeContentBlock {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    Image {
        #[serde(rename = "type")]
        content_type: String,
        source: ClaudeImageSource,
    },
}

#[derive(Serialize)]
struct ClaudeImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeResponseContent>,
}

#[derive(Deserialize)]
struct ClaudeResponseContent {
    text: String,
}

pub struct ClaudeAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ClaudeAnalyzer {
    pub fn new(config: &ProviderConfig) -> ClaudeAnalyzer {
        ClaudeAnalyzer {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| CLAUDE_DEFAULT_MODEL.to_string()),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| CLAUDE_ENDPOINT.to_string()),
        }
    }
}

#[async_trait]
impl RemoteAnalyzer for ClaudeAnalyzer {
    async fn analyze(&self, png_bytes: &[u8]) -> Result<RemoteCounts> {
        let base64_image = general_purpose::STANDARD.encode(png_bytes);

        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: 64,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: vec![
                    ClaudeContentBlock::Image {
                        content_type: "image".to_string(),
                        source: ClaudeImageSource {
                            source_type: "base64".to_string(),
                            media_type: "image/png".to_string(),
                            data: base64_image,
                        },
                    },
                    ClaudeContentBlock::Text {
                        content_type: "text".to_string(),
                        text: PROMPT.to_string(),
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Claude request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Claude API error ({status}): {body}");
        }

        let parsed: ClaudeResponse = response
            .json()
            .await
            .context("failed to decode Claude response")?;
        let text = parsed
            .content
            .first()
            .map(|c| c.text.as_str())
            .ok_or_else(|| anyhow!("empty Claude response"))?;

        parse_counts(text)
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            provider: name.to_string(),
            api_key: "test-key".to_string(),
            model: None,
            endpoint: None,
        }
    }

    #[test]
    fn parses_bare_json() {
        let counts = parse_counts(r#"{"leftCount": 3, "rightCount": 5}"#).unwrap();
        assert_eq!(counts, RemoteCounts { left_count: 3, right_count: 5 });
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n{\"leftCount\": 2, \"rightCount\": 2}\n```";
        let counts = parse_counts(text).unwrap();
        assert_eq!(counts, RemoteCounts { left_count: 2, right_count: 2 });
    }

    #[test]
    fn rejects_malformed_response() {
        assert!(parse_counts("the left side shows 3 dots").is_err());
        assert!(parse_counts(r#"{"leftCount": null, "rightCount": 2}"#).is_err());
    }

    #[test]
    fn builds_configured_provider() {
        assert_eq!(build_analyzer(&provider("openai")).unwrap().name(), "openai");
        assert_eq!(build_analyzer(&provider("claude")).unwrap().name(), "claude");
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(build_analyzer(&provider("gemini-ultra")).is_err());
    }
}
