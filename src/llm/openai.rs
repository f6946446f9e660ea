use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{Config, DESCRIBE_PROMPT};
use crate::error::StepError;
use crate::llm::media::parse_data_url;
use crate::pipeline::{ImageSynthesizer, SceneDescriber};
use crate::utils::http::truncate_for_log;
use crate::utils::timing::log_upstream_timing;

const ERROR_BODY_LOG_LIMIT: usize = 2000;

/// Client for the OpenAI chat-completions (vision) and image-generation
/// endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    vision_model: String,
    vision_max_tokens: u32,
    vision_detail: String,
    image_model: String,
    image_size: String,
    image_style: String,
}

pub(crate) fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), ERROR_BODY_LOG_LIMIT));
    }

    (None, truncate_for_log(trimmed, ERROR_BODY_LOG_LIMIT))
}

fn describe_image_for_log(image_url: &str) -> String {
    match parse_data_url(image_url) {
        Some(data) => format!("data-url mime={} bytes={}", data.mime_type, data.bytes.len()),
        None => format!("url={}", truncate_for_log(image_url, 120)),
    }
}

impl OpenAiClient {
    pub fn new(config: &Config, http: Client) -> Self {
        OpenAiClient {
            http,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            vision_model: config.vision_model.clone(),
            vision_max_tokens: config.vision_max_tokens,
            vision_detail: config.vision_detail.clone(),
            image_model: config.image_model.clone(),
            image_size: config.image_size.clone(),
            image_style: config.image_style.clone(),
        }
    }

    pub(crate) fn vision_payload(&self, image_url: &str) -> Value {
        json!({
            "model": self.vision_model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": DESCRIBE_PROMPT },
                        {
                            "type": "image_url",
                            "image_url": { "url": image_url, "detail": self.vision_detail }
                        }
                    ]
                }
            ],
            "max_tokens": self.vision_max_tokens
        })
    }

    pub(crate) fn image_payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": self.image_size,
            "style": self.image_style
        })
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, StepError> {
        if self.api_key.trim().is_empty() {
            return Err(StepError::Upstream("OPENAI_API_KEY is not configured".to_string()));
        }

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("OpenAI API error on {path}: status={status}, body={body_summary}");
            let detail = message.unwrap_or(body_summary);
            return Err(StepError::Upstream(format!(
                "OpenAI request failed with status {status}: {detail}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| StepError::Upstream(format!("Malformed OpenAI response: {err}")))
    }
}

pub(crate) fn extract_chat_content(response: &Value) -> Option<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub(crate) fn extract_image_url(response: &Value) -> Option<String> {
    response
        .pointer("/data/0/url")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SceneDescriber for OpenAiClient {
    async fn describe_scene(&self, image_url: &str) -> Result<String, StepError> {
        debug!(
            "OpenAI describe request: model={}, image={}",
            self.vision_model,
            describe_image_for_log(image_url)
        );
        let payload = self.vision_payload(image_url);
        log_upstream_timing("openai", &self.vision_model, "describe", || async {
            let response = self.post_json("chat/completions", &payload).await?;
            extract_chat_content(&response).ok_or_else(|| {
                warn!(
                    "OpenAI describe response had no content: {}",
                    truncate_for_log(&response.to_string(), ERROR_BODY_LOG_LIMIT)
                );
                StepError::Upstream("The description service returned no content.".to_string())
            })
        })
        .await
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAiClient {
    async fn synthesize(&self, prompt: &str) -> Result<String, StepError> {
        debug!(
            "OpenAI image request: model={}, size={}, style={}, prompt={}",
            self.image_model,
            self.image_size,
            self.image_style,
            truncate_for_log(prompt, 200)
        );
        let payload = self.image_payload(prompt);
        log_upstream_timing("openai", &self.image_model, "redesign", || async {
            let response = self.post_json("images/generations", &payload).await?;
            extract_image_url(&response).ok_or_else(|| {
                StepError::Upstream("The image service did not return a valid image URL.".to_string())
            })
        })
        .await
    }
}
