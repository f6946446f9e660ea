use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::capture::CapturedImage;
use crate::error::StepError;
use crate::pipeline::{
    self, GeneratedImageResult, ImageSynthesizer, RedesignInstruction, SceneDescriber,
    SceneDescription,
};

/// The two calls the workflow needs, wherever they are served from.
#[async_trait]
pub trait RedesignApi: Send + Sync {
    async fn describe(&self, image: &CapturedImage) -> Result<SceneDescription, StepError>;

    async fn redesign(
        &self,
        description: &SceneDescription,
        instruction: &RedesignInstruction,
    ) -> Result<GeneratedImageResult, StepError>;
}

#[derive(Debug, Deserialize)]
struct DescribeBody {
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedesignBody {
    image_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct FailureBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Talks to this service's own `/api/describe` and `/api/redesign` routes.
pub struct HttpRedesignApi {
    http: Client,
    base_url: String,
}

impl HttpRedesignApi {
    pub fn new(http: Client, base_url: &str) -> Self {
        HttpRedesignApi {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, StepError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {url}");
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| StepError::Upstream(format!("Malformed response from {path}: {err}")));
        }

        let failure = response.json::<FailureBody>().await.unwrap_or_default();
        let message = failure
            .error
            .or(failure.message)
            .unwrap_or_else(|| format!("Request to {path} failed with status {status}"));
        if status.is_client_error() {
            Err(StepError::MissingInput(message))
        } else {
            Err(StepError::Upstream(message))
        }
    }
}

#[async_trait]
impl RedesignApi for HttpRedesignApi {
    async fn describe(&self, image: &CapturedImage) -> Result<SceneDescription, StepError> {
        let body: DescribeBody = self
            .post("/api/describe", json!({ "image": image.data_url }))
            .await?;
        Ok(SceneDescription::new(body.description))
    }

    async fn redesign(
        &self,
        description: &SceneDescription,
        instruction: &RedesignInstruction,
    ) -> Result<GeneratedImageResult, StepError> {
        let body: RedesignBody = self
            .post(
                "/api/redesign",
                json!({
                    "description": description.as_str(),
                    "instruction": instruction.as_str(),
                }),
            )
            .await?;
        Ok(GeneratedImageResult {
            image_url: body.image_url,
        })
    }
}

/// Runs the steps in-process against the upstream services directly.
pub struct LocalPipeline {
    describer: Arc<dyn SceneDescriber>,
    synthesizer: Arc<dyn ImageSynthesizer>,
}

impl LocalPipeline {
    pub fn new(describer: Arc<dyn SceneDescriber>, synthesizer: Arc<dyn ImageSynthesizer>) -> Self {
        LocalPipeline {
            describer,
            synthesizer,
        }
    }
}

#[async_trait]
impl RedesignApi for LocalPipeline {
    async fn describe(&self, image: &CapturedImage) -> Result<SceneDescription, StepError> {
        pipeline::describe(self.describer.as_ref(), Some(&image.data_url)).await
    }

    async fn redesign(
        &self,
        description: &SceneDescription,
        instruction: &RedesignInstruction,
    ) -> Result<GeneratedImageResult, StepError> {
        pipeline::redesign(
            self.synthesizer.as_ref(),
            Some(description.as_str()),
            Some(instruction.as_str()),
        )
        .await
    }
}

/// Fetches a generated image and writes it to `path`.
pub async fn download_image(http: &Client, url: &str, path: &Path) -> Result<usize, StepError> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(StepError::Upstream(format!(
            "Image download failed with status {}",
            response.status()
        )));
    }
    let bytes = response.bytes().await?;
    tokio::fs::write(path, &bytes).await?;
    Ok(bytes.len())
}
