//! The two redesign steps: describe a room photo, then synthesize a
//! redesigned image from that description and a user instruction.
//!
//! Both steps validate their inputs before touching the upstream service
//! and never report success with empty content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{REDESIGN_PROMPT_CONSTRAINTS, REDESIGN_PROMPT_PREAMBLE};
use crate::error::StepError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescription(String);

impl SceneDescription {
    pub fn new(text: impl Into<String>) -> Self {
        SceneDescription(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedesignInstruction(String);

impl RedesignInstruction {
    pub fn new(text: impl Into<String>) -> Self {
        RedesignInstruction(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImageResult {
    pub image_url: String,
}

/// Vision-capable service that turns an image into text.
#[async_trait]
pub trait SceneDescriber: Send + Sync {
    async fn describe_scene(&self, image_url: &str) -> Result<String, StepError>;
}

/// Image-synthesis service that turns a prompt into one image URL.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str) -> Result<String, StepError>;
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub async fn describe(
    describer: &dyn SceneDescriber,
    image: Option<&str>,
) -> Result<SceneDescription, StepError> {
    let image = non_blank(image)
        .ok_or_else(|| StepError::MissingInput("Missing image in request body.".to_string()))?;

    let text = describer.describe_scene(image).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(StepError::Upstream(
            "The description service returned no content.".to_string(),
        ));
    }

    debug!("Scene description produced ({} chars)", text.chars().count());
    Ok(SceneDescription::new(text))
}

pub fn build_redesign_prompt(
    description: &SceneDescription,
    instruction: &RedesignInstruction,
) -> String {
    format!(
        "{}\nOriginal room details: {}.\n\nInstructions: {}.\n\n{}",
        REDESIGN_PROMPT_PREAMBLE,
        description.as_str().trim(),
        instruction.as_str().trim(),
        REDESIGN_PROMPT_CONSTRAINTS
    )
}

pub async fn redesign(
    synthesizer: &dyn ImageSynthesizer,
    description: Option<&str>,
    instruction: Option<&str>,
) -> Result<GeneratedImageResult, StepError> {
    let (Some(description), Some(instruction)) = (non_blank(description), non_blank(instruction))
    else {
        return Err(StepError::MissingInput(
            "Missing description or instruction in request body.".to_string(),
        ));
    };

    let prompt = build_redesign_prompt(
        &SceneDescription::new(description),
        &RedesignInstruction::new(instruction),
    );
    let image_url = synthesizer.synthesize(&prompt).await?;
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Err(StepError::Upstream(
            "The image service did not return a valid image URL.".to_string(),
        ));
    }

    info!("Redesigned image generated");
    Ok(GeneratedImageResult {
        image_url: image_url.to_string(),
    })
}
