use std::env;

use anyhow::Result;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: String,
    pub bind_addr: String,
    pub max_body_bytes: usize,
    pub upstream_timeout_seconds: u64,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub vision_model: String,
    pub vision_max_tokens: u32,
    pub vision_detail: String,
    pub image_model: String,
    pub image_size: String,
    pub image_style: String,
    pub cloudinary_cloud_name: String,
    pub cloudinary_api_key: String,
    pub cloudinary_api_secret: String,
    pub cloudinary_upload_preset: String,
    pub cloudinary_base_url: String,
    pub upload_folder: String,
    pub redesign_server_url: String,
    pub default_redesign_instruction: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            log_dir: "logs".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            max_body_bytes: 25 * 1024 * 1024,
            upstream_timeout_seconds: 180,
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            vision_model: "gpt-4o".to_string(),
            vision_max_tokens: 300,
            vision_detail: "high".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            image_style: "natural".to_string(),
            cloudinary_cloud_name: String::new(),
            cloudinary_api_key: String::new(),
            cloudinary_api_secret: String::new(),
            cloudinary_upload_preset: String::new(),
            cloudinary_base_url: "https://api.cloudinary.com/v1_1".to_string(),
            upload_folder: "disenador-ia-uploads".to_string(),
            redesign_server_url: "http://127.0.0.1:3000".to_string(),
            default_redesign_instruction: DEFAULT_REDESIGN_INSTRUCTION.to_string(),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_vision_detail(value: String) -> String {
    let lowered = value.trim().to_lowercase();
    match lowered.as_str() {
        "high" | "low" | "auto" => lowered,
        "" => "high".to_string(),
        _ => {
            warn!("Unknown VISION_DETAIL value '{}'; defaulting to high.", value);
            "high".to_string()
        }
    }
}

fn normalize_image_style(value: String) -> String {
    let lowered = value.trim().to_lowercase();
    match lowered.as_str() {
        "natural" | "vivid" => lowered,
        _ => {
            warn!("Unknown IMAGE_STYLE value '{}'; defaulting to natural.", value);
            "natural".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Config::default();

        let default_redesign_instruction = env_string(
            "DEFAULT_REDESIGN_INSTRUCTION",
            &defaults.default_redesign_instruction,
        );
        let default_redesign_instruction = if default_redesign_instruction.trim().is_empty() {
            defaults.default_redesign_instruction.clone()
        } else {
            default_redesign_instruction
        };

        Ok(Config {
            log_level: env_string("LOG_LEVEL", &defaults.log_level).to_lowercase(),
            log_dir: env_string("LOG_DIR", &defaults.log_dir),
            bind_addr: env_string("BIND_ADDR", &defaults.bind_addr),
            max_body_bytes: env_usize("MAX_BODY_BYTES", defaults.max_body_bytes).max(1024),
            upstream_timeout_seconds: env_u64(
                "UPSTREAM_TIMEOUT_SECONDS",
                defaults.upstream_timeout_seconds,
            )
            .max(1),
            openai_api_key: env_string("OPENAI_API_KEY", ""),
            openai_base_url: env_string("OPENAI_BASE_URL", &defaults.openai_base_url),
            vision_model: env_string("VISION_MODEL", &defaults.vision_model),
            vision_max_tokens: env_u32("VISION_MAX_TOKENS", defaults.vision_max_tokens).max(1),
            vision_detail: normalize_vision_detail(env_string(
                "VISION_DETAIL",
                &defaults.vision_detail,
            )),
            image_model: env_string("IMAGE_MODEL", &defaults.image_model),
            image_size: env_string("IMAGE_SIZE", &defaults.image_size),
            image_style: normalize_image_style(env_string("IMAGE_STYLE", &defaults.image_style)),
            cloudinary_cloud_name: env_string("CLOUDINARY_CLOUD_NAME", ""),
            cloudinary_api_key: env_string("CLOUDINARY_API_KEY", ""),
            cloudinary_api_secret: env_string("CLOUDINARY_API_SECRET", ""),
            cloudinary_upload_preset: env_string("CLOUDINARY_UPLOAD_PRESET", ""),
            cloudinary_base_url: env_string("CLOUDINARY_BASE_URL", &defaults.cloudinary_base_url),
            upload_folder: env_string("UPLOAD_FOLDER", &defaults.upload_folder),
            redesign_server_url: env_string("REDESIGN_SERVER_URL", &defaults.redesign_server_url),
            default_redesign_instruction,
        })
    }

    /// True when either a signed (key + secret) or an unsigned (preset)
    /// upload can be attempted.
    pub fn media_store_configured(&self) -> bool {
        let has_cloud = !self.cloudinary_cloud_name.trim().is_empty();
        let signed = !self.cloudinary_api_key.trim().is_empty()
            && !self.cloudinary_api_secret.trim().is_empty();
        let unsigned = !self.cloudinary_upload_preset.trim().is_empty();
        has_cloud && (signed || unsigned)
    }
}

pub const DESCRIBE_PROMPT: &str = "Describe this image in a concise, objective text, identifying the key elements, style, colors, lighting and perspective. The text will serve as the basis for an interior redesign.";

pub const REDESIGN_PROMPT_PREAMBLE: &str =
    "A high-quality, photorealistic interior design photograph.";

pub const REDESIGN_PROMPT_CONSTRAINTS: &str = "The new image must maintain the original room's perspective, structure, and overall lighting.\nDo not include any people or pets.";

pub const DEFAULT_REDESIGN_INSTRUCTION: &str = "Redesign this room in a modern, minimalist style with a neutral color palette. Add clean, contemporary furniture and a large abstract artwork on one wall.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_upstream_contract() {
        let config = Config::default();
        assert_eq!(config.vision_model, "gpt-4o");
        assert_eq!(config.vision_max_tokens, 300);
        assert_eq!(config.vision_detail, "high");
        assert_eq!(config.image_model, "dall-e-3");
        assert_eq!(config.image_size, "1024x1024");
        assert_eq!(config.image_style, "natural");
        assert_eq!(config.upload_folder, "disenador-ia-uploads");
        assert_eq!(config.default_redesign_instruction, DEFAULT_REDESIGN_INSTRUCTION);
    }

    #[test]
    fn unknown_detail_and_style_fall_back() {
        assert_eq!(normalize_vision_detail("LOW".to_string()), "low");
        assert_eq!(normalize_vision_detail("ultra".to_string()), "high");
        assert_eq!(normalize_image_style("Vivid".to_string()), "vivid");
        assert_eq!(normalize_image_style("cartoon".to_string()), "natural");
    }

    #[test]
    fn media_store_needs_cloud_and_credentials_or_preset() {
        let mut config = Config::default();
        assert!(!config.media_store_configured());

        config.cloudinary_cloud_name = "demo".to_string();
        assert!(!config.media_store_configured());

        config.cloudinary_upload_preset = "rooms".to_string();
        assert!(config.media_store_configured());

        config.cloudinary_upload_preset.clear();
        config.cloudinary_api_key = "key".to_string();
        config.cloudinary_api_secret = "secret".to_string();
        assert!(config.media_store_configured());
    }
}
