use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::StepError;
use crate::llm::media::MediaKind;
use crate::storage::{MediaStore, UploadFile};
use crate::utils::http::truncate_for_log;
use crate::utils::timing::log_upstream_timing;

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorResponse {
    error: CloudinaryErrorDetail,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct CloudinaryStore {
    http: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    upload_preset: String,
    folder: String,
}

/// Signs the request parameters the way Cloudinary expects: sorted
/// `key=value` pairs joined with `&`, the secret appended, then hashed.
/// The product environment must be set to SHA-256 signatures.
pub(crate) fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn file_name_for(file: &UploadFile) -> String {
    if let Some(name) = file.file_name.as_deref().map(str::trim) {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    let ext = file.content_type.split('/').nth(1).unwrap_or("bin");
    format!("upload.{}", if ext == "jpeg" { "jpg" } else { ext })
}

fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<CloudinaryErrorResponse>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| truncate_for_log(body.trim(), 800))
}

impl CloudinaryStore {
    pub fn new(config: &Config, http: Client) -> Self {
        CloudinaryStore {
            http,
            base_url: config.cloudinary_base_url.trim_end_matches('/').to_string(),
            cloud_name: config.cloudinary_cloud_name.trim().to_string(),
            api_key: config.cloudinary_api_key.trim().to_string(),
            api_secret: config.cloudinary_api_secret.trim().to_string(),
            upload_preset: config.cloudinary_upload_preset.trim().to_string(),
            folder: config.upload_folder.clone(),
        }
    }

    pub(crate) fn upload_endpoint(&self, kind: MediaKind) -> String {
        format!("{}/{}/{}/upload", self.base_url, self.cloud_name, kind.as_str())
    }

    fn build_form(&self, file: &UploadFile) -> Result<Form, StepError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file_name_for(file))
            .mime_str(&file.content_type)
            .map_err(|err| {
                StepError::Upstream(format!("Invalid content type {}: {err}", file.content_type))
            })?;

        let form = Form::new().part("file", part).text("folder", self.folder.clone());

        if !self.upload_preset.is_empty() {
            return Ok(form.text("upload_preset", self.upload_preset.clone()));
        }

        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(StepError::Upstream(
                "Cloudinary credentials are not configured".to_string(),
            ));
        }

        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", self.folder.clone()), ("timestamp", timestamp.clone())],
            &self.api_secret,
        );
        Ok(form
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature))
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn store(&self, file: &UploadFile, kind: MediaKind) -> Result<String, StepError> {
        if self.cloud_name.is_empty() {
            return Err(StepError::Upstream(
                "CLOUDINARY_CLOUD_NAME is not configured".to_string(),
            ));
        }

        let form = self.build_form(file)?;
        let endpoint = self.upload_endpoint(kind);

        log_upstream_timing("cloudinary", kind.as_str(), "upload", move || async move {
            let response = self.http.post(&endpoint).multipart(form).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let message = error_message_from_body(&body);
                warn!("Cloudinary upload failed with status {status}: {message}");
                return Err(StepError::Upstream(format!(
                    "Cloudinary upload failed with status {status}: {message}"
                )));
            }

            let parsed = response.json::<CloudinaryUploadResponse>().await.map_err(|err| {
                StepError::Upstream(format!("Malformed Cloudinary response: {err}"))
            })?;
            match parsed.secure_url.or(parsed.url).filter(|url| !url.is_empty()) {
                Some(url) => {
                    info!("Uploaded {} ({} bytes) to Cloudinary: {}", kind.as_str(), file.bytes.len(), url);
                    Ok(url)
                }
                None => Err(StepError::Upstream(
                    "Cloudinary response did not include a URL".to_string(),
                )),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(config: Config) -> CloudinaryStore {
        CloudinaryStore::new(&config, Client::new())
    }

    #[test]
    fn signature_ignores_parameter_order_and_empty_values() {
        let a = sign_params(
            &[("timestamp", "1700000000".to_string()), ("folder", "rooms".to_string())],
            "secret",
        );
        let b = sign_params(
            &[
                ("folder", "rooms".to_string()),
                ("upload_preset", String::new()),
                ("timestamp", "1700000000".to_string()),
            ],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=rooms&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn endpoint_uses_resource_kind() {
        let config = Config {
            cloudinary_cloud_name: "demo".to_string(),
            ..Config::default()
        };
        let store = store_with(config);
        assert_eq!(
            store.upload_endpoint(MediaKind::Video),
            "https://api.cloudinary.com/v1_1/demo/video/upload"
        );
        assert_eq!(
            store.upload_endpoint(MediaKind::Image),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }

    #[test]
    fn file_name_falls_back_to_content_type() {
        let mut file = UploadFile {
            bytes: vec![1, 2, 3],
            content_type: "image/jpeg".to_string(),
            file_name: None,
        };
        assert_eq!(file_name_for(&file), "upload.jpg");
        file.file_name = Some("living-room.png".to_string());
        assert_eq!(file_name_for(&file), "living-room.png");
    }

    #[test]
    fn reads_cloudinary_error_message() {
        assert_eq!(
            error_message_from_body(r#"{"error":{"message":"Invalid Signature"}}"#),
            "Invalid Signature"
        );
        assert_eq!(error_message_from_body("gateway down"), "gateway down");
    }

    #[tokio::test]
    async fn unconfigured_store_fails_without_network() {
        let store = store_with(Config::default());
        let file = UploadFile {
            bytes: vec![0; 4],
            content_type: "image/png".to_string(),
            file_name: None,
        };
        let err = store.store(&file, MediaKind::Image).await.unwrap_err();
        assert!(matches!(err, StepError::Upstream(_)));
    }
}
