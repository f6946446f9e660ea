use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::llm::media::{kind_for_mime, MediaKind};
use crate::state::AppState;
use crate::storage::{UploadFile, UploadedMediaRecord};
use crate::utils::timing::RequestTimer;

const FILE_FIELD: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl UploadResponse {
    fn uploaded(record: UploadedMediaRecord) -> Self {
        UploadResponse {
            success: true,
            media_url: Some(record.url),
            media_type: Some(record.kind),
            message: Some("File uploaded successfully.".to_string()),
            error: None,
            details: None,
        }
    }

    fn failed(error: &str, details: Option<String>) -> Self {
        UploadResponse {
            success: false,
            media_url: None,
            media_type: None,
            message: None,
            error: Some(error.to_string()),
            details,
        }
    }
}

/// Pulls the `file` part out of the form. A zero-byte part is what browsers
/// send for an empty file input, so it counts as no file.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadFile>, String> {
    while let Some(field) = multipart.next_field().await.map_err(|err| err.to_string())? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|err| err.to_string())?;
        if bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadFile {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        }));
    }
    Ok(None)
}

pub async fn relay_upload(state: &AppState, file: Option<UploadFile>) -> (StatusCode, UploadResponse) {
    let Some(file) = file else {
        warn!("upload: request carried no file");
        return (
            StatusCode::BAD_REQUEST,
            UploadResponse::failed("No file was found to upload.", None),
        );
    };

    let kind = kind_for_mime(&file.content_type);
    info!(
        "upload: relaying {} bytes ({}) as {}",
        file.bytes.len(),
        file.content_type,
        kind.as_str()
    );

    match state.media_store.store(&file, kind).await {
        Ok(url) if !url.trim().is_empty() => (
            StatusCode::OK,
            UploadResponse::uploaded(UploadedMediaRecord { url, kind }),
        ),
        Ok(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            UploadResponse::failed(
                "Failed to upload the file to the media store.",
                Some("The media store returned an empty URL.".to_string()),
            ),
        ),
        Err(err) => {
            error!("upload: media store failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadResponse::failed(
                    "Failed to upload the file to the media store.",
                    Some(err.to_string()),
                ),
            )
        }
    }
}

pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut timer = RequestTimer::start("upload");
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            let status = rejection.status();
            warn!("upload: request is not a multipart form: {}", rejection.body_text());
            let body = UploadResponse::failed(
                "No file was found to upload.",
                Some(rejection.body_text()),
            );
            timer.complete(status.as_u16(), body.error.as_deref());
            return (status, Json(body)).into_response();
        }
    };
    let (status, body) = match read_file_field(&mut multipart).await {
        Ok(file) => relay_upload(&state, file).await,
        Err(details) => {
            error!("upload: failed to read multipart body: {details}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                UploadResponse::failed(
                    "Internal server error while processing the file upload.",
                    Some(details),
                ),
            )
        }
    };
    timer.complete(status.as_u16(), body.error.as_deref());
    (status, Json(body)).into_response()
}
