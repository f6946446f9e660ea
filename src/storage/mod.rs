pub mod cloudinary;

use async_trait::async_trait;

use crate::error::StepError;
use crate::llm::media::MediaKind;

pub use cloudinary::CloudinaryStore;

/// One file received by the upload relay.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMediaRecord {
    pub url: String,
    pub kind: MediaKind,
}

/// Hosted media store that returns a public URL for each stored file.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, file: &UploadFile, kind: MediaKind) -> Result<String, StepError>;
}
