use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::llm::OpenAiClient;
use crate::pipeline::{ImageSynthesizer, SceneDescriber};
use crate::storage::{CloudinaryStore, MediaStore};

/// Shared, read-only handler state. Requests never mutate it, so
/// concurrent requests stay isolated.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub describer: Arc<dyn SceneDescriber>,
    pub synthesizer: Arc<dyn ImageSynthesizer>,
    pub media_store: Arc<dyn MediaStore>,
}

impl AppState {
    pub fn new(config: Config, http: Client) -> Self {
        let openai = Arc::new(OpenAiClient::new(&config, http.clone()));
        let media_store = Arc::new(CloudinaryStore::new(&config, http));
        AppState::with_services(config, openai.clone(), openai, media_store)
    }

    pub fn with_services(
        config: Config,
        describer: Arc<dyn SceneDescriber>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        media_store: Arc<dyn MediaStore>,
    ) -> Self {
        AppState {
            config: Arc::new(config),
            describer,
            synthesizer,
            media_store,
        }
    }
}
