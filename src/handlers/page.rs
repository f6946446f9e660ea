use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const INSTRUCTION_PLACEHOLDER: &str = "{{DEFAULT_INSTRUCTION}}";

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_index(default_instruction: &str) -> String {
    INDEX_HTML.replace(INSTRUCTION_PLACEHOLDER, &escape_html(default_instruction))
}

pub async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.config.default_redesign_instruction))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mediaStoreConfigured": state.config.media_store_configured(),
    }))
}
