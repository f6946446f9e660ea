use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::StepError;
use crate::pipeline;
use crate::state::AppState;
use crate::utils::timing::RequestTimer;

#[derive(Debug, Default, Deserialize)]
pub struct DescribeRequest {
    #[serde(default, alias = "imageBase64")]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub description: String,
    /// Same text under the field name older clients read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedesignRequest {
    #[serde(default, alias = "analysis")]
    pub description: Option<String>,
    #[serde(default, alias = "redesignPrompt")]
    pub instruction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedesignResponse {
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn error_response(route: &str, err: StepError, timer: &mut RequestTimer) -> Response {
    let (status, body) = match err {
        StepError::MissingInput(message) => {
            warn!("{route}: {message}");
            (StatusCode::BAD_REQUEST, ErrorBody { message, error: None })
        }
        other => {
            error!("{route} failed ({}): {}", other.kind(), other.message());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    message: "Internal Server Error".to_string(),
                    error: Some(other.message().to_string()),
                },
            )
        }
    };
    timer.complete(status.as_u16(), body.error.as_deref().or(Some(body.message.as_str())));
    (status, Json(body)).into_response()
}

/// Body that could not be parsed as the expected JSON. Keeps axum's status
/// and reports its reason in the usual error shape.
fn rejection_response(route: &str, rejection: JsonRejection, timer: &mut RequestTimer) -> Response {
    let status = rejection.status();
    let message = rejection.body_text();
    warn!("{route}: rejected body: {message}");
    timer.complete(status.as_u16(), Some(message.as_str()));
    (status, Json(ErrorBody { message, error: None })).into_response()
}

async fn run_describe(
    state: AppState,
    payload: Result<Json<DescribeRequest>, JsonRejection>,
    legacy: bool,
) -> Response {
    let mut timer = RequestTimer::start(if legacy { "analyze-image" } else { "describe" });
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response("describe", rejection, &mut timer),
    };
    match pipeline::describe(state.describer.as_ref(), request.image.as_deref()).await {
        Ok(description) => {
            timer.complete(StatusCode::OK.as_u16(), None);
            let text = description.as_str().to_string();
            let body = DescribeResponse {
                analysis: legacy.then(|| text.clone()),
                description: text,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response("describe", err, &mut timer),
    }
}

pub async fn describe_handler(
    State(state): State<AppState>,
    payload: Result<Json<DescribeRequest>, JsonRejection>,
) -> Response {
    run_describe(state, payload, false).await
}

/// `/api/analyze-image`: describe, answering with `analysis` as well.
pub async fn analyze_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<DescribeRequest>, JsonRejection>,
) -> Response {
    run_describe(state, payload, true).await
}

pub async fn redesign_handler(
    State(state): State<AppState>,
    payload: Result<Json<RedesignRequest>, JsonRejection>,
) -> Response {
    let mut timer = RequestTimer::start("redesign");
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response("redesign", rejection, &mut timer),
    };
    let result = pipeline::redesign(
        state.synthesizer.as_ref(),
        request.description.as_deref(),
        request.instruction.as_deref(),
    )
    .await;
    match result {
        Ok(generated) => {
            timer.complete(StatusCode::OK.as_u16(), None);
            let body = RedesignResponse {
                image_url: generated.image_url,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response("redesign", err, &mut timer),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::config::Config;
    use crate::handlers::tests::{read_json, spawn_app, FailingStore};
    use crate::pipeline::fakes::{FakeDescriber, FakeSynthesizer};

    fn state_with(describer: Arc<FakeDescriber>, synthesizer: Arc<FakeSynthesizer>) -> AppState {
        AppState::with_services(Config::default(), describer, synthesizer, Arc::new(FailingStore))
    }

    #[tokio::test]
    async fn describe_without_image_is_400_and_skips_upstream() {
        let describer = Arc::new(FakeDescriber::replying(Ok("a room")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let state = state_with(describer.clone(), synthesizer);

        let response = describe_handler(State(state), Ok(Json(DescribeRequest::default()))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = read_json(response).await;
        assert_eq!(body["message"], "Missing image in request body.");
        assert!(body.get("error").is_none());
        assert_eq!(describer.call_count(), 0);
    }

    #[tokio::test]
    async fn describe_returns_description() {
        let describer = Arc::new(FakeDescriber::replying(Ok("A sunny bedroom.")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let state = state_with(describer.clone(), synthesizer);

        let request = DescribeRequest {
            image: Some("data:image/png;base64,AAAA".to_string()),
        };
        let response = describe_handler(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: DescribeResponse = read_json(response).await;
        assert_eq!(body.description, "A sunny bedroom.");
        assert_eq!(describer.call_count(), 1);
    }

    #[tokio::test]
    async fn describe_upstream_failure_is_500_with_message() {
        let describer = Arc::new(FakeDescriber::replying(Err(StepError::Upstream(
            "model overloaded".to_string(),
        ))));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let state = state_with(describer, synthesizer);

        let request = DescribeRequest {
            image: Some("data:image/png;base64,AAAA".to_string()),
        };
        let response = describe_handler(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = read_json(response).await;
        assert_eq!(body.message, "Internal Server Error");
        assert_eq!(body.error.as_deref(), Some("model overloaded"));
    }

    #[tokio::test]
    async fn redesign_missing_field_is_400_and_skips_upstream() {
        let describer = Arc::new(FakeDescriber::replying(Ok("a room")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let state = state_with(describer, synthesizer.clone());

        let request = RedesignRequest {
            description: Some("a room".to_string()),
            instruction: None,
        };
        let response = redesign_handler(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = read_json(response).await;
        assert_eq!(body.message, "Missing description or instruction in request body.");
        assert_eq!(synthesizer.call_count(), 0);
    }

    #[tokio::test]
    async fn redesign_returns_image_url_in_camel_case() {
        let describer = Arc::new(FakeDescriber::replying(Ok("a room")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let state = state_with(describer, synthesizer.clone());

        let request = RedesignRequest {
            description: Some("a room".to_string()),
            instruction: Some("scandinavian".to_string()),
        };
        let response = redesign_handler(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = read_json(response).await;
        assert_eq!(body["imageUrl"], "https://img.example/1.png");
        assert_eq!(synthesizer.call_count(), 1);
    }

    #[tokio::test]
    async fn redesign_empty_result_is_500() {
        let describer = Arc::new(FakeDescriber::replying(Ok("a room")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("")));
        let state = state_with(describer, synthesizer);

        let request = RedesignRequest {
            description: Some("a room".to_string()),
            instruction: Some("scandinavian".to_string()),
        };
        let response = redesign_handler(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = read_json(response).await;
        assert!(body.error.is_some());
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let describe: DescribeRequest =
            serde_json::from_str(r#"{"imageBase64":"data:image/png;base64,AAAA"}"#).unwrap();
        assert_eq!(describe.image.as_deref(), Some("data:image/png;base64,AAAA"));

        let redesign: RedesignRequest =
            serde_json::from_str(r#"{"analysis":"a room","redesignPrompt":"boho"}"#).unwrap();
        assert_eq!(redesign.description.as_deref(), Some("a room"));
        assert_eq!(redesign.instruction.as_deref(), Some("boho"));

        let empty: RedesignRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.description.is_none() && empty.instruction.is_none());
    }

    #[tokio::test]
    async fn legacy_route_also_answers_with_analysis() {
        let describer = Arc::new(FakeDescriber::replying(Ok("A tiled kitchen.")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let request = DescribeRequest {
            image: Some("data:image/png;base64,AAAA".to_string()),
        };
        let response = analyze_image_handler(
            State(state_with(describer.clone(), synthesizer.clone())),
            Ok(Json(request)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = read_json(response).await;
        assert_eq!(body["analysis"], "A tiled kitchen.");
        assert_eq!(body["description"], "A tiled kitchen.");

        let request = DescribeRequest {
            image: Some("data:image/png;base64,AAAA".to_string()),
        };
        let response =
            describe_handler(State(state_with(describer, synthesizer)), Ok(Json(request))).await;
        let body: Value = read_json(response).await;
        assert!(body.get("analysis").is_none());
    }

    #[tokio::test]
    async fn unparseable_bodies_get_json_errors() {
        let describer = Arc::new(FakeDescriber::replying(Ok("a room")));
        let synthesizer = Arc::new(FakeSynthesizer::replying(Ok("https://img.example/1.png")));
        let base = spawn_app(state_with(describer.clone(), synthesizer.clone())).await;
        let http = reqwest::Client::new();

        let response = http
            .post(format!("{base}/api/describe"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 415);
        let body: ErrorBody = response.json().await.unwrap();
        assert!(!body.message.is_empty());

        let response = http
            .post(format!("{base}/api/redesign"))
            .header("content-type", "application/json")
            .body("{\"description\": ")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: ErrorBody = response.json().await.unwrap();
        assert!(!body.message.is_empty());

        assert_eq!(describer.call_count(), 0);
        assert_eq!(synthesizer.call_count(), 0);
    }
}
