//! HTTP inference service.
//!
//! - `GET /` returns a static status line
//! - `POST /api/get-next-level` scores `{module_score, improvement_rate,
//!   moving_avg}` and returns the recommended difficulty with its Q-values

use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use candle_core::Device;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    agent::argmax,
    error::{DqnError, Result},
    network::DuelingQNetwork,
    state::{Difficulty, State},
};

pub const STATUS_LINE: &str = "MindBridge DQN API is running!";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub recommended_difficulty: Difficulty,
    pub q_values: Vec<f32>,
}

/// Loaded once at startup and only read afterwards.
pub struct Recommender {
    network: DuelingQNetwork,
}

impl Recommender {
    pub fn new(network: DuelingQNetwork) -> Self {
        Self { network }
    }

    pub fn load(model_path: &Path, device: &Device) -> Result<Self> {
        let network = DuelingQNetwork::load(model_path, device)?;
        log::info!("loaded model from {}", model_path.display());
        Ok(Self::new(network))
    }

    pub fn recommend(&self, state: &State) -> Result<Recommendation> {
        Recommendation::from_q_values(self.network.predict(state)?)
    }
}

impl Recommendation {
    /// Labels the arg-max action of `q_values`.
    pub fn from_q_values(q_values: Vec<f32>) -> Result<Self> {
        let difficulty = argmax(&q_values)
            .and_then(Difficulty::from_action)
            .ok_or_else(|| {
                DqnError::inference(format!(
                    "model produced {} Q-values, expected one per difficulty",
                    q_values.len()
                ))
            })?;
        Ok(Self {
            recommended_difficulty: difficulty,
            q_values,
        })
    }
}

/// Turns a request body into a state. Missing features default to 0;
/// numbers, numeric strings and booleans are accepted.
pub fn parse_features(body: &[u8]) -> Result<State> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DqnError::invalid_request("request body must be a JSON object"));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| DqnError::invalid_request(format!("invalid JSON body: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(DqnError::invalid_request("request body must be a JSON object"));
    };

    Ok(State::new(
        feature(&fields, "module_score")?,
        feature(&fields, "improvement_rate")?,
        feature(&fields, "moving_avg")?,
    ))
}

fn feature(fields: &Map<String, Value>, name: &str) -> Result<f32> {
    let value = match fields.get(name) {
        None => return Ok(0.0),
        Some(value) => value,
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    parsed
        .map(|v| v as f32)
        .ok_or_else(|| DqnError::invalid_request(format!("{name} must be a number, got {value}")))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for DqnError {
    fn into_response(self) -> Response {
        let status = match self {
            DqnError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => {
                log::error!("request failed: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

async fn handle_home() -> &'static str {
    STATUS_LINE
}

async fn handle_get_next_level(
    AxumState(recommender): AxumState<Arc<Recommender>>,
    body: Bytes,
) -> Result<Json<Recommendation>> {
    let state = parse_features(&body).inspect_err(|e| log::debug!("rejected request: {e}"))?;
    let recommendation = recommender.recommend(&state)?;
    log::debug!(
        "{:?} -> {} {:?}",
        state,
        recommendation.recommended_difficulty,
        recommendation.q_values
    );
    Ok(Json(recommendation))
}

pub fn create_router(recommender: Arc<Recommender>) -> Router {
    Router::new()
        .route("/", get(handle_home))
        .route("/api/get-next-level", post(handle_get_next_level))
        .with_state(recommender)
}

pub async fn run_server(addr: SocketAddr, recommender: Arc<Recommender>) -> anyhow::Result<()> {
    let router = create_router(recommender);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    log::info!("DQN API listening on http://{}", listener.local_addr()?);
    log::info!("  GET  /                    - status");
    log::info!("  POST /api/get-next-level  - difficulty recommendation");

    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkArch;

    fn recommender() -> Arc<Recommender> {
        let network = DuelingQNetwork::new(NetworkArch::default(), &Device::Cpu).unwrap();
        Arc::new(Recommender::new(network))
    }

    async fn call(body: &'static [u8]) -> (StatusCode, Value) {
        let response = handle_get_next_level(AxumState(recommender()), Bytes::from_static(body))
            .await
            .into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn missing_features_default_to_zero() {
        let state = parse_features(br#"{"module_score": 12}"#).unwrap();
        assert_eq!(state, State::new(12.0, 0.0, 0.0));
        assert_eq!(parse_features(b"{}").unwrap(), State::default());
    }

    #[test]
    fn numeric_strings_and_bools_are_coerced() {
        let state =
            parse_features(br#"{"module_score": " 80.5", "improvement_rate": true}"#).unwrap();
        assert_eq!(state, State::new(80.5, 1.0, 0.0));
    }

    #[test]
    fn malformed_bodies_are_invalid_requests() {
        for body in [
            &b""[..],
            b"not json",
            b"[1, 2, 3]",
            br#"{"module_score": "abc"}"#,
            br#"{"moving_avg": null}"#,
            br#"{"improvement_rate": [1]}"#,
        ] {
            assert!(
                matches!(parse_features(body), Err(DqnError::InvalidRequest(_))),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
    }

    async fn send(method: &str, uri: &str, body: &'static str) -> (StatusCode, Vec<u8>) {
        use axum::{body::Body, http::Request};
        use tower::ServiceExt;

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = create_router(recommender()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn router_serves_status_line_at_root() {
        let (status, body) = send("GET", "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, STATUS_LINE.as_bytes());
    }

    #[tokio::test]
    async fn router_scores_posted_features() {
        let (status, body) = send(
            "POST",
            "/api/get-next-level",
            r#"{"module_score":80,"improvement_rate":5,"moving_avg":75}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["q_values"].as_array().unwrap().len(), 3);
        assert!(json["recommended_difficulty"].is_string());

        let (status, body) = send("POST", "/api/get-next-level", r#"{"module_score":"x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn router_rejects_wrong_method_and_path() {
        let (status, _) = send("GET", "/api/get-next-level", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send("POST", "/api/next-level", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn home_returns_status_line() {
        assert_eq!(handle_home().await, STATUS_LINE);
    }

    #[tokio::test]
    async fn valid_request_returns_label_matching_argmax() {
        let (status, body) =
            call(br#"{"module_score":80,"improvement_rate":5,"moving_avg":75}"#).await;
        assert_eq!(status, StatusCode::OK);

        let q_values: Vec<f32> = body["q_values"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap() as f32)
            .collect();
        assert_eq!(q_values.len(), 3);

        let label = body["recommended_difficulty"].as_str().unwrap();
        let expected = Difficulty::from_action(argmax(&q_values).unwrap()).unwrap();
        assert_eq!(label, expected.label());
    }

    #[tokio::test]
    async fn non_numeric_score_is_bad_request() {
        let (status, body) = call(br#"{"module_score":"eighty"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("module_score"));
    }

    #[tokio::test]
    async fn empty_body_is_bad_request() {
        let (status, body) = call(b"").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("error").is_some());
    }

    #[test]
    fn unlabelled_best_action_is_an_inference_error() {
        let result = Recommendation::from_q_values(vec![0.0, 1.0, 2.0, 9.0]);
        assert!(matches!(result, Err(DqnError::Inference(_))));
        assert!(matches!(
            Recommendation::from_q_values(Vec::new()),
            Err(DqnError::Inference(_))
        ));

        let rec = Recommendation::from_q_values(vec![0.0, 4.0, 2.0]).unwrap();
        assert_eq!(rec.recommended_difficulty, Difficulty::Medium);
    }

    #[test]
    fn inference_errors_are_server_errors() {
        let response = DqnError::inference("bad output").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn recommendation_label_is_one_of_three() {
        let recommender = recommender();
        for score in [0.0, 25.0, 50.0, 100.0] {
            let rec = recommender
                .recommend(&State::new(score, score / 10.0, score))
                .unwrap();
            assert!(Difficulty::ALL.contains(&rec.recommended_difficulty));
            assert_eq!(
                rec.recommended_difficulty.action(),
                argmax(&rec.q_values).unwrap()
            );
        }
    }
}
