use crate::{
    handler::{HandlerError, Invocation, InvocationLog},
    server::SharedState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::instrument;

/// Function name as registered with the Functions host.
pub const FUNCTION_NAME: &str = "analyzeImage";
const TRIGGER_BINDING: &str = "myBlob";
const OUTPUT_BINDING: &str = "outputBlob";
const NAME_METADATA: &str = "name";

/// Invocation request sent by the Functions host to a custom handler.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct InvokeRequest {
    #[serde(rename = "Data", default)]
    pub data: Map<String, Value>,
    #[serde(rename = "Metadata", default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct InvokeResponse {
    #[serde(rename = "Outputs")]
    pub outputs: Map<String, Value>,
    #[serde(rename = "Logs")]
    pub logs: Vec<String>,
    #[serde(rename = "ReturnValue")]
    pub return_value: Value,
}

impl InvokeRequest {
    fn into_invocation(self) -> Result<Invocation, HandlerError> {
        let name = self
            .metadata
            .get(NAME_METADATA)
            .and_then(Value::as_str)
            .map(unquote)
            .ok_or_else(|| {
                HandlerError::Payload(format!("missing metadata `{}`", NAME_METADATA))
            })?;

        let encoded = self
            .data
            .get(TRIGGER_BINDING)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                HandlerError::Payload(format!("missing binding `{}`", TRIGGER_BINDING))
            })?;
        let content = STANDARD.decode(unquote(encoded)).map_err(|e| {
            HandlerError::Payload(format!("`{}` is not base64: {}", TRIGGER_BINDING, e))
        })?;

        Ok(Invocation { name, content })
    }
}

// The host sometimes forwards string values JSON-quoted. Only one enclosing
// pair is removed; quotes inside a blob name are kept.
fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

#[instrument(skip(state, request))]
pub async fn analyze_image(
    State(state): State<SharedState>,
    Json(request): Json<InvokeRequest>,
) -> Response {
    state.metrics.record_request(FUNCTION_NAME);
    let mut log = InvocationLog::default();

    let result = match request.into_invocation() {
        Ok(invocation) => state.analyzer.analyze(invocation, &mut log).await,
        Err(err) => {
            log.failure(&err);
            Err(err)
        }
    };

    match result {
        Ok(blob) => {
            state.metrics.record_invocation("success");
            state
                .metrics
                .record_prediction_duration(blob.prediction_duration.as_millis() as u64);
            state
                .metrics
                .record_detections_drawn(blob.detections_drawn as u64);

            let mut outputs = Map::new();
            outputs.insert(
                OUTPUT_BINDING.to_string(),
                Value::String(STANDARD.encode(&blob.content)),
            );
            let response = InvokeResponse {
                outputs,
                logs: log.into_lines(),
                return_value: Value::Null,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            state.metrics.record_invocation(err.kind());
            let response = InvokeResponse {
                outputs: Map::new(),
                return_value: json!({ "error": err.kind(), "message": err.to_string() }),
                logs: log.into_lines(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}
