use crate::settings::PredictionSettings;
use annotator::Detection;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

const PREDICTION_KEY_HEADER: &str = "Prediction-Key";
const API_VERSION: &str = "v3.0";

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Prediction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Prediction service returned {status} ({code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Invalid prediction response: {0}")]
    InvalidResponse(String),
    #[error("Invalid prediction url: {0}")]
    InvalidUrl(String),
}

/// Body of a successful detect call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePrediction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub iteration: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub predictions: Vec<Detection>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    #[serde(rename = "Url")]
    url: &'a str,
}

#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn detect_image(
        &self,
        project_id: Uuid,
        published_name: &str,
        image: Vec<u8>,
    ) -> Result<ImagePrediction, PredictionError>;

    async fn detect_image_url(
        &self,
        project_id: Uuid,
        published_name: &str,
        url: &str,
    ) -> Result<ImagePrediction, PredictionError>;
}

/// Builds a fresh client for every invocation.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        settings: &PredictionSettings,
    ) -> Result<Box<dyn PredictionClient>, PredictionError>;
}

pub struct CustomVisionClientFactory {
    timeout: Duration,
}

impl CustomVisionClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ClientFactory for CustomVisionClientFactory {
    fn create(
        &self,
        settings: &PredictionSettings,
    ) -> Result<Box<dyn PredictionClient>, PredictionError> {
        let client = CustomVisionClient::new(&settings.endpoint, &settings.key, self.timeout)?;
        Ok(Box::new(client))
    }
}

/// Client for the Custom Vision prediction REST API.
pub struct CustomVisionClient {
    http: reqwest::Client,
    endpoint: Url,
    key: String,
}

impl CustomVisionClient {
    pub fn new(endpoint: &str, key: &str, timeout: Duration) -> Result<Self, PredictionError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| PredictionError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint,
            key: key.to_string(),
        })
    }

    fn detect_url(
        &self,
        project_id: Uuid,
        published_name: &str,
        kind: &str,
    ) -> Result<Url, PredictionError> {
        let project = project_id.to_string();
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| PredictionError::InvalidUrl(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend([
                "customvision",
                API_VERSION,
                "Prediction",
                project.as_str(),
                "detect",
                "iterations",
                published_name,
                kind,
            ]);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<ImagePrediction, PredictionError> {
        let response = request
            .header(PREDICTION_KEY_HEADER, &self.key)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error = serde_json::from_slice::<ServiceErrorBody>(&body).unwrap_or_else(|_| {
                ServiceErrorBody {
                    code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                    message: String::from_utf8_lossy(&body).into_owned(),
                }
            });
            return Err(PredictionError::Service {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| PredictionError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PredictionClient for CustomVisionClient {
    #[instrument(skip(self, image), fields(size = image.len()))]
    async fn detect_image(
        &self,
        project_id: Uuid,
        published_name: &str,
        image: Vec<u8>,
    ) -> Result<ImagePrediction, PredictionError> {
        let url = self.detect_url(project_id, published_name, "image")?;
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);

        let prediction = self.send(request).await?;
        tracing::debug!("Received {} predictions", prediction.predictions.len());
        Ok(prediction)
    }

    #[instrument(skip(self, url))]
    async fn detect_image_url(
        &self,
        project_id: Uuid,
        published_name: &str,
        url: &str,
    ) -> Result<ImagePrediction, PredictionError> {
        let detect_url = self.detect_url(project_id, published_name, "url")?;
        let request = self.http.post(detect_url).json(&ImageUrl { url });

        let prediction = self.send(request).await?;
        tracing::debug!("Received {} predictions", prediction.predictions.len());
        Ok(prediction)
    }
}
