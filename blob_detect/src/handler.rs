use crate::{
    blob_image::{BlobImage, BlobImageError},
    config::ImageSource,
    prediction::{ClientFactory, ImagePrediction, PredictionError},
    settings::{PredictionSettings, SettingsError, SettingsSource},
};
use annotator::{annotate, AnnotationStyle};
use image::ImageFormat;
use reqwest::Url;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

pub const OUTPUT_CONTAINER: &str = "processed";

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid invocation payload: {0}")]
    Payload(String),
    #[error("Configuration error: {0}")]
    Configuration(#[from] SettingsError),
    #[error("{0}")]
    Decode(BlobImageError),
    #[error("Prediction failed: {0}")]
    Prediction(#[from] PredictionError),
    #[error("{0}")]
    Encode(BlobImageError),
    #[error("Image task failed: {0}")]
    Join(#[from] JoinError),
}

impl HandlerError {
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::Payload(_) => "payload",
            HandlerError::Configuration(_) => "configuration",
            HandlerError::Decode(_) => "decode",
            HandlerError::Prediction(_) => "prediction",
            HandlerError::Encode(_) => "encode",
            HandlerError::Join(_) => "internal",
        }
    }
}

/// One blob-trigger event.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug)]
pub struct AnnotatedBlob {
    pub name: String,
    pub output_path: String,
    pub content: Vec<u8>,
    pub format: ImageFormat,
    pub detections_received: usize,
    pub detections_drawn: usize,
    pub prediction_duration: Duration,
}

pub fn output_path(name: &str) -> String {
    format!("{}/{}", OUTPUT_CONTAINER, name)
}

/// Log lines of one invocation. Every line also goes to `tracing`; the
/// collected lines are handed back to the Functions host.
#[derive(Debug, Default)]
pub struct InvocationLog {
    lines: Vec<String>,
}

impl InvocationLog {
    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{}", line);
        self.lines.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!("{}", line);
        self.lines.push(line);
    }

    /// Records a failed invocation the same way whatever the cause.
    pub fn failure(&mut self, err: &HandlerError) {
        self.error(format!("Error: {}", err));
        self.error(format!("Error ({}): {:?}", err.kind(), err));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub threshold: f64,
    pub style: AnnotationStyle,
    pub image_source: ImageSource,
    pub blob_container_url: Option<String>,
}

/// Runs the decode, detect, annotate, encode pipeline for one blob.
pub struct ImageAnalyzer {
    settings: Arc<dyn SettingsSource>,
    client_factory: Arc<dyn ClientFactory>,
    options: Arc<HandlerOptions>,
}

impl ImageAnalyzer {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        client_factory: Arc<dyn ClientFactory>,
        options: HandlerOptions,
    ) -> Self {
        Self {
            settings,
            client_factory,
            options: Arc::new(options),
        }
    }

    /// Any failure is logged and returned; nothing is written in that case.
    #[instrument(skip_all, fields(name = %invocation.name))]
    pub async fn analyze(
        &self,
        invocation: Invocation,
        log: &mut InvocationLog,
    ) -> Result<AnnotatedBlob, HandlerError> {
        let result = self.run(invocation, log).await;
        if let Err(ref err) = result {
            log.failure(err);
        }
        result
    }

    async fn run(
        &self,
        invocation: Invocation,
        log: &mut InvocationLog,
    ) -> Result<AnnotatedBlob, HandlerError> {
        let Invocation { name, content } = invocation;
        log.info(format!(
            "Blob trigger function processed blob\n Name:{} \n Size: {} Bytes",
            name,
            content.len()
        ));

        let settings =
            PredictionSettings::from_source(self.settings.as_ref(), self.options.image_source)?;
        log.info(format!(
            "Prediction settings: endpoint={} project={} model={} source={:?}",
            settings.endpoint, settings.project_id, settings.model_name, self.options.image_source
        ));

        let client = self.client_factory.create(&settings)?;

        let decode_input = content.clone();
        let mut blob = tokio::task::spawn_blocking(move || BlobImage::from_bytes(&decode_input))
            .await?
            .map_err(HandlerError::Decode)?;
        let (w, h) = blob.dimensions();

        log.info(format!("Detecting objects in {}", name));
        log.info(format!("Image dimensions {}h x {}w", h, w));

        let started = Instant::now();
        let prediction: ImagePrediction = match self.options.image_source {
            ImageSource::Stream => {
                client
                    .detect_image(settings.project_id, &settings.model_name, content)
                    .await?
            }
            ImageSource::Url => {
                let url = self.blob_url(&name, settings.blob_sas.as_deref())?;
                client
                    .detect_image_url(settings.project_id, &settings.model_name, url.as_str())
                    .await?
            }
        };
        let prediction_duration = started.elapsed();
        let detections_received = prediction.predictions.len();
        let format = blob.format;

        let options = self.options.clone();
        let (content, detections_drawn) = tokio::task::spawn_blocking(move || {
            let drawn = annotate(
                &mut blob.image,
                &prediction.predictions,
                options.threshold,
                &options.style,
            );
            blob.encode().map(|bytes| (bytes, drawn))
        })
        .await?
        .map_err(HandlerError::Encode)?;

        log.info(format!(
            "Drew {} of {} detections above {}",
            detections_drawn, detections_received, self.options.threshold
        ));
        log.info(format!("{} saved in output blob", name));

        Ok(AnnotatedBlob {
            output_path: output_path(&name),
            name,
            format,
            content,
            detections_received,
            detections_drawn,
            prediction_duration,
        })
    }

    /// `{container}/{name}?{sas}` with the name encoded as one path segment.
    fn blob_url(&self, name: &str, sas: Option<&str>) -> Result<Url, HandlerError> {
        let container = self.options.blob_container_url.as_deref().ok_or_else(|| {
            PredictionError::InvalidUrl("no blob container url configured".to_string())
        })?;
        let mut url = Url::parse(container)
            .map_err(|e| PredictionError::InvalidUrl(format!("{}: {}", container, e)))?;
        url.path_segments_mut()
            .map_err(|_| PredictionError::InvalidUrl(container.to_string()))?
            .pop_if_empty()
            .push(name);
        url.set_query(sas.map(|s| s.trim_start_matches('?')));
        Ok(url)
    }
}
