use crate::prediction::{ClientFactory, ImagePrediction, PredictionClient, PredictionError};
use crate::settings::PredictionSettings;
use annotator::Detection;
use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

pub fn complete_settings() -> HashMap<String, String> {
    [
        ("PredictionEndpoint", "https://westeurope.api.cognitive.microsoft.com/"),
        ("PredictionKey", "secret-key"),
        ("ProjectID", "1b0f6a3c-58e4-4d5c-9a0e-6c2f0b6d7e81"),
        ("ModelName", "parts-detector"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Hands out clients that answer with canned detections (or a failure) and
/// record every call as `image:{model}:` or `url:{model}:{url}`.
#[derive(Clone)]
pub struct FakeFactory {
    detections: Option<Vec<Detection>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections: Some(detections),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            detections: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ClientFactory for FakeFactory {
    fn create(
        &self,
        _settings: &PredictionSettings,
    ) -> Result<Box<dyn PredictionClient>, PredictionError> {
        Ok(Box::new(self.clone()))
    }
}

impl FakeFactory {
    fn respond(&self, call: String) -> Result<ImagePrediction, PredictionError> {
        self.calls.lock().unwrap().push(call);
        match &self.detections {
            Some(detections) => Ok(ImagePrediction {
                predictions: detections.clone(),
                ..ImagePrediction::default()
            }),
            None => Err(PredictionError::Service {
                status: 429,
                code: "TooManyRequests".to_string(),
                message: "Quota exceeded".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PredictionClient for FakeFactory {
    async fn detect_image(
        &self,
        _project_id: Uuid,
        published_name: &str,
        _image: Vec<u8>,
    ) -> Result<ImagePrediction, PredictionError> {
        self.respond(format!("image:{}:", published_name))
    }

    async fn detect_image_url(
        &self,
        _project_id: Uuid,
        published_name: &str,
        url: &str,
    ) -> Result<ImagePrediction, PredictionError> {
        self.respond(format!("url:{}:{}", published_name, url))
    }
}
