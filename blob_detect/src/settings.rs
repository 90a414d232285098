use crate::config::ImageSource;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const PREDICTION_ENDPOINT: &str = "PredictionEndpoint";
pub const PREDICTION_KEY: &str = "PredictionKey";
pub const PROJECT_ID: &str = "ProjectID";
pub const MODEL_NAME: &str = "ModelName";
pub const BLOB_SAS: &str = "BlobSAS";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Missing setting: {0}")]
    Missing(&'static str),
    #[error("Invalid ProjectID `{value}`: {source}")]
    InvalidProjectId { value: String, source: uuid::Error },
}

/// Where per-invocation app settings are looked up.
pub trait SettingsSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Process environment, which is where the Functions host puts app settings.
pub struct EnvSource;

impl SettingsSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl SettingsSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

#[derive(Clone)]
pub struct PredictionSettings {
    pub endpoint: String,
    pub key: String,
    pub project_id: Uuid,
    pub model_name: String,
    pub blob_sas: Option<String>,
}

impl fmt::Debug for PredictionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionSettings")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("model_name", &self.model_name)
            .field("blob_sas", &self.blob_sas.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PredictionSettings {
    /// Reads the settings for one invocation. `BlobSAS` is only required when
    /// the prediction service is handed a URL instead of the image bytes.
    pub fn from_source(
        source: &dyn SettingsSource,
        image_source: ImageSource,
    ) -> Result<Self, SettingsError> {
        let endpoint = required(source, PREDICTION_ENDPOINT)?;
        let key = required(source, PREDICTION_KEY)?;
        let project = required(source, PROJECT_ID)?;
        let project_id = Uuid::parse_str(project.trim()).map_err(|source| {
            SettingsError::InvalidProjectId {
                value: project.clone(),
                source,
            }
        })?;
        let model_name = required(source, MODEL_NAME)?;
        let blob_sas = match image_source {
            ImageSource::Url => Some(required(source, BLOB_SAS)?),
            ImageSource::Stream => optional(source, BLOB_SAS),
        };

        Ok(Self {
            endpoint,
            key,
            project_id,
            model_name,
            blob_sas,
        })
    }
}

fn optional(source: &dyn SettingsSource, key: &str) -> Option<String> {
    source.get(key).filter(|value| !value.trim().is_empty())
}

fn required(source: &dyn SettingsSource, key: &'static str) -> Result<String, SettingsError> {
    optional(source, key).ok_or(SettingsError::Missing(key))
}
