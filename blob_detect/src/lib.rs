mod blob_image;
mod routes;
mod server;
mod settings;
mod telemetry;

pub mod app;
pub mod config;
pub mod handler;
pub mod prediction;

#[cfg(test)]
mod test_utils;

pub use app::start_app;
pub use blob_image::{BlobImage, BlobImageError};
pub use settings::{EnvSource, PredictionSettings, SettingsError, SettingsSource};
