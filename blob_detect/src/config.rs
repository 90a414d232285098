use annotator::{AnnotationStyle, FontError, Rgba, DEFAULT_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CUSTOM_HANDLER_PORT: &str = "FUNCTIONS_CUSTOMHANDLER_PORT";
const CONFIGURATION_DIR: &str = "APP_CONFIGURATION_DIR";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

fn default_max_body_mb() -> usize {
    64
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnnotationConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_color")]
    pub stroke_color: [u8; 3],
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    #[serde(default = "default_color")]
    pub text_color: [u8; 3],
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Falls back to a system font when unset.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_color() -> [u8; 3] {
    [255, 0, 0]
}

fn default_stroke_width() -> u32 {
    3
}

fn default_font_size() -> f32 {
    16.0
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            stroke_color: default_color(),
            stroke_width: default_stroke_width(),
            text_color: default_color(),
            font_size: default_font_size(),
            font_path: None,
        }
    }
}

fn opaque([r, g, b]: [u8; 3]) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

impl AnnotationConfig {
    pub fn to_style(&self) -> Result<AnnotationStyle, FontError> {
        let style = AnnotationStyle {
            stroke_color: opaque(self.stroke_color),
            stroke_width: self.stroke_width,
            text_color: opaque(self.text_color),
            font: None,
            font_size: self.font_size,
        };

        match &self.font_path {
            Some(path) => style.with_font_path(path),
            None => Ok(style.with_system_font()),
        }
    }
}

/// Whether the prediction service gets the image bytes or a signed URL to the
/// source blob.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    #[default]
    Stream,
    Url,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictionConfig {
    #[serde(default)]
    pub image_source: ImageSource,
    /// Base URL of the trigger container, e.g.
    /// `https://account.blob.core.windows.net/images`.
    #[serde(default)]
    pub blob_container_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            image_source: ImageSource::default(),
            blob_container_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PredictionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.image_source == ImageSource::Url && self.blob_container_url.is_none() {
            return Err("prediction.blob_container_url is required when image_source is `url`".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

/// `APP_CONFIGURATION_DIR` when set, otherwise `configuration/` under the
/// working directory, falling back to the one next to the executable. The
/// Functions host starts the handler from the function app root, where the
/// executable and its `configuration/` are deployed side by side.
fn configuration_directory(
    working_dir: &Path,
    executable_dir: Option<&Path>,
    override_dir: Option<String>,
) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }

    let local = working_dir.join("configuration");
    if local.is_dir() {
        return local;
    }

    match executable_dir.map(|dir| dir.join("configuration")) {
        Some(beside_exe) if beside_exe.is_dir() => beside_exe,
        _ => local,
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let executable = std::env::current_exe().ok();
    let configuration_directory = configuration_directory(
        &base_path,
        executable.as_deref().and_then(Path::parent),
        std::env::var(CONFIGURATION_DIR).ok(),
    );

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("BD")
                .prefix_separator("_")
                .separator("__"),
        )
        // the Functions host decides which port the handler listens on
        .set_override_option("server.port", std::env::var(CUSTOM_HANDLER_PORT).ok())?
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.prediction.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("blob_detect_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_configuration_directory_override() {
        let dir = configuration_directory(
            Path::new("/srv/app"),
            None,
            Some("/etc/blob_detect".to_string()),
        );
        assert_eq!(dir, PathBuf::from("/etc/blob_detect"));

        let blank = configuration_directory(Path::new("/srv/app"), None, Some(" ".to_string()));
        assert_eq!(blank, PathBuf::from("/srv/app/configuration"));
    }

    #[test]
    fn test_configuration_directory_prefers_working_dir() {
        let working = scratch_dir("cwd");
        let exe = scratch_dir("exe");
        std::fs::create_dir_all(working.join("configuration")).unwrap();
        std::fs::create_dir_all(exe.join("configuration")).unwrap();

        let dir = configuration_directory(&working, Some(&exe), None);

        assert_eq!(dir, working.join("configuration"));
    }

    #[test]
    fn test_configuration_directory_beside_executable() {
        let working = scratch_dir("empty_cwd");
        let exe = scratch_dir("deployed");
        std::fs::create_dir_all(exe.join("configuration")).unwrap();

        let dir = configuration_directory(&working, Some(&exe), None);

        assert_eq!(dir, exe.join("configuration"));
    }

    #[test]
    fn test_defaults() {
        let config = from_yaml(
            r#"
server:
  host: 0.0.0.0
  port: 7071
log_level: info
"#,
        )
        .unwrap();

        assert_eq!(config.server.get_address(), "0.0.0.0:7071");
        assert_eq!(config.server.max_body_bytes(), 64 * 1024 * 1024);
        assert_eq!(config.annotation.threshold, 0.3);
        assert_eq!(config.annotation.stroke_width, 3);
        assert_eq!(config.prediction.image_source, ImageSource::Stream);
        assert_eq!(config.prediction.timeout_secs, 30);
        assert!(config.prediction.validate().is_ok());
    }

    #[test]
    fn test_url_source_requires_container_url() {
        let config = from_yaml(
            r#"
server:
  host: 127.0.0.1
  port: 8080
log_level: debug
prediction:
  image_source: url
"#,
        )
        .unwrap();

        assert_eq!(config.prediction.image_source, ImageSource::Url);
        assert!(config.prediction.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let result = from_yaml(
            r#"
server:
  host: 127.0.0.1
  port: 8080
log_level: verbose
"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_annotation_style_from_config() {
        let config = AnnotationConfig {
            stroke_color: [0, 255, 0],
            text_color: [0, 0, 255],
            stroke_width: 2,
            ..AnnotationConfig::default()
        };

        let style = config.to_style().unwrap();

        assert_eq!(style.stroke_color, Rgba([0, 255, 0, 255]));
        assert_eq!(style.text_color, Rgba([0, 0, 255, 255]));
        assert_eq!(style.stroke_width, 2);
    }

    #[test]
    fn test_annotation_style_with_missing_font() {
        let config = AnnotationConfig {
            font_path: Some(PathBuf::from("./no/such/font.ttf")),
            ..AnnotationConfig::default()
        };

        assert!(config.to_style().is_err());
    }
}
