use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{Display, EnumString};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelBackend {
    Onnx,
    Torchscript,
    Stub,
}

impl ModelBackend {
    fn default_weights(&self) -> &'static str {
        match self {
            ModelBackend::Onnx => "yolov8n.onnx",
            ModelBackend::Torchscript => "yolov8n.torchscript",
            ModelBackend::Stub => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub models_dir: PathBuf,
    pub output_dir: PathBuf,
    pub database_url: String,
    pub model_backend: ModelBackend,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_upload_bytes: usize,
    pub enable_debug_endpoint: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "vision-agent-platform".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8081,
            upload_dir: PathBuf::from("data/uploads"),
            models_dir: PathBuf::from("data/models"),
            output_dir: PathBuf::from("data/outputs"),
            database_url: "sqlite://data/app.db".to_string(),
            model_backend: ModelBackend::Onnx,
            model_path: None,
            labels_path: None,
            font_path: None,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_upload_bytes: 50 * 1024 * 1024,
            enable_debug_endpoint: false,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Thresholds are probabilities; NaN fails the range check too.
fn check_ratio(key: &str, value: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

fn parse_ratio(key: &str, value: &str) -> Result<f32, ConfigError> {
    check_ratio(key, parse(key, value)?)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Settings {
    /// Defaults, then the YAML file named by `APP_CONFIG`, then environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let base = match std::env::var("APP_CONFIG") {
            Ok(path) => Self::from_yaml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(config_str)?;
        check_ratio("confidence_threshold", settings.confidence_threshold)?;
        check_ratio("iou_threshold", settings.iou_threshold)?;
        Ok(settings)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = lookup("HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse("PORT", &v)?;
        }
        if let Some(v) = lookup("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MODELS_DIR") {
            self.models_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("MODEL_BACKEND") {
            self.model_backend = parse("MODEL_BACKEND", &v.to_ascii_lowercase())?;
        }
        if let Some(v) = lookup("MODEL_PATH") {
            self.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LABELS_PATH") {
            self.labels_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FONT_PATH") {
            self.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_ratio("CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("IOU_THRESHOLD") {
            self.iou_threshold = parse_ratio("IOU_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("ENABLE_DEBUG_ENDPOINT") {
            self.enable_debug_endpoint = parse_bool("ENABLE_DEBUG_ENDPOINT", &v)?;
        }
        Ok(self)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.models_dir.join(self.model_backend.default_weights()))
    }

    /// Directory holding the SQLite file, if the URL names one.
    fn database_dir(&self) -> Option<PathBuf> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        if path.is_empty() || path.starts_with(":memory:") {
            return None;
        }
        let path = path.split('?').next().unwrap_or(path);
        Path::new(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let mut dirs = vec![
            self.upload_dir.clone(),
            self.models_dir.clone(),
            self.output_dir.clone(),
        ];
        dirs.extend(self.database_dir());
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}
