use facetag_core::{ResizeFilter, DEFAULT_DISTANCE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tagging configuration: defaults, then an optional TOML file, then `FACETAG_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing the ONNX model file.
    pub model_dir: PathBuf,
    /// Model file name inside `model_dir`.
    pub model_file: String,
    /// Full model path; overrides `model_dir`/`model_file` when set.
    pub model_path: Option<PathBuf>,
    /// Euclidean distance below which a face matches a known identity.
    pub distance_threshold: f32,
    /// Pixels added around each detector box before cropping.
    pub padding: u32,
    /// Interpolation for the resize to 112×112.
    pub resize_filter: ResizeFilter,
    /// Images decoded and aligned concurrently.
    pub max_concurrent_images: usize,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: facetag_core::default_model_dir(),
            model_file: "mobile_face_net.onnx".to_string(),
            model_path: None,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            padding: 0,
            resize_filter: ResizeFilter::default(),
            max_concurrent_images: 4,
            intra_threads: 2,
        }
    }
}

impl Config {
    /// Load from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACETAG_*` overrides. Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("FACETAG_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("FACETAG_MODEL_FILE") {
            self.model_file = file;
        }
        if let Some(path) = lookup("FACETAG_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(path));
        }
        if let Some(v) = parse_env(&lookup, "FACETAG_DISTANCE_THRESHOLD") {
            self.distance_threshold = v;
        }
        if let Some(v) = parse_env(&lookup, "FACETAG_PADDING") {
            self.padding = v;
        }
        if let Some(v) = parse_env(&lookup, "FACETAG_RESIZE_FILTER") {
            self.resize_filter = v;
        }
        if let Some(v) = parse_env(&lookup, "FACETAG_MAX_CONCURRENT_IMAGES") {
            self.max_concurrent_images = v;
        }
        if let Some(v) = parse_env(&lookup, "FACETAG_INTRA_THREADS") {
            self.intra_threads = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.distance_threshold.is_finite() || self.distance_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "distance_threshold must be a positive number, got {}",
                self.distance_threshold
            )));
        }
        if self.max_concurrent_images == 0 {
            return Err(ConfigError::Invalid("max_concurrent_images must be at least 1".into()));
        }
        if self.intra_threads == 0 {
            return Err(ConfigError::Invalid("intra_threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Path to the embedding model.
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.model_dir.join(&self.model_file))
    }
}

fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
