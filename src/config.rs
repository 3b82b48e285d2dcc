use crate::error::{WatchError, WatchResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix the simulator gives each drone's capture folder
pub const DRONE_FOLDER_PREFIX: &str = "BP_DroneActor_C_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Which detection backend to run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// In-process YOLO model loaded with rten
    #[default]
    Rten,
    /// External program that prints detections as JSON
    Command,
}

/// Model and post-processing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: DetectorBackend,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    /// Inline class names, used when no labels file is given
    pub labels: Vec<String>,
    pub input_size: u32,
    /// Candidates below this score never leave the detector
    pub score_floor: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub command: Option<String>,
    pub command_args: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::default(),
            model_path: PathBuf::from("best.rten"),
            labels_path: None,
            labels: Vec::new(),
            input_size: 640,
            score_floor: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            command: None,
            command_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    pub watch_root: PathBuf,
    pub target_ip: String,
    pub target_port: u16,
    /// Rounded confidence must be strictly above this to be sent
    pub confidence_threshold: f64,
    pub extension: String,
    pub poll_interval_ms: u64,
    pub release_timeout_ms: u64,
    pub release_retry_ms: u64,
    pub annotate: bool,
    pub output_subdir: String,
    pub font_path: Option<PathBuf>,
    pub log_level: LogLevel,
    pub model: ModelConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_root: PathBuf::from("picture cam"),
            target_ip: "127.0.0.1".to_string(),
            target_port: 12345,
            confidence_threshold: 0.4,
            extension: "png".to_string(),
            poll_interval_ms: 50,
            release_timeout_ms: 5000,
            release_retry_ms: 100,
            annotate: true,
            output_subdir: "detected".to_string(),
            font_path: None,
            log_level: LogLevel::default(),
            model: ModelConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Load from a JSON file; keys that are absent keep their defaults
    pub fn load(path: &Path) -> WatchResult<Self> {
        if !path.exists() {
            return Err(WatchError::NotFound(format!(
                "config file {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let config: WatcherConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WatchResult<()> {
        if self.extension.is_empty() {
            return Err(WatchError::Config("extension must not be empty".into()));
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(WatchError::Config(format!(
                "model input size must be a positive multiple of 32, got {}",
                self.model.input_size
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(WatchError::Config(format!(
                "confidence threshold out of range: {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.model.iou_threshold) {
            return Err(WatchError::Config(format!(
                "iou threshold out of range: {}",
                self.model.iou_threshold
            )));
        }
        if self.model.backend == DetectorBackend::Command && self.model.command.is_none() {
            return Err(WatchError::Config(
                "command backend selected but no command configured".into(),
            ));
        }
        Ok(())
    }

    /// Capture folder the simulator writes for `drone_id`
    pub fn drone_folder(&self, drone_id: u32) -> PathBuf {
        self.watch_root
            .join(format!("{}{}", DRONE_FOLDER_PREFIX, drone_id))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }

    pub fn release_retry(&self) -> Duration {
        Duration::from_millis(self.release_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.target_port, 12345);
        assert_eq!(config.confidence_threshold, 0.4);
        assert_eq!(config.extension, "png");
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.release_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"target_port": 9000, "model": {{"labels": ["tank", "truck"]}}}}"#
        )
        .unwrap();

        let config = WatcherConfig::load(file.path()).unwrap();
        assert_eq!(config.target_port, 9000);
        assert_eq!(config.target_ip, "127.0.0.1");
        assert_eq!(config.model.labels, vec!["tank", "truck"]);
        assert_eq!(config.model.input_size, 640);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = WatcherConfig::load(Path::new("/nonexistent/drone-watch.json")).unwrap_err();
        assert!(matches!(err, WatchError::NotFound(_)));
    }

    #[test]
    fn test_command_backend_requires_command() {
        let mut config = WatcherConfig::default();
        config.model.backend = DetectorBackend::Command;
        assert!(matches!(config.validate(), Err(WatchError::Config(_))));

        config.model.command = Some("detector".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_confidence_threshold_must_be_a_probability() {
        for bad in [f64::NAN, f64::INFINITY, -0.1, 1.5] {
            let config = WatcherConfig {
                confidence_threshold: bad,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(WatchError::Config(_))), "{}", bad);
        }

        for good in [0.0, 0.4, 1.0] {
            let config = WatcherConfig {
                confidence_threshold: good,
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "{}", good);
        }
    }

    #[test]
    fn test_drone_folder() {
        let config = WatcherConfig {
            watch_root: PathBuf::from("/data/cams"),
            ..Default::default()
        };
        assert_eq!(
            config.drone_folder(2),
            PathBuf::from("/data/cams/BP_DroneActor_C_2")
        );
    }
}
