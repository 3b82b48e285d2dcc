pub mod annotate;
pub mod config;
pub mod detection;
pub mod error;
pub mod logging;
pub mod models;
pub mod transport;
pub mod watcher;

pub use annotate::Annotator;
pub use config::{DetectorBackend, LogLevel, ModelConfig, WatcherConfig};
pub use detection::{ClassLabels, Detector, Frame, build_detector, select_confident};
pub use error::{WatchError, WatchResult};
pub use models::{BoundingBox, Detection, DroneDetection};
pub use transport::ResultSender;
pub use watcher::{
    FolderWatcher, FrameOutcome, PollReport, ReleaseState, WatchSettings, wait_for_release,
};
