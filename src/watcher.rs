use crate::annotate::Annotator;
use crate::config::WatcherConfig;
use crate::detection::{Detector, Frame, select_confident};
use crate::error::{WatchError, WatchResult};
use crate::transport::ResultSender;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Loop parameters taken from the config
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub extension: String,
    pub confidence_threshold: f64,
    pub poll_interval: Duration,
    pub release_timeout: Duration,
    pub release_retry: Duration,
}

impl WatchSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            extension: config.extension.clone(),
            confidence_threshold: config.confidence_threshold,
            poll_interval: config.poll_interval(),
            release_timeout: config.release_timeout(),
            release_retry: config.release_retry(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    Ready,
    TimedOut,
    Missing,
}

/// Wait until the writer lets go of `path`.
///
/// Retries every `retry` while opening is refused, up to `timeout`.
/// Any open error other than not-found counts as the writer still holding
/// the file; Windows sharing violations do not map to `PermissionDenied`.
pub fn wait_for_release(path: &Path, timeout: Duration, retry: Duration) -> ReleaseState {
    let start = Instant::now();
    loop {
        match File::open(path) {
            Ok(_) => return ReleaseState::Ready,
            Err(e) if e.kind() == ErrorKind::NotFound => return ReleaseState::Missing,
            Err(e) => {
                if start.elapsed() > timeout {
                    debug!("Gave up on {}: {}", path.display(), e);
                    return ReleaseState::TimedOut;
                }
                thread::sleep(retry);
            }
        }
    }
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Confident detections were sent
    Sent { detections: usize, sent: usize },
    /// Detector ran but nothing passed the threshold
    NothingConfident { detections: usize },
    /// Detector or transport failed; not retried
    Failed,
    /// Still locked by the writer; retried next poll
    TimedOut,
    /// Removed before it could be read
    Missing,
    /// Not decodable yet (usually half-written); retried next poll
    Unreadable,
}

impl FrameOutcome {
    /// Whether the file is done and must not be looked at again
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            FrameOutcome::Sent { .. } | FrameOutcome::NothingConfident { .. } | FrameOutcome::Failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub pending: usize,
    pub processed: usize,
    pub sent: usize,
    pub deferred: usize,
}

/// Polls one drone's capture folder and forwards detections
pub struct FolderWatcher<D: Detector> {
    folder: PathBuf,
    drone_id: u32,
    detector: D,
    sender: ResultSender,
    annotator: Option<Annotator>,
    settings: WatchSettings,
    processed: HashSet<String>,
}

impl<D: Detector> FolderWatcher<D> {
    pub fn new(
        folder: impl Into<PathBuf>,
        drone_id: u32,
        detector: D,
        sender: ResultSender,
        settings: WatchSettings,
    ) -> WatchResult<Self> {
        let folder = folder.into();
        if !folder.is_dir() {
            return Err(WatchError::NotFound(format!(
                "folder for drone {}: {}",
                drone_id,
                folder.display()
            )));
        }

        Ok(Self {
            folder,
            drone_id,
            detector,
            sender,
            annotator: None,
            settings,
            processed: HashSet::new(),
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.processed.contains(name)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Unseen files with the watched extension, sorted by name
    pub fn pending_files(&self) -> WatchResult<Vec<String>> {
        let suffix = format!(".{}", self.settings.extension);
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(&suffix) && !self.processed.contains(&name) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Run one file through wait, decode, detect, threshold, annotate, send
    pub fn process_file(&mut self, name: &str) -> FrameOutcome {
        let path = self.folder.join(name);

        match wait_for_release(&path, self.settings.release_timeout, self.settings.release_retry) {
            ReleaseState::Ready => {}
            ReleaseState::TimedOut => {
                warn!("Timeout waiting for file: {}", path.display());
                return FrameOutcome::TimedOut;
            }
            ReleaseState::Missing => {
                debug!("File disappeared: {}", path.display());
                return FrameOutcome::Missing;
            }
        }

        let image = match image::open(&path) {
            Ok(image) => image,
            Err(e) => {
                debug!("Cannot decode {} yet: {}", path.display(), e);
                return FrameOutcome::Unreadable;
            }
        };

        let outcome = self.handle_frame(&Frame::new(path, image));
        self.processed.insert(name.to_string());
        outcome
    }

    fn handle_frame(&self, frame: &Frame) -> FrameOutcome {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                error!("{} failed on {}: {}", self.detector.name(), frame.path.display(), e);
                return FrameOutcome::Failed;
            }
        };

        let confident = select_confident(&detections, self.drone_id, self.settings.confidence_threshold);
        debug!(
            "{}: {} detections, {} above {}",
            frame.path.display(),
            detections.len(),
            confident.len(),
            self.settings.confidence_threshold
        );

        if confident.is_empty() {
            return FrameOutcome::NothingConfident {
                detections: detections.len(),
            };
        }

        if let Some(annotator) = &self.annotator {
            let annotated = annotator.draw(&frame.image, &detections, self.drone_id);
            if let Err(e) = annotator.save(&annotated, &frame.path) {
                warn!("Failed to save annotated image for {}: {}", frame.path.display(), e);
            }
        }

        let payload = match ResultSender::encode(&confident) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode result for {}: {}", frame.path.display(), e);
                return FrameOutcome::Failed;
            }
        };
        info!("{}", payload);
        match self.sender.send_payload(&payload) {
            Ok(_) => {
                info!(
                    "Sent result for {} ({} detections) to {}",
                    frame.path.display(),
                    confident.len(),
                    self.sender.target()
                );
                FrameOutcome::Sent {
                    detections: detections.len(),
                    sent: confident.len(),
                }
            }
            Err(e) => {
                error!("Failed to send result for {}: {}", frame.path.display(), e);
                FrameOutcome::Failed
            }
        }
    }

    /// One pass over the folder
    pub fn poll_once(&mut self) -> WatchResult<PollReport> {
        let pending = self.pending_files()?;
        let mut report = PollReport {
            pending: pending.len(),
            ..Default::default()
        };

        for name in &pending {
            let outcome = self.process_file(name);
            if outcome.is_final() {
                report.processed += 1;
            } else {
                report.deferred += 1;
            }
            if matches!(outcome, FrameOutcome::Sent { .. }) {
                report.sent += 1;
            }
        }

        Ok(report)
    }

    /// Poll forever, sleeping between passes
    pub fn run(&mut self) -> WatchResult<()> {
        info!(
            "Watching folder: {} (drone_id={}, detector={})",
            self.folder.display(),
            self.drone_id,
            self.detector.name()
        );

        loop {
            let report = self.poll_once()?;
            if report.pending > 0 {
                debug!("Poll: {:?}", report);
            }
            thread::sleep(self.settings.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_for_release_ready_and_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"data").unwrap();

        let timeout = Duration::from_millis(200);
        let retry = Duration::from_millis(10);
        assert_eq!(wait_for_release(&path, timeout, retry), ReleaseState::Ready);
        assert_eq!(
            wait_for_release(&dir.path().join("gone.png"), timeout, retry),
            ReleaseState::Missing
        );
    }

    #[test]
    fn test_outcome_finality() {
        assert!(FrameOutcome::Sent { detections: 1, sent: 1 }.is_final());
        assert!(FrameOutcome::NothingConfident { detections: 0 }.is_final());
        assert!(FrameOutcome::Failed.is_final());
        assert!(!FrameOutcome::TimedOut.is_final());
        assert!(!FrameOutcome::Unreadable.is_final());
        assert!(!FrameOutcome::Missing.is_final());
    }

    #[test]
    fn test_settings_from_config() {
        let config = WatcherConfig {
            extension: "jpg".into(),
            confidence_threshold: 0.6,
            ..Default::default()
        };
        let settings = WatchSettings::from_config(&config);
        assert_eq!(settings.extension, "jpg");
        assert_eq!(settings.confidence_threshold, 0.6);
        assert_eq!(settings.release_retry, Duration::from_millis(100));
    }
}
