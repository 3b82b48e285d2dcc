mod fixtures;
pub use fixtures::*;

pub use drone_watch::{
    BoundingBox, Detection, Detector, DroneDetection, FolderWatcher, Frame, FrameOutcome,
    PollReport, ReleaseState, ResultSender, WatchResult, WatchSettings, wait_for_release,
};
