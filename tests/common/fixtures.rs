use drone_watch::config::DRONE_FOLDER_PREFIX;
use drone_watch::{
    BoundingBox, Detection, Detector, DroneDetection, Frame, ResultSender, WatchError,
    WatchResult, WatchSettings,
};
use image::{ImageBuffer, Rgb};
use std::cell::RefCell;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Creates `<root>/BP_DroneActor_C_<id>` and returns its path.
pub fn create_drone_folder(root: &Path, drone_id: u32) -> PathBuf {
    let folder = root.join(format!("{}{}", DRONE_FOLDER_PREFIX, drone_id));
    std::fs::create_dir_all(&folder).expect("Failed to create drone folder");
    folder
}

/// Writes a 64x64 gray PNG named `name` into `dir`.
pub fn write_test_image(dir: &Path, name: &str) -> PathBuf {
    let img = ImageBuffer::from_fn(64, 64, |_, _| Rgb([90u8, 90u8, 90u8]));
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}

/// Settings with short waits so tests stay fast
pub fn fast_settings() -> WatchSettings {
    WatchSettings {
        extension: "png".to_string(),
        confidence_threshold: 0.4,
        poll_interval: Duration::from_millis(5),
        release_timeout: Duration::from_millis(100),
        release_retry: Duration::from_millis(10),
    }
}

pub fn detection(label: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
    Detection {
        class_id: 0,
        label: label.to_string(),
        confidence,
        bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
    }
}

/// Returns canned detections and records every frame path it sees
pub struct FakeDetector {
    detections: Vec<Detection>,
    seen: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeDetector {
    pub fn new(detections: Vec<Detection>) -> (Self, Rc<RefCell<Vec<PathBuf>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                detections,
                seen: seen.clone(),
            },
            seen,
        )
    }
}

impl Detector for FakeDetector {
    fn detect(&self, frame: &Frame) -> WatchResult<Vec<Detection>> {
        self.seen.borrow_mut().push(frame.path.clone());
        Ok(self.detections.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> WatchResult<Vec<Detection>> {
        Err(WatchError::Detection("model crashed".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Local UDP socket standing in for the simulation, plus a sender aimed at it
pub fn udp_receiver(timeout: Duration) -> (UdpSocket, ResultSender) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind receiver");
    socket
        .set_read_timeout(Some(timeout))
        .expect("Failed to set read timeout");
    let sender = ResultSender::from_addr(socket.local_addr().expect("No local addr"));
    (socket, sender)
}

/// Next datagram decoded as a result array, or None on timeout
pub fn recv_results(socket: &UdpSocket) -> Option<Vec<DroneDetection>> {
    let mut buf = [0u8; 65536];
    let (len, _) = socket.recv_from(&mut buf).ok()?;
    Some(serde_json::from_slice(&buf[..len]).expect("Datagram is not a result array"))
}
