//! Mock camera backend
//!
//! Simulates an asynchronous camera subsystem on plain threads so the session
//! layer can run without hardware. Callbacks arrive from background threads,
//! the way a real driver delivers them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::device::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureSession, DeviceStateCallback,
    OutputTarget, SessionStateCallback, TargetKind,
};
use crate::frame::{PixelFormat, RawFrame};
use crate::types::{Capabilities, Facing, FpsRange, Rotation, Size};
use crate::CameraError;

/// What happens when a device is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// `on_opened` after the open delay
    Succeed,
    /// `on_error` with the given code after the open delay
    Fail(i32),
    /// `on_disconnected` after the open delay
    Disconnect,
    /// `open_camera` itself returns this error
    Reject(CameraError),
    /// No callback ever arrives
    Hang,
}

/// A simulated camera
#[derive(Debug, Clone)]
pub struct MockCamera {
    pub id: String,
    pub capabilities: Capabilities,
}

impl MockCamera {
    /// Camera with a typical phone capability set
    pub fn new(id: &str, facing: Facing) -> Self {
        let sizes = vec![
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(720, 720),
            Size::new(480, 480),
            Size::new(640, 480),
        ];
        Self {
            id: id.to_string(),
            capabilities: Capabilities {
                preview_sizes: sizes.clone(),
                video_sizes: sizes,
                sensor_orientation: if facing == Facing::Front { 270 } else { 90 },
                fps_ranges: vec![
                    FpsRange::new(7, 30),
                    FpsRange::new(15, 15),
                    FpsRange::new(10, 30),
                    FpsRange::new(30, 30),
                ],
                facing,
            },
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[derive(Debug)]
struct MockConfig {
    cameras: Vec<MockCamera>,
    permission: bool,
    open_delay: Duration,
    open_outcome: OpenOutcome,
    configure_fails: bool,
    frame_interval: Duration,
    frame_size: Size,
    rotation: Rotation,
}

/// Counters shared by a mock backend and everything it hands out
#[derive(Debug, Default)]
pub struct MockStats {
    opens: AtomicUsize,
    open_devices: AtomicUsize,
    live_sessions: AtomicUsize,
    max_live_sessions: AtomicUsize,
    repeating_requests: AtomicUsize,
    frames: AtomicUsize,
    last_targets: Mutex<Vec<TargetKind>>,
    opened_at: Mutex<Vec<Instant>>,
}

impl MockStats {
    /// `open_camera` calls
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Devices opened and not yet closed
    pub fn open_devices(&self) -> usize {
        self.open_devices.load(Ordering::SeqCst)
    }

    /// Sessions configured and not yet closed
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live sessions seen
    pub fn max_live_sessions(&self) -> usize {
        self.max_live_sessions.load(Ordering::SeqCst)
    }

    pub fn repeating_requests(&self) -> usize {
        self.repeating_requests.load(Ordering::SeqCst)
    }

    /// Frames produced across all sessions
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    /// Target kinds of the most recent repeating request
    pub fn last_targets(&self) -> Vec<TargetKind> {
        self.last_targets.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// When each `on_opened` callback fired
    pub fn opened_at(&self) -> Vec<Instant> {
        self.opened_at.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

/// Builder for [`MockBackend`]
pub struct MockBackendBuilder {
    config: MockConfig,
}

impl MockBackendBuilder {
    pub fn camera(mut self, camera: MockCamera) -> Self {
        self.config.cameras.push(camera);
        self
    }

    pub fn permission(mut self, granted: bool) -> Self {
        self.config.permission = granted;
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.config.open_delay = delay;
        self
    }

    pub fn open_outcome(mut self, outcome: OpenOutcome) -> Self {
        self.config.open_outcome = outcome;
        self
    }

    pub fn configure_fails(mut self, fails: bool) -> Self {
        self.config.configure_fails = fails;
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.config.frame_interval = interval;
        self
    }

    pub fn frame_size(mut self, size: Size) -> Self {
        self.config.frame_size = size;
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn build(self) -> MockBackend {
        MockBackend {
            config: Arc::new(self.config),
            stats: Arc::new(MockStats::default()),
        }
    }
}

/// Simulated camera subsystem
#[derive(Clone)]
pub struct MockBackend {
    config: Arc<MockConfig>,
    stats: Arc<MockStats>,
}

impl MockBackend {
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder {
            config: MockConfig {
                cameras: Vec::new(),
                permission: true,
                open_delay: Duration::from_millis(20),
                open_outcome: OpenOutcome::Succeed,
                configure_fails: false,
                frame_interval: Duration::from_millis(33),
                frame_size: Size::new(64, 48),
                rotation: Rotation::Deg0,
            },
        }
    }

    /// One front and one back camera with default behaviour
    pub fn with_default_cameras() -> Self {
        Self::builder()
            .camera(MockCamera::new("0", Facing::Back))
            .camera(MockCamera::new("1", Facing::Front))
            .build()
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

impl CameraBackend for MockBackend {
    fn has_permission(&self) -> bool {
        self.config.permission
    }

    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        Ok(self.config.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn characteristics(&self, id: &str) -> Result<Capabilities, CameraError> {
        self.config
            .cameras
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.capabilities.clone())
            .ok_or_else(|| CameraError::Access(format!("unknown camera {}", id)))
    }

    fn open_camera(
        &self,
        id: &str,
        callback: Arc<dyn DeviceStateCallback>,
    ) -> Result<(), CameraError> {
        self.characteristics(id)?;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);

        if let OpenOutcome::Reject(err) = &self.config.open_outcome {
            return Err(err.clone());
        }

        let config = Arc::clone(&self.config);
        let stats = Arc::clone(&self.stats);
        let id = id.to_string();
        std::thread::spawn(move || {
            std::thread::sleep(config.open_delay);
            if config.open_outcome == OpenOutcome::Hang {
                return;
            }

            stats.open_devices.fetch_add(1, Ordering::SeqCst);
            let device = Box::new(MockDevice {
                id,
                config: Arc::clone(&config),
                stats: Arc::clone(&stats),
            });
            match config.open_outcome {
                OpenOutcome::Fail(code) => callback.on_error(device, code),
                OpenOutcome::Disconnect => callback.on_disconnected(device),
                _ => {
                    if let Ok(mut opened) = stats.opened_at.lock() {
                        opened.push(Instant::now());
                    }
                    callback.on_opened(device)
                }
            }
        });
        Ok(())
    }

    fn display_rotation(&self) -> Rotation {
        self.config.rotation
    }
}

struct MockDevice {
    id: String,
    config: Arc<MockConfig>,
    stats: Arc<MockStats>,
}

impl CameraDevice for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        targets: Vec<OutputTarget>,
        callback: Arc<dyn SessionStateCallback>,
    ) -> Result<(), CameraError> {
        let config = Arc::clone(&self.config);
        let stats = Arc::clone(&self.stats);
        debug!("Mock device {} configuring {} targets", self.id, targets.len());
        std::thread::spawn(move || {
            if config.configure_fails {
                callback.on_configure_failed();
                return;
            }
            let live = stats.live_sessions.fetch_add(1, Ordering::SeqCst) + 1;
            stats.max_live_sessions.fetch_max(live, Ordering::SeqCst);
            callback.on_configured(Box::new(MockSession {
                config,
                stats,
                stop: Arc::new(AtomicBool::new(false)),
                producer: None,
            }));
        });
        Ok(())
    }

    fn close(self: Box<Self>) {
        debug!("Mock device {} closed", self.id);
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.stats.open_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockSession {
    config: Arc<MockConfig>,
    stats: Arc<MockStats>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl MockSession {
    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

impl CaptureSession for MockSession {
    fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), CameraError> {
        self.halt();
        self.stop = Arc::new(AtomicBool::new(false));
        self.stats.repeating_requests.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.stats.last_targets.lock() {
            *last = request.targets().iter().map(|t| t.kind()).collect();
        }

        let stop = Arc::clone(&self.stop);
        let stats = Arc::clone(&self.stats);
        let interval = self.config.frame_interval;
        let size = self.config.frame_size;
        self.producer = Some(std::thread::spawn(move || {
            let mut sequence = 0u32;
            let started = Instant::now();
            while !stop.load(Ordering::SeqCst) {
                let frame = synthetic_frame(size, sequence, started.elapsed());
                for target in request.targets() {
                    target.deliver(&frame);
                }
                stats.frames.fetch_add(1, Ordering::SeqCst);
                sequence = sequence.wrapping_add(1);
                std::thread::sleep(interval);
            }
        }));
        Ok(())
    }

    fn close(self: Box<Self>) {
        info!("Mock capture session closed");
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.halt();
        self.stats.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

fn synthetic_frame(size: Size, sequence: u32, elapsed: Duration) -> RawFrame {
    let format = PixelFormat::Nv21;
    let mut data = Vec::with_capacity(format.frame_len(size.width, size.height));
    for y in 0..size.height {
        for x in 0..size.width {
            data.push((x + y + sequence) as u8);
        }
    }
    data.resize(format.frame_len(size.width, size.height), 128);
    RawFrame::new(
        data,
        size.width,
        size.height,
        format,
        elapsed.as_nanos() as u64,
        sequence,
    )
}
