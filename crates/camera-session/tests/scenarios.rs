//! End-to-end preview and recording scenarios against the mock hardware

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camera_capture::mock::{MockBackend, MockCamera, OpenOutcome};
use camera_capture::{Facing, Rotation, Size, TargetKind, VideoFrame};
use camera_session::{
    CaptureSessionManager, HeadlessScreen, LifecycleAdapter, LifecycleEvent, MockEncoderFactory,
    PreviewObserver, RecorderController, RecorderSettings, RecordingError, RecordingListener,
    SessionError, SessionSettings, SessionState,
};
use tempfile::TempDir;

#[derive(Default)]
struct Collect {
    saved: Mutex<Vec<PathBuf>>,
    errors: Mutex<Vec<RecordingError>>,
}

impl RecordingListener for Collect {
    fn on_saved(&self, path: &Path) {
        self.saved.lock().unwrap().push(path.to_path_buf());
    }

    fn on_error(&self, error: RecordingError) {
        self.errors.lock().unwrap().push(error);
    }
}

#[derive(Default)]
struct Watch {
    frames: Mutex<Vec<(u32, u32)>>,
    errors: Mutex<Vec<SessionError>>,
}

impl PreviewObserver for Watch {
    fn on_preview_frame(&self, frame: VideoFrame) {
        self.frames.lock().unwrap().push((frame.width, frame.height));
    }

    fn on_session_error(&self, error: &SessionError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

struct Rig {
    _dir: TempDir,
    temp_file: PathBuf,
    dest: PathBuf,
    backend: MockBackend,
    screen: Arc<HeadlessScreen>,
    encoder: MockEncoderFactory,
    manager: CaptureSessionManager,
    recorder: RecorderController,
    watch: Arc<Watch>,
}

fn rig_with(
    backend: MockBackend,
    screen: HeadlessScreen,
    encoder: MockEncoderFactory,
    session: SessionSettings,
) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let recorder_settings = RecorderSettings {
        temp_file: dir.path().join("camera_video_temp.mp4"),
        ..RecorderSettings::default()
    };
    let screen = Arc::new(screen);
    let manager = CaptureSessionManager::builder(Arc::new(backend.clone()), screen.clone())
        .settings(session)
        .encoder(Arc::new(encoder.clone()), recorder_settings.clone())
        .build();
    let watch = Arc::new(Watch::default());
    manager.set_preview_observer(watch.clone());

    Rig {
        temp_file: recorder_settings.temp_file,
        dest: dir.path().join("clip.mp4"),
        _dir: dir,
        backend,
        screen,
        encoder,
        recorder: RecorderController::new(manager.clone()),
        manager,
        watch,
    }
}

fn rig(backend: MockBackend) -> Rig {
    rig_with(
        backend,
        HeadlessScreen::new(),
        MockEncoderFactory::new(),
        SessionSettings::default(),
    )
}

async fn wait_for(what: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_previewing(manager: &CaptureSessionManager) {
    wait_for("preview", Duration::from_secs(3), || manager.is_previewing()).await;
}

#[tokio::test]
async fn double_start_opens_one_session() {
    let rig = rig(MockBackend::with_default_cameras());

    rig.manager.start_preview().await.unwrap();
    rig.manager.start_preview().await.unwrap();
    wait_previewing(&rig.manager).await;
    rig.manager.start_preview().await.unwrap();

    let stats = rig.backend.stats();
    assert_eq!(stats.opens(), 1);
    assert_eq!(stats.max_live_sessions(), 1);
    assert_eq!(
        stats.last_targets(),
        vec![TargetKind::Screen, TargetKind::Encoder, TargetKind::Reader]
    );

    rig.manager.stop_preview().await.unwrap();
    assert_eq!(rig.manager.state(), SessionState::Idle);
    assert_eq!(stats.live_sessions(), 0);
    assert_eq!(stats.open_devices(), 0);
}

#[tokio::test]
async fn preview_frames_reach_observer_rotated() {
    let rig = rig(MockBackend::with_default_cameras());

    rig.manager.start_preview().await.unwrap();
    wait_for("preview frames", Duration::from_secs(3), || {
        !rig.watch.frames.lock().unwrap().is_empty()
    })
    .await;

    // 64x48 sensor frames, rotated a quarter turn for a natural display rotation
    assert_eq!(rig.watch.frames.lock().unwrap()[0], (48, 64));
    assert!(rig.screen.frames() > 0);
    assert_eq!(rig.screen.buffer_size(), Some(Size::new(480, 480)));

    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn encoder_start_waits_for_preview() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("1", Facing::Front))
        .open_delay(Duration::from_millis(300))
        .build();
    let rig = rig(backend);
    let listener = Arc::new(Collect::default());

    let begun = Instant::now();
    rig.manager.start_preview().await.unwrap();
    rig.recorder.start_record(listener.clone());
    assert!(rig.recorder.is_recording());

    let stats = rig.encoder.stats();
    wait_for("encoder start", Duration::from_secs(3), || stats.starts() == 1).await;

    let started = stats.started_at()[0];
    assert!(started.duration_since(begun) >= Duration::from_millis(500));
    assert!(started >= rig.backend.stats().opened_at()[0]);
    assert!(listener.errors.lock().unwrap().is_empty());

    rig.recorder.interrupt();
    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn stop_record_saves_after_minimum_duration() {
    let rig = rig(MockBackend::with_default_cameras());
    let listener = Arc::new(Collect::default());

    rig.manager.start_preview().await.unwrap();
    wait_previewing(&rig.manager).await;
    rig.recorder.start_record(listener.clone());
    let stats = rig.encoder.stats();
    wait_for("encoder start", Duration::from_secs(3), || stats.starts() == 1).await;

    assert!(rig.recorder.stop_record(&rig.dest).await);

    let elapsed = stats.stopped_at()[0].duration_since(stats.started_at()[0]);
    assert!(elapsed >= Duration::from_millis(1000));
    assert!(std::fs::metadata(&rig.dest).unwrap().len() > 0);
    assert!(!rig.temp_file.exists());
    assert_eq!(*listener.saved.lock().unwrap(), vec![rig.dest.clone()]);
    assert!(listener.errors.lock().unwrap().is_empty());
    assert!(!rig.recorder.is_recording());

    // Preview comes back on its own
    wait_previewing(&rig.manager).await;
    assert_eq!(rig.backend.stats().opens(), 2);
    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn empty_recording_reports_once_and_restarts_preview() {
    let rig = rig_with(
        MockBackend::with_default_cameras(),
        HeadlessScreen::new(),
        MockEncoderFactory::new().with_empty_output(),
        SessionSettings::default(),
    );
    let listener = Arc::new(Collect::default());
    std::fs::write(&rig.dest, b"previous clip").unwrap();

    rig.manager.start_preview().await.unwrap();
    rig.recorder.start_record(listener.clone());
    let stats = rig.encoder.stats();
    wait_for("encoder start", Duration::from_secs(3), || stats.starts() == 1).await;

    assert!(!rig.recorder.stop_record(&rig.dest).await);

    let errors = listener.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RecordingError::EmptyTempFile(_)));
    assert!(listener.saved.lock().unwrap().is_empty());
    assert_eq!(std::fs::read(&rig.dest).unwrap(), b"previous clip");
    drop(errors);

    wait_previewing(&rig.manager).await;
    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn stop_without_recording_is_a_noop() {
    let rig = rig(MockBackend::with_default_cameras());
    rig.manager.start_preview().await.unwrap();
    wait_previewing(&rig.manager).await;

    assert!(!rig.recorder.stop_record(&rig.dest).await);
    assert!(rig.manager.is_previewing());
    assert_eq!(rig.backend.stats().opens(), 1);
    assert!(!rig.dest.exists());

    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn hiding_cancels_pending_recording() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("1", Facing::Front))
        .open_delay(Duration::from_millis(300))
        .build();
    let rig = rig(backend);
    let lifecycle = LifecycleAdapter::new(rig.manager.clone(), rig.recorder.clone());
    let listener = Arc::new(Collect::default());

    lifecycle.handle(LifecycleEvent::Visible).await.unwrap();
    rig.recorder.start_record(listener.clone());
    lifecycle.handle(LifecycleEvent::Hidden).await.unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(rig.encoder.stats().starts(), 0);
    assert!(!rig.recorder.is_recording());
    assert_eq!(rig.manager.state(), SessionState::Idle);
    assert!(listener.errors.lock().unwrap().is_empty());

    // Destroyed after hidden is harmless, and a new recording is accepted
    lifecycle.handle(LifecycleEvent::Destroyed).await.unwrap();
    rig.recorder.start_record(listener);
    assert!(rig.recorder.is_recording());
    rig.recorder.interrupt();
}

#[tokio::test]
async fn open_failure_returns_to_idle() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("0", Facing::Back))
        .open_outcome(OpenOutcome::Fail(3))
        .build();
    let rig = rig(backend);

    rig.manager.start_preview().await.unwrap();
    wait_for("device error", Duration::from_secs(3), || {
        !rig.watch.errors.lock().unwrap().is_empty()
    })
    .await;

    assert_eq!(rig.manager.state(), SessionState::Idle);
    assert!(matches!(rig.watch.errors.lock().unwrap()[0], SessionError::Device(_)));
    assert_eq!(rig.backend.stats().open_devices(), 0);

    // The failed lifetime released the permit
    rig.manager.start_preview().await.unwrap();
    assert_eq!(rig.backend.stats().opens(), 2);
}

#[tokio::test]
async fn rejected_open_is_reported_to_caller() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("0", Facing::Back))
        .open_outcome(OpenOutcome::Reject(camera_capture::CameraError::Open(
            "in use".to_string(),
        )))
        .build();
    let rig = rig(backend);

    let err = rig.manager.start_preview().await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceAccess(_)));
    assert_eq!(rig.manager.state(), SessionState::Idle);
    assert!(matches!(
        rig.watch.errors.lock().unwrap()[0],
        SessionError::DeviceAccess(_)
    ));

    // Teardown of the failed lifetime released the permit and worker
    let err = rig.manager.start_preview().await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceAccess(_)));
    assert_eq!(rig.backend.stats().opens(), 2);
    assert_eq!(rig.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn permission_denied_is_surfaced() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("0", Facing::Back))
        .permission(false)
        .build();
    let rig = rig(backend);

    assert_eq!(
        rig.manager.start_preview().await,
        Err(SessionError::PermissionDenied)
    );
    assert_eq!(rig.backend.stats().opens(), 0);
}

#[tokio::test]
async fn configure_failure_stays_opening() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("0", Facing::Back))
        .configure_fails(true)
        .build();
    let rig = rig(backend);

    rig.manager.start_preview().await.unwrap();
    wait_for("configure failure", Duration::from_secs(3), || {
        !rig.watch.errors.lock().unwrap().is_empty()
    })
    .await;

    assert_eq!(
        rig.watch.errors.lock().unwrap()[0],
        SessionError::SessionConfigureFailed
    );
    assert_eq!(rig.manager.state(), SessionState::Opening);
    assert_eq!(rig.backend.stats().live_sessions(), 0);

    rig.manager.stop_preview().await.unwrap();
    assert_eq!(rig.manager.state(), SessionState::Idle);
    assert_eq!(rig.backend.stats().open_devices(), 0);
}

#[tokio::test]
async fn open_waits_for_surface() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("0", Facing::Back))
        .rotation(Rotation::Deg90)
        .build();
    let rig = rig_with(
        backend,
        HeadlessScreen::pending(),
        MockEncoderFactory::new(),
        SessionSettings::default(),
    );

    rig.manager.start_preview().await.unwrap();
    assert_eq!(rig.manager.state(), SessionState::Opening);
    assert_eq!(rig.backend.stats().opens(), 0);
    // Sideways display: aspect ratio follows the buffer
    assert_eq!(rig.screen.aspect_ratio(), Some((480, 480)));

    rig.screen.set_available(true);
    rig.manager
        .on_surface_available(Size::new(1080, 1920))
        .await
        .unwrap();
    wait_previewing(&rig.manager).await;
    assert_eq!(rig.backend.stats().opens(), 1);
    let transform = rig.screen.transform();
    assert_ne!(transform, camera_session::DisplayTransform::IDENTITY);

    // Resizing only recomputes the transform
    rig.manager.on_surface_resized(Size::new(1920, 1080));
    assert_ne!(rig.screen.transform(), transform);
    assert!(rig.manager.is_previewing());
    assert_eq!(rig.backend.stats().opens(), 1);

    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn stop_times_out_while_open_hangs() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("0", Facing::Back))
        .open_outcome(OpenOutcome::Hang)
        .build();
    let session = SessionSettings {
        lock_timeout_ms: 200,
        ..SessionSettings::default()
    };
    let rig = rig_with(
        backend,
        HeadlessScreen::new(),
        MockEncoderFactory::new(),
        session,
    );

    rig.manager.start_preview().await.unwrap();
    assert_eq!(
        rig.manager.stop_preview().await,
        Err(SessionError::LockTimeout(200))
    );
    assert_eq!(rig.manager.state(), SessionState::Opening);
}

#[tokio::test]
async fn encoder_failure_reaches_listener() {
    let rig = rig(MockBackend::with_default_cameras());
    let listener = Arc::new(Collect::default());

    rig.manager.start_preview().await.unwrap();
    rig.recorder.start_record(listener.clone());
    let stats = rig.encoder.stats();
    wait_for("encoder start", Duration::from_secs(3), || stats.starts() == 1).await;

    assert!(rig.encoder.fail_active("storage full"));
    let errors = listener.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], RecordingError::Encoder(msg) if msg.contains("storage full")));
    drop(errors);
    assert!(!rig.recorder.is_recording());
    assert_eq!(stats.stops(), 1);

    // Nothing restarts on its own, but a new request is honoured
    rig.recorder.start_record(listener.clone());
    assert!(rig.recorder.is_recording());
    wait_for("second encoder start", Duration::from_secs(3), || stats.starts() == 2).await;
    assert_eq!(listener.errors.lock().unwrap().len(), 1);

    rig.recorder.interrupt();
    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn encoder_stop_failure_is_not_saved() {
    let rig = rig_with(
        MockBackend::with_default_cameras(),
        HeadlessScreen::new(),
        MockEncoderFactory::new().with_stop_error(camera_session::EncoderError::Failed(
            "stop failed".to_string(),
        )),
        SessionSettings::default(),
    );
    let listener = Arc::new(Collect::default());

    rig.manager.start_preview().await.unwrap();
    rig.recorder.start_record(listener.clone());
    let stats = rig.encoder.stats();
    wait_for("encoder start", Duration::from_secs(3), || stats.starts() == 1).await;

    assert!(!rig.recorder.stop_record(&rig.dest).await);

    let errors = listener.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], RecordingError::Encoder(msg) if msg.contains("stop failed")));
    drop(errors);
    assert!(listener.saved.lock().unwrap().is_empty());
    assert!(!rig.dest.exists());

    wait_previewing(&rig.manager).await;
    rig.manager.stop_preview().await.unwrap();
}

#[tokio::test]
async fn stop_before_preview_never_starts_encoder() {
    let backend = MockBackend::builder()
        .camera(MockCamera::new("1", Facing::Front))
        .open_delay(Duration::from_millis(300))
        .build();
    let rig = rig(backend);
    let listener = Arc::new(Collect::default());

    rig.manager.start_preview().await.unwrap();
    rig.recorder.start_record(listener.clone());
    assert!(!rig.recorder.stop_record(&rig.dest).await);

    let errors = listener.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RecordingError::MissingTempFile(_)));
    drop(errors);
    assert!(listener.saved.lock().unwrap().is_empty());
    assert!(!rig.recorder.is_recording());

    wait_previewing(&rig.manager).await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(rig.encoder.stats().starts(), 0);
    rig.manager.stop_preview().await.unwrap();
}
