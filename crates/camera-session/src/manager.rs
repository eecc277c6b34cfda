//! Capture session manager
//!
//! Owns the camera pipeline for one preview lifetime: device selection, the
//! exclusive device permit, the worker thread, the capture session and its
//! three targets (screen, encoder, analysis reader).
//!
//! Public operations run on the caller's async context. Hardware callbacks
//! only post events to the worker, which applies them through the
//! [`SessionState`] transition table. Every lifetime gets a generation number
//! so that callbacks arriving after a teardown are recognised and their
//! device or session closed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use camera_capture::{
    CameraBackend, CameraDevice, CameraIdentity, CaptureRequest, CaptureSession,
    DeviceEnumerator, DeviceStateCallback, FpsRange, FrameReader, FrameSink, FrameTransform,
    OutputTarget, RawFrame, RotatingTransform, Rotation, SelectionPolicy, SessionStateCallback,
    Size, TargetKind,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::{RecorderSettings, SessionSettings};
use crate::error::SessionError;
use crate::recorder::encoder::{inverse_orientation, orientation_hint, EncoderFactory, EncoderSlot};
use crate::state::{Input, SessionState};
use crate::surface::{PreviewObserver, ScreenSurface};
use crate::transform::DisplayTransform;
use crate::worker::{Worker, WorkerSender};

const WORKER_NAME: &str = "camera-worker";

/// Output configuration derived once per device open
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub preview_size: Size,
    pub video_size: Size,
    pub fps_range: Option<FpsRange>,
    pub orientation_hint: Option<u32>,
}

impl SessionConfig {
    pub fn derive(identity: &CameraIdentity, policy: &SelectionPolicy, rotation: Rotation) -> Self {
        let caps = &identity.capabilities;
        Self {
            preview_size: policy.video_size(&caps.preview_sizes),
            video_size: policy.video_size(&caps.video_sizes),
            fps_range: policy.fps_range(&caps.fps_ranges),
            orientation_hint: orientation_hint(caps.sensor_orientation, rotation),
        }
    }
}

enum Event {
    DeviceOpened(u64, Box<dyn CameraDevice>),
    DeviceDisconnected(u64, Box<dyn CameraDevice>),
    DeviceError(u64, Box<dyn CameraDevice>, i32),
    Configured(u64, Box<dyn CaptureSession>),
    ConfigureFailed(u64),
    FrameAvailable(u64),
}

struct DeviceEvents {
    generation: u64,
    sender: WorkerSender<Event>,
}

impl DeviceEvents {
    fn forward(&self, event: Event) {
        // Worker already gone: close whatever the driver handed over
        match self.sender.try_post(event) {
            Ok(()) => {}
            Err(Event::DeviceOpened(_, device))
            | Err(Event::DeviceDisconnected(_, device))
            | Err(Event::DeviceError(_, device, _)) => device.close(),
            Err(Event::Configured(_, session)) => session.close(),
            Err(_) => {}
        }
    }
}

impl DeviceStateCallback for DeviceEvents {
    fn on_opened(&self, device: Box<dyn CameraDevice>) {
        self.forward(Event::DeviceOpened(self.generation, device));
    }

    fn on_disconnected(&self, device: Box<dyn CameraDevice>) {
        self.forward(Event::DeviceDisconnected(self.generation, device));
    }

    fn on_error(&self, device: Box<dyn CameraDevice>, code: i32) {
        self.forward(Event::DeviceError(self.generation, device, code));
    }
}

impl SessionStateCallback for DeviceEvents {
    fn on_configured(&self, session: Box<dyn CaptureSession>) {
        self.forward(Event::Configured(self.generation, session));
    }

    fn on_configure_failed(&self) {
        self.forward(Event::ConfigureFailed(self.generation));
    }
}

/// Screen surface seen as a plain frame sink
struct ScreenSink(Arc<dyn ScreenSurface>);

impl FrameSink for ScreenSink {
    fn push(&self, frame: &RawFrame) -> bool {
        self.0.push(frame)
    }
}

#[derive(Default)]
struct Machine {
    state: SessionState,
    generation: u64,
    worker: Option<Worker<Event>>,
    identity: Option<CameraIdentity>,
    config: Option<SessionConfig>,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    request: Option<CaptureRequest>,
    reader: Option<FrameReader>,
    /// Held from open request until the device callback arrives
    open_permit: Option<OwnedSemaphorePermit>,
    surface_size: Option<Size>,
    open_deferred: bool,
}

impl Machine {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Move everything owned by the current lifetime out of the machine
    fn take_resources(&mut self) -> Resources {
        self.generation += 1;
        self.open_deferred = false;
        self.request = None;
        Resources {
            session: self.session.take(),
            device: self.device.take(),
            reader: self.reader.take(),
            worker: self.worker.take(),
            permit: self.open_permit.take(),
        }
    }
}

/// Resources of a torn-down lifetime, released in order
struct Resources {
    session: Option<Box<dyn CaptureSession>>,
    device: Option<Box<dyn CameraDevice>>,
    reader: Option<FrameReader>,
    worker: Option<Worker<Event>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Resources {
    fn release(self, encoder: &EncoderSlot) {
        if let Some(session) = self.session {
            session.close();
        }
        if let Some(device) = self.device {
            device.close();
        }
        if let Some(reader) = self.reader {
            reader.clear_on_available();
        }
        encoder.release();
        drop(self.permit);
        if let Some(worker) = self.worker {
            worker.quit();
        }
    }
}

struct Shared {
    backend: Arc<dyn CameraBackend>,
    enumerator: DeviceEnumerator,
    settings: SessionSettings,
    screen: Arc<dyn ScreenSurface>,
    transform: Arc<dyn FrameTransform>,
    encoder: Arc<EncoderSlot>,
    permit: Arc<Semaphore>,
    machine: Mutex<Machine>,
    observer: RwLock<Option<Arc<dyn PreviewObserver>>>,
}

/// Builder for [`CaptureSessionManager`]
pub struct CaptureSessionManagerBuilder {
    backend: Arc<dyn CameraBackend>,
    screen: Arc<dyn ScreenSurface>,
    settings: SessionSettings,
    transform: Arc<dyn FrameTransform>,
    encoder: Arc<EncoderSlot>,
}

impl CaptureSessionManagerBuilder {
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transform(mut self, transform: Arc<dyn FrameTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Attach an encoder so sessions carry an encoder target
    pub fn encoder(mut self, factory: Arc<dyn EncoderFactory>, settings: RecorderSettings) -> Self {
        self.encoder = EncoderSlot::new(Some(factory), settings);
        self
    }

    pub fn build(self) -> CaptureSessionManager {
        CaptureSessionManager {
            shared: Arc::new(Shared {
                enumerator: DeviceEnumerator::new(Arc::clone(&self.backend)),
                backend: self.backend,
                settings: self.settings,
                screen: self.screen,
                transform: self.transform,
                encoder: self.encoder,
                permit: Arc::new(Semaphore::new(1)),
                machine: Mutex::new(Machine::default()),
                observer: RwLock::new(None),
            }),
        }
    }
}

/// Handle to the camera pipeline. Clones share the same pipeline.
#[derive(Clone)]
pub struct CaptureSessionManager {
    shared: Arc<Shared>,
}

impl CaptureSessionManager {
    pub fn builder(
        backend: Arc<dyn CameraBackend>,
        screen: Arc<dyn ScreenSurface>,
    ) -> CaptureSessionManagerBuilder {
        CaptureSessionManagerBuilder {
            backend,
            screen,
            settings: SessionSettings::default(),
            transform: Arc::new(RotatingTransform),
            encoder: EncoderSlot::disabled(),
        }
    }

    /// Open the preferred camera and start streaming to the screen.
    ///
    /// Does nothing unless the manager is idle. Returns once the device open
    /// has been requested; the session comes up on the worker thread.
    pub async fn start_preview(&self) -> Result<(), SessionError> {
        let shared = &self.shared;
        let generation = {
            let mut machine = shared.machine();
            let Some(next) = machine.state.next(Input::Start) else {
                debug!("start_preview ignored while {}", machine.state);
                return Ok(());
            };
            if !shared.backend.has_permission() {
                warn!("Camera permission not granted");
                return Err(SessionError::PermissionDenied);
            }

            let identity = shared.enumerator.select(shared.settings.facing)?;
            let rotation = shared.backend.display_rotation();
            let config = SessionConfig::derive(&identity, &shared.settings.selection, rotation);
            info!(
                "Selected camera {} ({:?}): preview {}, video {}, fps {:?}",
                identity.id,
                identity.facing(),
                config.preview_size,
                config.video_size,
                config.fps_range
            );

            let preview = config.preview_size;
            if rotation.is_sideways() {
                shared.screen.set_aspect_ratio(preview.width, preview.height);
            } else {
                shared.screen.set_aspect_ratio(preview.height, preview.width);
            }

            machine.generation += 1;
            let generation = machine.generation;
            let weak = Arc::downgrade(shared);
            let worker = Worker::spawn(WORKER_NAME, move |event| {
                if let Some(shared) = Weak::upgrade(&weak) {
                    shared.handle_event(event);
                }
            })
            .map_err(|e| SessionError::DeviceAccess(format!("worker: {}", e)))?;

            machine.worker = Some(worker);
            machine.identity = Some(identity);
            machine.config = Some(config);
            machine.state = next;
            shared.update_transform(&machine);

            if !shared.screen.is_available() {
                info!("Screen surface not ready, deferring camera open");
                machine.open_deferred = true;
                return Ok(());
            }
            generation
        };

        self.open_device(generation).await
    }

    /// Tear down the session, device, reader, encoder and worker.
    ///
    /// Does nothing when idle. If the device permit cannot be taken within
    /// the lock timeout nothing is released and `LockTimeout` is returned.
    pub async fn stop_preview(&self) -> Result<(), SessionError> {
        let shared = &self.shared;
        if !shared.machine().state.is_active() {
            return Ok(());
        }

        let permit = shared.acquire_permit().await.inspect_err(|e| {
            error!("Cannot stop preview: {}", e);
        })?;

        let resources = {
            let mut machine = shared.machine();
            let Some(next) = machine.state.next(Input::Stop) else {
                return Ok(());
            };
            machine.state = next;
            machine.take_resources()
        };
        info!("Stopping preview");

        let encoder = Arc::clone(&shared.encoder);
        let teardown = tokio::task::spawn_blocking(move || resources.release(&encoder));
        if let Err(e) = teardown.await {
            error!("Preview teardown failed: {}", e);
        }

        let mut machine = shared.machine();
        machine.state = machine.state.next(Input::Closed).unwrap_or_default();
        drop(machine);
        drop(permit);
        info!("Preview stopped");
        Ok(())
    }

    /// The screen surface became available at `size`. Performs a deferred
    /// device open, if any.
    pub async fn on_surface_available(&self, size: Size) -> Result<(), SessionError> {
        let generation = {
            let mut machine = self.shared.machine();
            machine.surface_size = Some(size);
            self.shared.update_transform(&machine);
            if !machine.open_deferred {
                return Ok(());
            }
            machine.open_deferred = false;
            machine.generation
        };
        debug!("Screen surface available at {}, opening camera", size);
        self.open_device(generation).await
    }

    /// The screen surface changed size. Only the display transform changes.
    pub fn on_surface_resized(&self, size: Size) {
        let mut machine = self.shared.machine();
        machine.surface_size = Some(size);
        self.shared.update_transform(&machine);
    }

    pub fn set_preview_observer(&self, observer: Arc<dyn PreviewObserver>) {
        if let Ok(mut slot) = self.shared.observer.write() {
            *slot = Some(observer);
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.machine().state
    }

    pub fn is_previewing(&self) -> bool {
        self.state() == SessionState::Previewing
    }

    /// Configuration of the current or most recent device
    pub fn session_config(&self) -> Option<SessionConfig> {
        self.shared.machine().config.clone()
    }

    pub fn encoder_slot(&self) -> Arc<EncoderSlot> {
        Arc::clone(&self.shared.encoder)
    }

    async fn open_device(&self, generation: u64) -> Result<(), SessionError> {
        let shared = &self.shared;
        let permit = match shared.acquire_permit().await {
            Ok(permit) => permit,
            Err(e) => return Err(shared.abort(generation, e).await),
        };

        let (id, sender) = {
            let mut machine = shared.machine();
            if !machine.is_current(generation) || machine.state != SessionState::Opening {
                debug!("Preview stopped before the camera was opened");
                return Ok(());
            }
            let (Some(identity), Some(worker)) = (&machine.identity, &machine.worker) else {
                return Ok(());
            };
            let pending = (identity.id.clone(), worker.sender());
            machine.open_permit = Some(permit);
            pending
        };

        info!("Opening camera {}", id);
        let callback = Arc::new(DeviceEvents { generation, sender });
        if let Err(e) = shared.backend.open_camera(&id, callback) {
            error!("Failed to open camera {}: {}", id, e);
            return Err(shared.abort(generation, e.into()).await);
        }
        Ok(())
    }
}

impl Shared {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, SessionError> {
        let timeout = self.settings.lock_timeout();
        match tokio::time::timeout(timeout, Arc::clone(&self.permit).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(SessionError::LockInterrupted),
            Err(_) => {
                warn!("Camera lock not acquired within {:?}", timeout);
                Err(SessionError::LockTimeout(self.settings.lock_timeout_ms))
            }
        }
    }

    fn observer(&self) -> Option<Arc<dyn PreviewObserver>> {
        self.observer.read().ok().and_then(|o| o.clone())
    }

    fn report(&self, err: &SessionError) {
        if let Some(observer) = self.observer() {
            observer.on_session_error(err);
        }
    }

    fn update_transform(&self, machine: &Machine) {
        if let (Some(view), Some(config)) = (machine.surface_size, &machine.config) {
            let rotation = self.backend.display_rotation();
            self.screen
                .set_transform(DisplayTransform::compute(view, config.preview_size, rotation));
        }
    }

    /// Give up the lifetime `generation` after a failed open and go idle
    async fn abort(&self, generation: u64, err: SessionError) -> SessionError {
        let resources = {
            let mut machine = self.machine();
            if !machine.is_current(generation) {
                return err;
            }
            let Some(next) = machine.state.next(Input::DeviceLost) else {
                return err;
            };
            machine.state = next;
            machine.take_resources()
        };
        // Quitting the worker joins its thread
        let encoder = Arc::clone(&self.encoder);
        if let Err(e) = tokio::task::spawn_blocking(move || resources.release(&encoder)).await {
            error!("Teardown after failed open panicked: {}", e);
        }
        self.report(&err);
        err
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::DeviceOpened(generation, device) => self.on_device_opened(generation, device),
            Event::DeviceDisconnected(generation, device) => {
                warn!("Camera {} disconnected", device.id());
                self.on_device_lost(generation, device, SessionError::Device("disconnected".into()));
            }
            Event::DeviceError(generation, device, code) => {
                error!("Camera {} error {}", device.id(), code);
                let err = SessionError::Device(format!("code {}", code));
                self.on_device_lost(generation, device, err);
            }
            Event::Configured(generation, session) => self.on_configured(generation, session),
            Event::ConfigureFailed(generation) => self.on_configure_failed(generation),
            Event::FrameAvailable(generation) => self.on_frame_available(generation),
        }
    }

    fn on_device_opened(&self, generation: u64, mut device: Box<dyn CameraDevice>) {
        let mut machine = self.machine();
        if !machine.is_current(generation) || machine.state.next(Input::DeviceOpened).is_none() {
            drop(machine);
            debug!("Closing camera {} opened for a stale preview", device.id());
            device.close();
            return;
        }
        machine.open_permit = None;

        let (Some(config), Some(sender)) = (
            machine.config.clone(),
            machine.worker.as_ref().map(Worker::sender),
        ) else {
            drop(machine);
            device.close();
            return;
        };
        info!("Camera {} opened", device.id());

        self.update_transform(&machine);
        self.screen.set_default_buffer_size(config.preview_size);

        let reader = FrameReader::new(config.preview_size, self.settings.reader_max_images);
        let frames = sender.clone();
        reader.set_on_available(move || {
            frames.post(Event::FrameAvailable(generation));
        });

        let mut targets = vec![OutputTarget::new(
            TargetKind::Screen,
            Arc::new(ScreenSink(Arc::clone(&self.screen))),
        )];
        if let Some(encoder) = self.encoder.prepare(&config) {
            targets.push(encoder);
        }
        targets.push(reader.target());

        let mut request = CaptureRequest::record().with_fps_range(config.fps_range);
        for target in &targets {
            request.add_target(target.clone());
        }

        let callback = Arc::new(DeviceEvents { generation, sender });
        let created = device.create_capture_session(targets, callback);
        machine.device = Some(device);
        machine.reader = Some(reader);
        machine.request = Some(request);
        drop(machine);

        if let Err(e) = created {
            error!("Failed to create capture session: {}", e);
            self.report(&SessionError::SessionConfigureFailed);
        }
    }

    fn on_configured(&self, generation: u64, mut session: Box<dyn CaptureSession>) {
        let mut machine = self.machine();
        let next = machine.state.next(Input::Configured);
        let (true, Some(next), Some(request)) =
            (machine.is_current(generation), next, machine.request.clone())
        else {
            drop(machine);
            debug!("Closing capture session configured for a stale preview");
            session.close();
            return;
        };

        let submitted = session.set_repeating_request(request);
        machine.session = Some(session);
        match submitted {
            Ok(()) => {
                machine.state = next;
                drop(machine);
                info!("Preview started");
            }
            Err(e) => {
                drop(machine);
                error!("Repeating request rejected: {}", e);
                self.report(&SessionError::from(e));
            }
        }
    }

    fn on_configure_failed(&self, generation: u64) {
        let machine = self.machine();
        if !machine.is_current(generation) {
            return;
        }
        let Some(next) = machine.state.next(Input::ConfigureFailed) else {
            return;
        };
        drop(machine);
        error!("Capture session configuration failed, staying {}", next);
        self.report(&SessionError::SessionConfigureFailed);
    }

    fn on_device_lost(&self, generation: u64, device: Box<dyn CameraDevice>, err: SessionError) {
        let resources = {
            let mut machine = self.machine();
            let next = machine.state.next(Input::DeviceLost);
            match next {
                Some(next) if machine.is_current(generation) => {
                    machine.state = next;
                    Some(machine.take_resources())
                }
                _ => None,
            }
        };
        device.close();

        let Some(resources) = resources else {
            debug!("Ignoring device loss from a stale preview");
            return;
        };
        resources.release(&self.encoder);
        info!("Preview lost, back to idle");
        self.report(&err);
    }

    fn on_frame_available(&self, generation: u64) {
        let reader = {
            let machine = self.machine();
            if !machine.is_current(generation) {
                return;
            }
            machine.reader.clone()
        };
        let Some(lease) = reader.as_ref().and_then(FrameReader::acquire_next) else {
            return;
        };

        let rotation = inverse_orientation(self.backend.display_rotation());
        let result = self.transform.transform(&lease, rotation);
        drop(lease);

        match result {
            Ok(frame) => {
                if let Some(observer) = self.observer() {
                    observer.on_preview_frame(frame);
                }
            }
            Err(e) => warn!("Frame transform failed: {}", e),
        }
    }
}
