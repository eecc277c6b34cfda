//! Host visibility lifecycle

use tracing::{info, warn};

use crate::error::SessionError;
use crate::manager::CaptureSessionManager;
use crate::recorder::RecorderController;

/// Visibility changes reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Visible,
    Hidden,
    Destroyed,
}

/// Maps host visibility onto preview and recording
#[derive(Clone)]
pub struct LifecycleAdapter {
    manager: CaptureSessionManager,
    recorder: RecorderController,
}

impl LifecycleAdapter {
    pub fn new(manager: CaptureSessionManager, recorder: RecorderController) -> Self {
        Self { manager, recorder }
    }

    pub async fn handle(&self, event: LifecycleEvent) -> Result<(), SessionError> {
        match event {
            LifecycleEvent::Visible => self.on_become_visible().await,
            LifecycleEvent::Hidden => self.on_become_hidden().await,
            LifecycleEvent::Destroyed => self.on_destroyed().await,
        }
    }

    pub async fn on_become_visible(&self) -> Result<(), SessionError> {
        info!("Host visible, starting preview");
        self.manager.start_preview().await
    }

    /// Abandon any recording in progress and release the camera
    pub async fn on_become_hidden(&self) -> Result<(), SessionError> {
        info!("Host hidden, releasing camera");
        self.recorder.interrupt();
        self.manager.stop_preview().await.inspect_err(|e| {
            warn!("Camera release on hide failed: {}", e);
        })
    }

    pub async fn on_destroyed(&self) -> Result<(), SessionError> {
        self.on_become_hidden().await
    }
}
