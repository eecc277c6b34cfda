//! Device enumeration and selection

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::device::CameraBackend;
use crate::types::{CameraIdentity, Facing};
use crate::CameraError;

/// Read-only view over the cameras a backend exposes
#[derive(Clone)]
pub struct DeviceEnumerator {
    backend: Arc<dyn CameraBackend>,
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    /// Query every camera and its capabilities, in backend order
    pub fn list_devices(&self) -> Result<Vec<CameraIdentity>, CameraError> {
        if !self.backend.has_permission() {
            warn!("Camera permission not granted");
            return Err(CameraError::PermissionDenied);
        }

        let ids = self.backend.camera_ids()?;
        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            let capabilities = self.backend.characteristics(&id)?;
            debug!(
                "Camera {}: facing={:?} orientation={} sizes={}",
                id,
                capabilities.facing,
                capabilities.sensor_orientation,
                capabilities.video_sizes.len()
            );
            devices.push(CameraIdentity::new(id, capabilities));
        }
        Ok(devices)
    }

    /// Pick the first camera with the preferred facing, falling back to the
    /// first enumerated camera
    pub fn select(&self, preferred: Facing) -> Result<CameraIdentity, CameraError> {
        let mut devices = self.list_devices()?;
        if devices.is_empty() {
            warn!("No camera devices enumerated");
            return Err(CameraError::Unavailable);
        }

        let index = devices
            .iter()
            .position(|d| d.facing() == preferred)
            .unwrap_or(0);
        let selected = devices.swap_remove(index);

        info!(
            "Selected camera {} ({:?}, requested {:?})",
            selected.id,
            selected.facing(),
            preferred
        );
        Ok(selected)
    }
}
