//! Camera capability types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Same size with width and height exchanged
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Target frame-rate range for auto exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpsRange {
    pub lower: u32,
    pub upper: u32,
}

impl FpsRange {
    pub const fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    /// Distance between the bounds
    pub fn span(&self) -> u32 {
        self.upper.saturating_sub(self.lower)
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Lens facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    Front,
    Back,
    External,
}

/// Current display rotation relative to the device's natural orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Display rotation from a degree value; anything off the quarter turns is rejected
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// True when the display is turned sideways
    pub fn is_sideways(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// What a physical camera can do, as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Sizes accepted by a screen surface target
    pub preview_sizes: Vec<Size>,
    /// Sizes accepted by an encoder target
    pub video_sizes: Vec<Size>,
    /// Sensor mounting angle (0, 90, 180 or 270)
    pub sensor_orientation: u32,
    /// Auto-exposure target fps ranges
    pub fps_ranges: Vec<FpsRange>,
    pub facing: Facing,
}

/// A queried camera: backend id plus its capabilities.
///
/// Immutable once queried. The session manager keeps a copy for the
/// lifetime of one device-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraIdentity {
    pub id: String,
    pub capabilities: Capabilities,
}

impl CameraIdentity {
    pub fn new(id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            id: id.into(),
            capabilities,
        }
    }

    pub fn facing(&self) -> Facing {
        self.capabilities.facing
    }

    pub fn sensor_orientation(&self) -> u32 {
        self.capabilities.sensor_orientation
    }
}
