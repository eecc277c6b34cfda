//! Screen surface and preview observer
//!
//! The screen is one of the three targets of a capture session. Hosts
//! implement [`ScreenSurface`] for their view; [`HeadlessScreen`] stands in
//! when there is nothing to draw on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use camera_capture::{FrameSink, RawFrame, Size, VideoFrame};

use crate::error::SessionError;
use crate::transform::DisplayTransform;

/// On-screen preview target
pub trait ScreenSurface: FrameSink {
    /// Whether the surface can receive frames yet
    fn is_available(&self) -> bool;

    /// Buffer size frames are produced at
    fn set_default_buffer_size(&self, size: Size);

    /// Matrix applied when the buffer is drawn into the view
    fn set_transform(&self, transform: DisplayTransform);

    /// Aspect ratio the view should lay itself out with
    fn set_aspect_ratio(&self, _width: u32, _height: u32) {}
}

/// Receives processed preview frames and session failures
pub trait PreviewObserver: Send + Sync {
    /// Called on the worker thread for every transformed frame
    fn on_preview_frame(&self, frame: VideoFrame);

    fn on_session_error(&self, _error: &SessionError) {}
}

/// Screen surface that only records what it was told
#[derive(Debug, Default)]
pub struct HeadlessScreen {
    available: AtomicBool,
    frames: AtomicU64,
    buffer_size: Mutex<Option<Size>>,
    aspect_ratio: Mutex<Option<(u32, u32)>>,
    transform: Mutex<DisplayTransform>,
}

impl HeadlessScreen {
    /// A surface that is already available
    pub fn new() -> Self {
        let screen = Self::default();
        screen.available.store(true, Ordering::SeqCst);
        screen
    }

    /// A surface still waiting for its view to be laid out
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> Option<Size> {
        self.buffer_size.lock().ok().and_then(|s| *s)
    }

    pub fn aspect_ratio(&self) -> Option<(u32, u32)> {
        self.aspect_ratio.lock().ok().and_then(|r| *r)
    }

    pub fn transform(&self) -> DisplayTransform {
        self.transform.lock().map(|t| *t).unwrap_or_default()
    }
}

impl FrameSink for HeadlessScreen {
    fn push(&self, _frame: &RawFrame) -> bool {
        if !self.is_available() {
            return false;
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl ScreenSurface for HeadlessScreen {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn set_default_buffer_size(&self, size: Size) {
        if let Ok(mut slot) = self.buffer_size.lock() {
            *slot = Some(size);
        }
    }

    fn set_transform(&self, transform: DisplayTransform) {
        if let Ok(mut slot) = self.transform.lock() {
            *slot = transform;
        }
    }

    fn set_aspect_ratio(&self, width: u32, height: u32) {
        if let Ok(mut slot) = self.aspect_ratio.lock() {
            *slot = Some((width, height));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::PixelFormat;

    #[test]
    fn test_pending_screen_drops_frames() {
        let screen = HeadlessScreen::pending();
        let frame = RawFrame::new(vec![0; 12], 2, 2, PixelFormat::Rgb24, 0, 0);
        assert!(!screen.push(&frame));
        screen.set_available(true);
        assert!(screen.push(&frame));
        assert_eq!(screen.frames(), 1);
    }

    #[test]
    fn test_records_layout_calls() {
        let screen = HeadlessScreen::new();
        screen.set_default_buffer_size(Size::new(640, 480));
        screen.set_aspect_ratio(480, 640);
        assert_eq!(screen.buffer_size(), Some(Size::new(640, 480)));
        assert_eq!(screen.aspect_ratio(), Some((480, 640)));
        assert_eq!(screen.transform().values(), [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
