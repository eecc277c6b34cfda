//! Bounded frame reader
//!
//! The analysis sink of a capture session. At most `max_images` frames can be
//! queued or held by the consumer at once; while the pool is exhausted new
//! frames from the driver are dropped. Acquired frames go back to the pool
//! when their [`FrameLease`] is dropped.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::trace;

use crate::device::{FrameSink, OutputTarget, TargetKind};
use crate::frame::RawFrame;
use crate::types::Size;

type AvailableListener = Box<dyn Fn() + Send + Sync>;

struct Pool {
    queued: VecDeque<RawFrame>,
    /// Frames handed out and not yet released
    outstanding: usize,
}

struct ReaderInner {
    size: Size,
    max_images: usize,
    pool: Mutex<Pool>,
    listener: RwLock<Option<AvailableListener>>,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl ReaderInner {
    fn release(&self) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.outstanding = pool.outstanding.saturating_sub(1);
        }
    }
}

/// Consumer side of the analysis target
#[derive(Clone)]
pub struct FrameReader {
    inner: Arc<ReaderInner>,
}

impl FrameReader {
    /// Create a reader for frames of `size` with a pool of `max_images`
    pub fn new(size: Size, max_images: usize) -> Self {
        Self {
            inner: Arc::new(ReaderInner {
                size,
                max_images: max_images.max(1),
                pool: Mutex::new(Pool {
                    queued: VecDeque::new(),
                    outstanding: 0,
                }),
                listener: RwLock::new(None),
                dropped: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    /// Called after every accepted frame, on the producer's thread
    pub fn set_on_available<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.inner.listener.write() {
            *slot = Some(Box::new(listener));
        }
    }

    pub fn clear_on_available(&self) {
        if let Ok(mut slot) = self.inner.listener.write() {
            *slot = None;
        }
    }

    /// Take the oldest queued frame
    pub fn acquire_next(&self) -> Option<FrameLease> {
        let mut pool = self.inner.pool.lock().ok()?;
        let frame = pool.queued.pop_front()?;
        pool.outstanding += 1;
        Some(FrameLease {
            frame,
            reader: Arc::clone(&self.inner),
        })
    }

    /// Output target feeding this reader
    pub fn target(&self) -> OutputTarget {
        OutputTarget::new(TargetKind::Reader, Arc::new(ReaderSink(Arc::clone(&self.inner))))
    }

    /// Frames rejected because the pool was exhausted
    pub fn dropped_frames(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Frames accepted into the pool
    pub fn delivered_frames(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Frames queued or held
    pub fn in_use(&self) -> usize {
        self.inner
            .pool
            .lock()
            .map(|p| p.queued.len() + p.outstanding)
            .unwrap_or(0)
    }
}

struct ReaderSink(Arc<ReaderInner>);

impl FrameSink for ReaderSink {
    fn push(&self, frame: &RawFrame) -> bool {
        let inner = &self.0;
        {
            let Ok(mut pool) = inner.pool.lock() else {
                return false;
            };
            if pool.queued.len() + pool.outstanding >= inner.max_images {
                inner.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Reader pool exhausted, dropping frame {}", frame.sequence);
                return false;
            }
            pool.queued.push_back(frame.clone());
        }
        inner.delivered.fetch_add(1, Ordering::Relaxed);

        if let Ok(listener) = inner.listener.read() {
            if let Some(notify) = listener.as_ref() {
                notify();
            }
        }
        true
    }
}

/// Acquired frame with RAII release
pub struct FrameLease {
    frame: RawFrame,
    reader: Arc<ReaderInner>,
}

impl Deref for FrameLease {
    type Target = RawFrame;

    fn deref(&self) -> &RawFrame {
        &self.frame
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.reader.release();
    }
}
