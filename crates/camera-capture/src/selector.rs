//! Output size and frame-rate selection
//!
//! Pure functions over the capability lists reported by a camera.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{FpsRange, Size};

/// Thresholds used when picking sizes and fps ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Non-square fallback: first size narrower than this wins
    pub narrow_width: u32,
    /// Returned when the camera reports no sizes at all
    pub fallback_size: Size,
    /// Ranges with a lower bound below this are too dark/noisy
    pub min_fps_lower: u32,
    /// A later range may replace the pick only with a lower bound at or below this
    pub preferred_fps_lower_max: u32,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            narrow_width: 700,
            fallback_size: Size::new(400, 400),
            min_fps_lower: 10,
            preferred_fps_lower_max: 15,
        }
    }
}

impl SelectionPolicy {
    /// Smallest square size; else the first size narrower than
    /// `narrow_width`; else the first size; else `fallback_size`.
    pub fn video_size(&self, candidates: &[Size]) -> Size {
        let square = candidates
            .iter()
            .filter(|s| s.is_square())
            .min_by_key(|s| s.area());
        if let Some(size) = square {
            return *size;
        }

        warn!("Couldn't find any square video size");
        candidates
            .iter()
            .find(|s| s.width < self.narrow_width)
            .or_else(|| candidates.first())
            .copied()
            .unwrap_or(self.fallback_size)
    }

    /// First range clearing `min_fps_lower`, replaced by any later range with a
    /// lower bound at or below `preferred_fps_lower_max` and a strictly wider span.
    pub fn fps_range(&self, candidates: &[FpsRange]) -> Option<FpsRange> {
        let mut result: Option<FpsRange> = None;
        for range in candidates.iter().filter(|r| r.lower >= self.min_fps_lower) {
            result = match result {
                None => Some(*range),
                Some(current)
                    if range.lower <= self.preferred_fps_lower_max
                        && range.span() > current.span() =>
                {
                    Some(*range)
                }
                keep => keep,
            };
        }

        match result {
            Some(range) => debug!("Selected fps range {}", range),
            None => debug!("No usable fps range among {} candidates", candidates.len()),
        }
        result
    }
}

/// [`SelectionPolicy::video_size`] with the default policy
pub fn choose_video_size(candidates: &[Size]) -> Size {
    SelectionPolicy::default().video_size(candidates)
}

/// [`SelectionPolicy::fps_range`] with the default policy
pub fn choose_fps_range(candidates: &[FpsRange]) -> Option<FpsRange> {
    SelectionPolicy::default().fps_range(candidates)
}
