//! Display transform for the on-screen preview surface
//!
//! The sensor buffer is landscape while the view may be rotated; this matrix
//! maps buffer content onto the view so that it appears upright and fills it.

use camera_capture::{Rotation, Size};

/// Axis-aligned rectangle in view coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn offset(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

/// 3x3 affine matrix, row-major
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    m: [f32; 9],
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl DisplayTransform {
    pub const IDENTITY: DisplayTransform = DisplayTransform {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    pub fn values(&self) -> [f32; 9] {
        self.m
    }

    /// Transform for a view of `view` pixels showing a `preview` buffer
    /// under the given display rotation
    pub fn compute(view: Size, preview: Size, rotation: Rotation) -> Self {
        let (view_w, view_h) = (view.width as f32, view.height as f32);
        let view_rect = Rect::new(0.0, 0.0, view_w, view_h);
        let mut buffer_rect = Rect::new(0.0, 0.0, preview.height as f32, preview.width as f32);
        let (cx, cy) = view_rect.center();

        let mut matrix = Self::IDENTITY;
        if rotation.is_sideways() && preview.width > 0 && preview.height > 0 {
            let (bx, by) = buffer_rect.center();
            buffer_rect.offset(cx - bx, cy - by);
            matrix = Self::rect_to_rect(view_rect, buffer_rect);
            let scale = (view_h / preview.height as f32).max(view_w / preview.width as f32);
            matrix = matrix.post_scale(scale, scale, cx, cy);
        }

        let degrees = match rotation {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 270,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 90,
        };
        matrix.post_rotate(degrees, cx, cy)
    }

    /// Scale and translate `src` onto `dst`, stretching to fill
    pub fn rect_to_rect(src: Rect, dst: Rect) -> Self {
        if src.width() == 0.0 || src.height() == 0.0 {
            return Self::IDENTITY;
        }
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        Self {
            m: [
                sx,
                0.0,
                dst.left - src.left * sx,
                0.0,
                sy,
                dst.top - src.top * sy,
                0.0,
                0.0,
                1.0,
            ],
        }
    }

    /// Apply a scale about (px, py) after this transform
    pub fn post_scale(self, sx: f32, sy: f32, px: f32, py: f32) -> Self {
        let scale = Self {
            m: [sx, 0.0, px - sx * px, 0.0, sy, py - sy * py, 0.0, 0.0, 1.0],
        };
        scale.concat(&self)
    }

    /// Apply a clockwise rotation about (px, py) after this transform
    pub fn post_rotate(self, degrees: u32, px: f32, py: f32) -> Self {
        let (sin, cos) = match degrees % 360 {
            0 => return self,
            90 => (1.0, 0.0),
            180 => (0.0, -1.0),
            270 => (-1.0, 0.0),
            other => (other as f32).to_radians().sin_cos(),
        };
        let rotate = Self {
            m: [
                cos,
                -sin,
                px - cos * px + sin * py,
                sin,
                cos,
                py - sin * px - cos * py,
                0.0,
                0.0,
                1.0,
            ],
        };
        rotate.concat(&self)
    }

    /// Map a point through the matrix
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.m;
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }

    // self * other
    fn concat(&self, other: &Self) -> Self {
        let a = &self.m;
        let b = &other.m;
        let mut m = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                m[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        Self { m }
    }
}
