//! Video frame types and processing

use image::{imageops, RgbImage};

use crate::CameraError;

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    /// Y plane followed by interleaved U/V at quarter resolution
    Nv12,
    /// Y plane followed by interleaved V/U at quarter resolution
    Nv21,
    Yuyv,
}

impl PixelFormat {
    /// Buffer length for a frame of the given dimensions
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Nv12 | PixelFormat::Nv21 => {
                pixels + 2 * (width as usize).div_ceil(2) * (height as usize).div_ceil(2)
            }
            PixelFormat::Yuyv => (width as usize).div_ceil(2) * 4 * height as usize,
        }
    }
}

/// Frame as produced by the sensor
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl RawFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_ns: u64,
        sequence: u32,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp_ns,
            sequence,
        }
    }

    /// Check the buffer holds a whole frame
    pub fn validate(&self) -> Result<(), CameraError> {
        let expected = self.format.frame_len(self.width, self.height);
        if self.width == 0 || self.height == 0 || self.data.len() < expected {
            return Err(CameraError::Format(format!(
                "{:?} {}x{} needs {} bytes, got {}",
                self.format,
                self.width,
                self.height,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    fn from_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

/// Turns a raw sensor frame into something displayable
pub trait FrameTransform: Send + Sync {
    /// Convert `frame` and rotate it clockwise by `rotation_degrees`
    fn transform(&self, frame: &RawFrame, rotation_degrees: u32) -> Result<VideoFrame, CameraError>;
}

/// Converts YUV/RGB frames to RGB and applies a quarter-turn rotation
#[derive(Debug, Clone, Copy, Default)]
pub struct RotatingTransform;

impl FrameTransform for RotatingTransform {
    fn transform(&self, frame: &RawFrame, rotation_degrees: u32) -> Result<VideoFrame, CameraError> {
        frame.validate()?;
        let rgb = to_rgb(frame);
        let image = RgbImage::from_raw(frame.width, frame.height, rgb)
            .ok_or_else(|| CameraError::Format("RGB buffer size mismatch".to_string()))?;

        let rotated = match rotation_degrees % 360 {
            0 => image,
            90 => imageops::rotate90(&image),
            180 => imageops::rotate180(&image),
            270 => imageops::rotate270(&image),
            other => {
                return Err(CameraError::Format(format!(
                    "Unsupported rotation {}",
                    other
                )))
            }
        };

        Ok(VideoFrame::from_image(rotated, frame.timestamp_ns, frame.sequence))
    }
}

fn to_rgb(frame: &RawFrame) -> Vec<u8> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let data = &frame.data;

    match frame.format {
        PixelFormat::Rgb24 => data[..width * height * 3].to_vec(),
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let chroma = &data[width * height..];
            let chroma_stride = width.div_ceil(2) * 2;
            let mut rgb = Vec::with_capacity(width * height * 3);
            for y in 0..height {
                for x in 0..width {
                    let luma = data[y * width + x];
                    let c = (y / 2) * chroma_stride + (x / 2) * 2;
                    let (u, v) = if frame.format == PixelFormat::Nv12 {
                        (chroma[c], chroma[c + 1])
                    } else {
                        (chroma[c + 1], chroma[c])
                    };
                    rgb.extend_from_slice(&yuv_to_rgb(luma, u, v));
                }
            }
            rgb
        }
        PixelFormat::Yuyv => {
            let stride = width.div_ceil(2) * 4;
            let mut rgb = Vec::with_capacity(width * height * 3);
            for y in 0..height {
                for x in 0..width {
                    let base = y * stride + (x / 2) * 4;
                    let luma = data[base + (x % 2) * 2];
                    rgb.extend_from_slice(&yuv_to_rgb(luma, data[base + 1], data[base + 3]));
                }
            }
            rgb
        }
    }
}

// BT.601 full range
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [
        r.clamp(0.0, 255.0) as u8,
        g.clamp(0.0, 255.0) as u8,
        b.clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_nv21(width: u32, height: u32, luma: u8) -> RawFrame {
        let format = PixelFormat::Nv21;
        let mut data = vec![luma; (width * height) as usize];
        data.resize(format.frame_len(width, height), 128);
        RawFrame::new(data, width, height, format, 42, 7)
    }

    #[test]
    fn test_nv21_gray_converts_to_gray() {
        let frame = gray_nv21(4, 2, 100);
        let out = RotatingTransform.transform(&frame, 0).unwrap();
        assert_eq!((out.width, out.height), (4, 2));
        assert_eq!(out.get_pixel(3, 1), Some([100, 100, 100]));
        assert_eq!(out.timestamp_ns, 42);
        assert_eq!(out.sequence, 7);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let frame = gray_nv21(6, 4, 50);
        let out = RotatingTransform.transform(&frame, 270).unwrap();
        assert_eq!((out.width, out.height), (4, 6));
    }

    #[test]
    fn test_rgb_rotation_moves_pixels() {
        // 2x1: red, blue
        let frame = RawFrame::new(vec![255, 0, 0, 0, 0, 255], 2, 1, PixelFormat::Rgb24, 0, 0);
        let out = RotatingTransform.transform(&frame, 90).unwrap();
        assert_eq!((out.width, out.height), (1, 2));
        assert_eq!(out.get_pixel(0, 0), Some([255, 0, 0]));
        assert_eq!(out.get_pixel(0, 1), Some([0, 0, 255]));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let frame = RawFrame::new(vec![0; 10], 4, 4, PixelFormat::Yuyv, 0, 0);
        assert!(matches!(
            RotatingTransform.transform(&frame, 0),
            Err(CameraError::Format(_))
        ));
    }

    #[test]
    fn test_odd_rotation_is_rejected() {
        let frame = gray_nv21(2, 2, 10);
        assert!(RotatingTransform.transform(&frame, 45).is_err());
    }
}
