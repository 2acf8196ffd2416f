//! Target-window lookup and background page capture.
//!
//! The platform backends only know how to find a window by title, grab its
//! client area and post a forward key to it. Cropping and error mapping are
//! shared here so they behave identically everywhere.

use image::DynamicImage;
use serde::Deserialize;
use tracing::{debug, trace};

#[cfg(windows)]
mod win32;
#[cfg(windows)]
use win32 as platform;

#[cfg(not(windows))]
mod x11;
#[cfg(not(windows))]
use x11 as platform;

/// Platform window identifier (HWND on Windows, X11 window id elsewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Pixels trimmed from each edge of the client area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CropInsets {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// One captured page: the cropped bitmap and the rectangle it came from.
#[derive(Debug, Clone)]
pub struct Page {
    pub image: DynamicImage,
    /// (x, y, width, height) in client-area pixels.
    pub rect: (u32, u32, u32, u32),
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("No window with title containing '{0}'")]
    NotFound(String),

    #[error("Window {0} is gone")]
    Gone(WindowHandle),

    #[error("Crop insets {insets:?} leave nothing of a {width}x{height} client area")]
    EmptyCrop {
        insets: CropInsets,
        width: u32,
        height: u32,
    },

    #[error("Capture failed: {0}")]
    Capture(String),
}

/// Finds the reader window and grabs its content without raising it.
pub trait WindowCapture: Send + Sync {
    fn find_target_window(&self, title: &str) -> Result<WindowHandle, WindowError>;

    fn capture_client_area(
        &self,
        handle: WindowHandle,
        insets: CropInsets,
    ) -> Result<Page, WindowError>;
}

/// Crop a client-area bitmap by the given insets.
///
/// Resulting size is (width - left - right) x (height - top - bottom).
pub fn crop_to_insets(image: &DynamicImage, insets: CropInsets) -> Result<Page, WindowError> {
    let (width, height) = (image.width(), image.height());

    let crop_w = width
        .checked_sub(insets.left)
        .and_then(|w| w.checked_sub(insets.right))
        .filter(|w| *w > 0);
    let crop_h = height
        .checked_sub(insets.top)
        .and_then(|h| h.checked_sub(insets.bottom))
        .filter(|h| *h > 0);

    let (Some(crop_w), Some(crop_h)) = (crop_w, crop_h) else {
        return Err(WindowError::EmptyCrop {
            insets,
            width,
            height,
        });
    };

    Ok(Page {
        image: image.crop_imm(insets.left, insets.top, crop_w, crop_h),
        rect: (insets.left, insets.top, crop_w, crop_h),
    })
}

/// Desktop capture through the native platform backend.
pub struct DesktopCapture;

impl DesktopCapture {
    pub fn new() -> Self {
        platform::declare_dpi_aware();
        Self
    }
}

impl Default for DesktopCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowCapture for DesktopCapture {
    fn find_target_window(&self, title: &str) -> Result<WindowHandle, WindowError> {
        let handle = platform::find_window(title)
            .ok_or_else(|| WindowError::NotFound(title.to_string()))?;
        debug!("Found window {handle} matching '{title}'");
        Ok(handle)
    }

    fn capture_client_area(
        &self,
        handle: WindowHandle,
        insets: CropInsets,
    ) -> Result<Page, WindowError> {
        let start = std::time::Instant::now();
        let full = platform::capture_client(handle)?;
        trace!(
            "Window {handle} captured {}x{} in {:?}",
            full.width(),
            full.height(),
            start.elapsed()
        );
        crop_to_insets(&full, insets)
    }
}

/// Post a "next page" key press and release to the window without focusing it.
pub fn post_forward_key(handle: WindowHandle) -> Result<(), String> {
    platform::post_forward_key(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn client_area(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, 0]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_crop_dimensions() {
        let insets = CropInsets {
            left: 75,
            top: 110,
            right: 20,
            bottom: 50,
        };
        let page = crop_to_insets(&client_area(800, 600), insets).unwrap();
        assert_eq!(page.image.width(), 800 - 75 - 20);
        assert_eq!(page.image.height(), 600 - 110 - 50);
        assert_eq!(page.rect, (75, 110, 705, 440));
    }

    #[test]
    fn test_crop_starts_at_inset_origin() {
        let insets = CropInsets {
            left: 10,
            top: 5,
            right: 0,
            bottom: 0,
        };
        let page = crop_to_insets(&client_area(50, 40), insets).unwrap();
        let rgb = page.image.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 5, 0]));
    }

    #[test]
    fn test_zero_insets_keep_everything() {
        let page = crop_to_insets(&client_area(30, 20), CropInsets::default()).unwrap();
        assert_eq!((page.image.width(), page.image.height()), (30, 20));
    }

    #[test]
    fn test_oversized_insets_rejected() {
        let insets = CropInsets {
            left: 60,
            top: 0,
            right: 40,
            bottom: 0,
        };
        let err = crop_to_insets(&client_area(100, 100), insets).unwrap_err();
        assert!(matches!(err, WindowError::EmptyCrop { width: 100, .. }));
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(WindowHandle(0x2a).to_string(), "0x2a");
    }
}
