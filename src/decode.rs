//! Decoding of background image bytes into RGBA pixels

use std::sync::Arc;

use crate::error::FetchError;

/// A background image ready to be drawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundImage {
    pub width: u32,
    pub height: u32,
    /// Straight (non-premultiplied) RGBA8 pixels, row-major
    pub rgba8: Arc<Vec<u8>>,
}

/// Decode encoded image bytes (PNG, JPEG, GIF, ...) into RGBA8 pixels.
pub fn decode_image(bytes: &[u8]) -> Result<BackgroundImage, FetchError> {
    let dyn_img = image::load_from_memory(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(BackgroundImage {
        width,
        height,
        rgba8: Arc::new(rgba.into_raw()),
    })
}

/// Solid-color PNG used by tests across the crate.
#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}
