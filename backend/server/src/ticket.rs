//! # Tickets
//!
//! A ticket is the event flyer with a QR code stamped near its bottom-left
//! corner. The code encodes `<public_url>/users/<identifier>`, so scanning a
//! ticket opens the claim page for its owner.
use std::path::Path;

use image::{
    DynamicImage, GrayImage, ImageError, Luma, RgbImage, RgbaImage,
    buffer::ConvertBuffer,
    codecs::jpeg::JpegEncoder,
    imageops::{self, FilterType},
};
use qrcode::{EcLevel, QrCode, types::QrError};
use thiserror::Error;

use crate::identity::Identifier;

pub const CODE_SIZE: u32 = 180;
/// Offset of the code on the flyer, measured from the bottom-left corner.
pub const CODE_OFFSET: (i64, i64) = (587, -103);
const JPEG_QUALITY: u8 = 100;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to encode QR code: {0}")]
    Encode(#[from] QrError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

/// Renders `payload` as a square QR code exactly `size` pixels wide.
///
/// Modules are scaled by a whole number of pixels and the code is centred on
/// a white canvas, so every module keeps the same width. Only fails when the
/// payload exceeds the capacity of the largest QR version at low error
/// correction.
pub fn render_code(payload: &str, size: u32) -> Result<GrayImage, RenderError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)?;
    let rendered = code
        .render::<Luma<u8>>()
        .max_dimensions(size, size)
        .build();

    let (width, height) = rendered.dimensions();
    if width > size || height > size {
        // even one pixel per module does not fit
        return Ok(imageops::resize(&rendered, size, size, FilterType::Nearest));
    }

    let mut canvas = GrayImage::from_pixel(size, size, Luma([255]));
    imageops::overlay(
        &mut canvas,
        &rendered,
        i64::from((size - width) / 2),
        i64::from((size - height) / 2),
    );

    Ok(canvas)
}

/// Layers `overlay` onto a copy of `background`. The offset is anchored at the
/// bottom-left corner of the background: `y = 0` puts the overlay's bottom
/// edge on the background's bottom edge, negative `y` moves it up.
pub fn composite(background: &RgbaImage, overlay: &RgbaImage, x: i64, y: i64) -> RgbaImage {
    let mut ticket = background.clone();
    let top = y + i64::from(background.height()) - i64::from(overlay.height());

    imageops::overlay(&mut ticket, overlay, x, top);

    ticket
}

pub struct TicketRenderer {
    flyer: RgbaImage,
    public_url: String,
}

impl TicketRenderer {
    pub fn new(flyer: RgbaImage, public_url: &str) -> Self {
        Self {
            flyer,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn open(flyer_path: &Path, public_url: &str) -> Result<Self, RenderError> {
        let flyer = image::open(flyer_path)?.to_rgba8();

        Ok(Self::new(flyer, public_url))
    }

    pub fn payload(&self, identifier: &Identifier) -> String {
        format!("{}/users/{identifier}", self.public_url)
    }

    /// Returns the finished ticket as JPEG bytes.
    pub fn render(&self, identifier: &Identifier) -> Result<Vec<u8>, RenderError> {
        let code = render_code(&self.payload(identifier), CODE_SIZE)?;
        let overlay = DynamicImage::ImageLuma8(code).to_rgba8();
        let ticket = composite(&self.flyer, &overlay, CODE_OFFSET.0, CODE_OFFSET.1);

        encode_jpeg(&ticket)
    }
}

fn encode_jpeg(ticket: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    // JPEG has no alpha channel
    let rgb: RgbImage = ticket.convert();
    let mut bytes = Vec::new();

    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&rgb)?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn test_code_is_deterministic() {
        let a = render_code("https://example.com/users/abc", CODE_SIZE).unwrap();
        let b = render_code("https://example.com/users/abc", CODE_SIZE).unwrap();

        assert_eq!(a.dimensions(), (CODE_SIZE, CODE_SIZE));
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_code_modules_are_even() {
        let payload = "https://cieloverde.io/users/827ccb0eea8a706c4c34a16891f84e7b";
        let code = render_code(payload, CODE_SIZE).unwrap();

        assert_eq!(code.dimensions(), (CODE_SIZE, CODE_SIZE));
        assert_eq!(code.get_pixel(0, 0).0, [255]);
        assert_eq!(code.get_pixel(CODE_SIZE - 1, CODE_SIZE - 1).0, [255]);

        let dark = |x: u32, y: u32| code.get_pixel(x, y).0[0] < 128;
        let (left, top) = (0..CODE_SIZE)
            .flat_map(|y| (0..CODE_SIZE).map(move |x| (x, y)))
            .find(|&(x, y)| dark(x, y))
            .unwrap();

        // top edge of the finder pattern is seven modules wide
        let run = (left..CODE_SIZE).take_while(|&x| dark(x, top)).count() as u32;
        assert!(run >= 7);
        assert_eq!(run % 7, 0);

        // and just as tall
        let column = (top..CODE_SIZE).take_while(|&y| dark(left, y)).count() as u32;
        assert_eq!(column, run);
    }

    #[test]
    fn test_code_capacity_overflow() {
        let payload = "x".repeat(8000);
        assert!(matches!(
            render_code(&payload, CODE_SIZE),
            Err(RenderError::Encode(_))
        ));
    }

    #[test]
    fn test_composite_anchors_bottom_left() {
        let background = RgbaImage::from_pixel(100, 100, WHITE);
        let overlay = RgbaImage::from_pixel(10, 10, BLACK);

        let out = composite(&background, &overlay, 5, -5);

        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(*out.get_pixel(5, 85), BLACK);
        assert_eq!(*out.get_pixel(14, 94), BLACK);
        assert_eq!(*out.get_pixel(5, 84), WHITE);
        assert_eq!(*out.get_pixel(5, 95), WHITE);
        assert_eq!(*out.get_pixel(4, 90), WHITE);
        // background is untouched
        assert_eq!(*background.get_pixel(5, 85), WHITE);
    }

    #[test]
    fn test_render_ticket() {
        let renderer = TicketRenderer::new(RgbaImage::from_pixel(800, 800, WHITE), "https://tickets.test/");
        let id = Identifier::from_government_id(12345);

        assert_eq!(
            renderer.payload(&id),
            "https://tickets.test/users/827ccb0eea8a706c4c34a16891f84e7b"
        );

        let jpeg = renderer.render(&id).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 800));
    }
}
