use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::batch::SourceImage;

/// Red ramps left to right, green top to bottom.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.saturating_sub(1).max(1)) as u8;
        let g = (y * 255 / height.saturating_sub(1).max(1)) as u8;
        image::Rgb([r, g, 96])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png_source(identifier: &str, width: u32, height: u32) -> SourceImage {
    let bytes = encode(&gradient(width, height), ImageFormat::Png);
    SourceImage::new(identifier, bytes, width, height)
}

pub fn corrupt_source(identifier: &str) -> SourceImage {
    SourceImage::new(identifier, b"\x89PNG\r\n\x1a\nthis is not really a png".to_vec(), 400, 300)
}
