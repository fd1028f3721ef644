use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageFormat};

use crate::error::TranscodeError;
use crate::plan::PlannedDimensions;

/// JPEG quality used for every output image (0-100).
pub const OUTPUT_QUALITY: u8 = 85;

const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Input codecs the transcoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    WebP,
    Tiff,
}

impl SourceFormat {
    /// Sniff the codec from the leading bytes.
    pub fn detect(bytes: &[u8]) -> Result<Self, TranscodeError> {
        let format = image::guess_format(bytes)
            .map_err(|_| TranscodeError::UnsupportedFormat("unrecognized signature".to_string()))?;
        Self::from_image_format(format)
            .ok_or_else(|| TranscodeError::UnsupportedFormat(format!("{format:?}")))
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
            Self::WebP => ImageFormat::WebP,
            Self::Tiff => ImageFormat::Tiff,
        }
    }
}

/// Encoded output for one source image.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub identifier: String,
    pub bytes: Vec<u8>,
}

/// Decode `source`, scale the whole image onto `planned`, and re-encode it as JPEG.
pub fn transcode(source: &[u8], planned: PlannedDimensions) -> Result<Vec<u8>, TranscodeError> {
    let format = SourceFormat::detect(source)?;
    let decoded = image::load_from_memory_with_format(source, format.image_format())
        .map_err(TranscodeError::Decode)?;

    // resize_exact never crops; it stretches when the ratios differ
    let resized = decoded.resize_exact(planned.width, planned.height, RESAMPLE_FILTER);
    encode_jpeg(&resized)
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, TranscodeError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, OUTPUT_QUALITY);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(TranscodeError::Encode)?;
    Ok(buf)
}
