//! Error types for the resize pipeline.
//!
//! Validation and archive errors end a run; transcode errors are scoped to a
//! single image and only ever show up in the batch's failure list.

use thiserror::Error;

pub use crate::cancel::CancelledError;

/// Rejected input. Raised before any image is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// More images than a single batch may hold
    #[error("batch of {count} images exceeds the limit of {max}")]
    BatchTooLarge { count: usize, max: usize },

    /// Requested target size outside the allowed range
    #[error("{axis} {value} is outside the allowed range {min}..={max}")]
    DimensionOutOfRange {
        axis: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Original image reported with a zero width or height
    #[error("original dimensions {width}x{height} must both be positive")]
    ZeroDimension { width: u32, height: u32 },

    /// Two images in the batch share an identifier
    #[error("image identifier {0:?} appears more than once")]
    DuplicateIdentifier(String),

    /// A specific image in the batch failed validation
    #[error("image {identifier:?}: {source}")]
    Item {
        identifier: String,
        source: Box<ValidationError>,
    },
}

/// Failure while transcoding one image.
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// Bytes are not one of the accepted input codecs
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Bytes look like a supported codec but could not be decoded
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// The resized image could not be serialized
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Failure while building the output archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive entry {0:?} already exists")]
    DuplicateEntry(String),

    #[error("archive is already finalized")]
    Sealed,

    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to write archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal error for a whole batch run.
#[derive(Error, Debug)]
pub enum PackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Cancelled(#[from] CancelledError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, PackError>;

impl ValidationError {
    pub fn for_item(identifier: impl Into<String>, err: ValidationError) -> Self {
        Self::Item {
            identifier: identifier.into(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_names_the_image() {
        let err = ValidationError::for_item(
            "broken.png",
            ValidationError::ZeroDimension { width: 0, height: 10 },
        );
        let msg = err.to_string();
        assert!(msg.contains("broken.png"));
        assert!(msg.contains("0x10"));
    }

    #[test]
    fn test_pack_error_is_transparent() {
        let err: PackError = ValidationError::BatchTooLarge { count: 31, max: 30 }.into();
        assert_eq!(err.to_string(), "batch of 31 images exceeds the limit of 30");
    }
}
