use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Smallest target width/height a request may ask for.
pub const MIN_DIMENSION: u32 = 100;
/// Largest target width/height a request may ask for.
pub const MAX_DIMENSION: u32 = 2000;

fn default_preserve_aspect_ratio() -> bool {
    true
}

/// Target box shared by every image in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub target_width: u32,
    pub target_height: u32,
    #[serde(default = "default_preserve_aspect_ratio")]
    pub preserve_aspect_ratio: bool,
}

impl Default for ResizeRequest {
    fn default() -> Self {
        Self {
            target_width: 800,
            target_height: 600,
            preserve_aspect_ratio: true,
        }
    }
}

impl ResizeRequest {
    pub fn new(target_width: u32, target_height: u32, preserve_aspect_ratio: bool) -> Self {
        Self {
            target_width,
            target_height,
            preserve_aspect_ratio,
        }
    }

    /// Check both target dimensions against [`MIN_DIMENSION`]..=[`MAX_DIMENSION`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("width", self.target_width)?;
        check_range("height", self.target_height)
    }
}

fn check_range(axis: &'static str, value: u32) -> Result<(), ValidationError> {
    if (MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::DimensionOutOfRange {
            axis,
            value,
            min: MIN_DIMENSION,
            max: MAX_DIMENSION,
        })
    }
}

/// Final integral output size for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDimensions {
    pub width: u32,
    pub height: u32,
}

/// Compute the output size for an image of `original_width` x `original_height`.
///
/// Without aspect preservation the request box is used as-is. With it, the
/// image is fitted inside the box: the relatively wider side is pinned to its
/// bound and the other side follows the original ratio, rounded half-up with
/// a floor of one pixel.
pub fn plan(
    original_width: u32,
    original_height: u32,
    request: &ResizeRequest,
) -> Result<PlannedDimensions, ValidationError> {
    if original_width == 0 || original_height == 0 {
        return Err(ValidationError::ZeroDimension {
            width: original_width,
            height: original_height,
        });
    }

    if !request.preserve_aspect_ratio {
        return Ok(PlannedDimensions {
            width: request.target_width,
            height: request.target_height,
        });
    }

    let target_width = f64::from(request.target_width);
    let target_height = f64::from(request.target_height);
    let original_ratio = f64::from(original_width) / f64::from(original_height);
    let target_ratio = target_width / target_height;

    let (width, height) = if original_ratio > target_ratio {
        (target_width, target_width / original_ratio)
    } else {
        (target_height * original_ratio, target_height)
    };

    Ok(PlannedDimensions {
        width: round_dimension(width),
        height: round_dimension(height),
    })
}

fn round_dimension(value: f64) -> u32 {
    (value + 0.5).floor().max(1.0) as u32
}
