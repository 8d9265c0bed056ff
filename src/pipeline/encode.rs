//! Image encoding: normalized PNG → base64 `ImageData` for vision models.
//!
//! Only the vision OCR engine needs this. The normalized image is already a
//! PNG, so this is a straight base64 wrap; PNG stays lossless, which keeps
//! the binarized glyph edges crisp for the model.

use crate::model::NormalizedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a normalized image as a base64 PNG attachment.
///
/// `detail: "high"` lets GPT-4-class models tile the image instead of
/// downscaling it to a single overview tile, which loses small handwriting.
pub fn encode_image(img: &NormalizedImage) -> ImageData {
    let b64 = STANDARD.encode(img.png());
    debug!("Encoded {} → {} bytes base64", img.source(), b64.len());

    ImageData::new(b64, "image/png").with_detail("high")
}
