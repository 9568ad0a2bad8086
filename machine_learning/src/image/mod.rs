//! The image feature pipeline: decoding, digit vectors and extractor embeddings.

mod decode;
mod digit;
mod extractor;

pub use comms::msg::PredictionType;
pub use decode::{decode_image, strip_data_url};
pub use digit::{DIGIT_SIDE, digit_features};
pub use extractor::{
    EMBEDDING_SIZE, EXTRACTOR_SIDE, FeatureExtractor, PooledExtractor, normalized_pixels,
};

#[cfg(test)]
pub(crate) use decode::tests as tests_support;

use ndarray::Array2;
use rayon::prelude::*;

use crate::{MlErr, Result};

/// Turns one encoded image into a single row model input.
///
/// # Arguments
/// * `payload` - The base64 (or data url) image.
/// * `kind` - The pipeline to run: digit vector or extractor embedding.
/// * `extractor` - The shared extractor, required for `Classifier`.
///
/// # Returns
/// A `(1, n)` tensor, a `Decode` error or `NotReady` if the extractor is missing.
pub fn embed(
    payload: &str,
    kind: PredictionType,
    extractor: Option<&dyn FeatureExtractor>,
) -> Result<Array2<f32>> {
    match kind {
        PredictionType::Mnist => Ok(digit_features(&decode_image(payload)?)),
        PredictionType::Classifier => {
            let extractor = extractor.ok_or(MlErr::NotReady("feature extractor"))?;
            let embedding = extractor.embed(&decode_image(payload)?)?;
            Ok(Array2::from_shape_vec((1, embedding.len()), embedding)?)
        }
    }
}

/// Embeds many encoded images in parallel, one row per image.
pub fn embed_batch(payloads: &[String], extractor: &dyn FeatureExtractor) -> Result<Array2<f32>> {
    let rows = payloads
        .par_iter()
        .map(|p| extractor.embed(&decode_image(p)?))
        .collect::<Result<Vec<_>>>()?;

    let width = extractor.embedding_size();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((payloads.len(), width), flat)?)
}
