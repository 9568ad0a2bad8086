use base64::{Engine, engine::general_purpose::STANDARD};
use image::RgbImage;

use crate::{MlErr, Result};

/// Strips a `data:<mime>;base64,` prefix, if any.
pub fn strip_data_url(payload: &str) -> &str {
    let payload = payload.trim();
    if !payload.starts_with("data:") {
        return payload;
    }

    payload
        .split_once(";base64,")
        .or_else(|| payload.split_once(','))
        .map(|(_, data)| data)
        .unwrap_or(payload)
}

/// Decodes a base64 (or data url) payload into an RGB image.
///
/// # Arguments
/// * `payload` - The encoded image, PNG, JPEG or any format the `image` crate knows.
///
/// # Returns
/// The decoded image or a `Decode` error.
pub fn decode_image(payload: &str) -> Result<RgbImage> {
    let data = strip_data_url(payload);
    if data.is_empty() {
        return Err(MlErr::Decode("empty image payload".into()));
    }

    let bytes = STANDARD
        .decode(data)
        .map_err(|e| MlErr::Decode(format!("invalid base64: {e}")))?;
    let image = image::load_from_memory(&bytes).map_err(|e| MlErr::Decode(e.to_string()))?;

    Ok(image.to_rgb8())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb};

    use super::*;

    /// A base64 PNG of a solid color.
    pub(crate) fn solid_png(color: [u8; 3], side: u32) -> String {
        let img = RgbImage::from_pixel(side, side, Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_raw_and_data_url() {
        let png = solid_png([10, 20, 30], 4);

        let raw = decode_image(&png).unwrap();
        let url = decode_image(&format!("data:image/png;base64,{png}")).unwrap();

        assert_eq!(raw.dimensions(), (4, 4));
        assert_eq!(raw, url);
        assert_eq!(raw.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn corrupt_payloads_are_decode_errors() {
        for payload in ["", "%%%not-base64%%%", "aGVsbG8gd29ybGQ="] {
            let err = decode_image(payload).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Decode, "{payload}");
        }
    }
}
