use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, ImageFormat, ImageReader, Rgb, RgbImage, Rgba};
use tracing::debug;

use super::sniff::DetectedFormat;
use super::IngestError;

/// Upload re-encoded into the single stored encoding (JPEG).
#[derive(Debug, Clone)]
pub struct CanonicalImage {
  pub bytes: Bytes,
  /// True when the upload was already JPEG and is stored verbatim.
  pub passthrough: bool,
}

type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

pub fn normalize(
  stream: Cursor<Bytes>,
  format: DetectedFormat,
) -> Result<CanonicalImage, IngestError> {
  match format {
    DetectedFormat::Jpeg => Ok(CanonicalImage {
      bytes: stream.into_inner(),
      passthrough: true,
    }),
    DetectedFormat::Png => Ok(CanonicalImage {
      bytes: transcode_png(stream)?,
      passthrough: false,
    }),
    DetectedFormat::Unrecognized => Err(IngestError::UnsupportedFormat),
  }
}

fn transcode_png(stream: Cursor<Bytes>) -> Result<Bytes, IngestError> {
  let decoded = ImageReader::with_format(stream, ImageFormat::Png)
    .decode()
    .map_err(IngestError::Decode)?;

  let intermediate: Rgba16Image = decoded.to_rgba16();
  let flattened = flatten(&intermediate);

  let mut out = Vec::new();
  JpegEncoder::new(&mut out)
    .encode_image(&flattened)
    .map_err(IngestError::Encode)?;

  debug!(
    "transcoded png {}x{} to {} bytes of jpeg",
    flattened.width(),
    flattened.height(),
    out.len()
  );

  Ok(Bytes::from(out))
}

/// Drops alpha by premultiplying, so transparent areas end up black.
fn flatten(img: &Rgba16Image) -> RgbImage {
  RgbImage::from_fn(img.width(), img.height(), |x, y| {
    let Rgba([r, g, b, a]) = *img.get_pixel(x, y);
    Rgb([
      premultiply(r, a),
      premultiply(g, a),
      premultiply(b, a),
    ])
  })
}

fn premultiply(channel: u16, alpha: u16) -> u8 {
  let value = channel as u32 * alpha as u32 / u16::MAX as u32;
  (value >> 8) as u8
}
