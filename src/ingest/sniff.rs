use std::fmt;
use std::io::{BufRead, Seek, SeekFrom};

use image::{ImageFormat, ImageReader};
use tracing::debug;

/// Image formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
  Png,
  Jpeg,
  Unrecognized,
}

impl DetectedFormat {
  pub fn as_str(&self) -> &'static str {
    match self {
      DetectedFormat::Png => "png",
      DetectedFormat::Jpeg => "jpeg",
      DetectedFormat::Unrecognized => "unrecognized",
    }
  }
}

impl fmt::Display for DetectedFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Classifies `reader` by its leading bytes and header.
///
/// Only the signature and the image header are read; pixel data is never
/// decoded. The reader is left at offset 0 whatever the outcome.
pub fn sniff<R: BufRead + Seek>(reader: &mut R) -> DetectedFormat {
  let format = classify(reader);

  if let Err(e) = reader.seek(SeekFrom::Start(0)) {
    debug!("failed to rewind upload after sniffing: {}", e);
    return DetectedFormat::Unrecognized;
  }

  format
}

fn classify<R: BufRead + Seek>(reader: &mut R) -> DetectedFormat {
  let image_reader = match ImageReader::new(&mut *reader).with_guessed_format() {
    Ok(r) => r,
    Err(e) => {
      debug!("failed to read upload signature: {}", e);
      return DetectedFormat::Unrecognized;
    }
  };

  let format = match image_reader.format() {
    Some(ImageFormat::Png) => DetectedFormat::Png,
    Some(ImageFormat::Jpeg) => DetectedFormat::Jpeg,
    _ => return DetectedFormat::Unrecognized,
  };

  // A recognised signature still needs a parseable header
  match image_reader.into_dimensions() {
    Ok((width, height)) => {
      debug!("sniffed {} upload, {}x{}", format, width, height);
      format
    }
    Err(e) => {
      debug!("invalid {} header: {}", format, e);
      DetectedFormat::Unrecognized
    }
  }
}
