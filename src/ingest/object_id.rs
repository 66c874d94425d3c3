use std::fmt;

use thiserror::Error;

/// Length of a hex encoded BLAKE3 digest.
pub const OBJECT_ID_LEN: usize = 64;

/// Content derived identifier of a stored image.
///
/// Always exactly [`OBJECT_ID_LEN`] lowercase hex characters, so it is safe to
/// use as a file name or object key without further escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidObjectId {
  #[error("expected {expected} characters, got {0}", expected = OBJECT_ID_LEN)]
  Length(usize),
  #[error("invalid character {0:?}")]
  Character(char),
}

impl ObjectId {
  pub fn parse(raw: &str) -> Result<Self, InvalidObjectId> {
    if raw.len() != OBJECT_ID_LEN {
      return Err(InvalidObjectId::Length(raw.len()));
    }

    if let Some(c) = raw
      .chars()
      .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
    {
      return Err(InvalidObjectId::Character(c));
    }

    Ok(Self(raw.to_owned()))
  }

  pub(crate) fn from_digest(hash: blake3::Hash) -> Self {
    Self(hash.to_hex().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Name of the stored object, e.g. `{id}.jpeg`.
  pub fn file_name(&self) -> String {
    format!("{}.jpeg", self.0)
  }
}

impl fmt::Display for ObjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
