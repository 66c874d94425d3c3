use std::io::{self, Read, Seek, SeekFrom};

use blake3::Hasher;

use super::object_id::ObjectId;

/// BLAKE3 digest of everything left in `reader`.
///
/// The reader is consumed to the end and then rewound to offset 0 so the
/// same bytes can be handed to storage.
pub fn content_hash<R: Read + Seek>(reader: &mut R) -> io::Result<ObjectId> {
  let mut hasher = Hasher::new();

  let mut buffer = [0u8; 65536];
  loop {
    let bytes_read = reader.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  reader.seek(SeekFrom::Start(0))?;

  Ok(ObjectId::from_digest(hasher.finalize()))
}
