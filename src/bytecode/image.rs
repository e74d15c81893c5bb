use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::bytecode::ir::Program;

/// Magic prefix of a compiled program image, followed by a format version.
const MAGIC: &[u8; 4] = b"cdrc";
const VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a compiled program image")]
    BadMagic,

    #[error("unsupported image version {0}")]
    BadVersion(u8),

    #[error("cannot encode program image: {0}")]
    Encode(postcard::Error),

    #[error("malformed program image: {0}")]
    Decode(postcard::Error),
}

pub fn to_bytes(program: &Program) -> Result<Vec<u8>, ImageError> {
    let payload = postcard::to_allocvec(program).map_err(ImageError::Encode)?;
    let mut bytes = Vec::with_capacity(MAGIC.len() + 1 + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.push(VERSION);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Program, ImageError> {
    if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ImageError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(ImageError::BadVersion(version));
    }
    postcard::from_bytes(&bytes[MAGIC.len() + 1..]).map_err(ImageError::Decode)
}

pub fn save(program: &Program, path: &Path) -> Result<(), ImageError> {
    fs::write(path, to_bytes(program)?)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Program, ImageError> {
    from_bytes(&fs::read(path)?)
}
