//! Storage key and asset name generation.
//!
//! Names are 32 random bytes from the OS CSPRNG, URL-safe base64 encoded,
//! with an extension taken from the content type. Collisions are treated as
//! improbable; the store is never consulted.

use crate::services::aspect::AspectRatio;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

const RANDOM_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("content type `{0}` has no known file extension")]
    UnsupportedContentType(String),
}

/// File extension for an accepted media type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "video/mp4" => Some("mp4"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Random file name with the extension matching `content_type`.
pub fn asset_name(content_type: &str) -> Result<String, KeyError> {
    let ext = extension_for(content_type)
        .ok_or_else(|| KeyError::UnsupportedContentType(content_type.to_string()))?;

    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);

    Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(bytes), ext))
}

/// Object key for an upload, prefixed with the orientation bucket when known.
pub fn object_key(content_type: &str, aspect: Option<AspectRatio>) -> Result<String, KeyError> {
    let name = asset_name(content_type)?;
    Ok(match aspect {
        Some(aspect) => format!("{}/{}", aspect.key_prefix(), name),
        None => name,
    })
}
