//! The call input.
//!
//! The host exposes the input as an indexed byte stream rather than a block,
//! so each request reads the whole stream into a fresh local buffer.

use serde::de::DeserializeOwned;

use crate::transfer::{self, InputStream};
use crate::{PdkError, PdkResult};

/// The full input as raw bytes. Empty if the host provided none.
#[must_use]
pub fn bytes() -> Vec<u8> {
    let length = usize::try_from(InputStream::len()).unwrap_or(0);
    let mut buffer = vec![0; length];
    transfer::read_into(&InputStream, &mut buffer);
    buffer
}

/// The input as UTF-8.
///
/// # Errors
/// [`PdkError::Utf8`] if the input is not valid UTF-8.
pub fn string() -> PdkResult<String> {
    Ok(String::from_utf8(bytes())?)
}

/// Decode the input as JSON.
///
/// # Errors
/// [`PdkError::Decode`] on malformed JSON or a shape mismatch.
pub fn json<T: DeserializeOwned>() -> PdkResult<T> {
    serde_json::from_slice(&bytes()).map_err(PdkError::Decode)
}

/// Decode the input as MessagePack.
///
/// # Errors
/// [`PdkError::MsgPackDecode`] if the input does not decode into `T`.
#[cfg(feature = "msgpack")]
pub fn msgpack<T: DeserializeOwned>() -> PdkResult<T> {
    Ok(rmp_serde::from_slice(&bytes())?)
}
