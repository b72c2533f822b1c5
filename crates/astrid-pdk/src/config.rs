//! Read-only host configuration.
//!
//! Config entries are populated by the host before the call. Keys and values
//! are raw UTF-8 with no framing.

use serde::de::DeserializeOwned;

use crate::memory::{self, HostAddress};
use crate::{PdkError, PdkResult};

/// Raw value for `key`, `None` if the host has no such entry.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key cannot be written to the host.
pub fn get_bytes(key: impl AsRef<str>) -> PdkResult<Option<Vec<u8>>> {
    let offset = memory::with_key(key.as_ref(), |key| unsafe {
        astrid_pdk_sys::config_get(key)
    })?;
    Ok(memory::take_host_block(HostAddress::from_raw(offset)))
}

/// Value for `key` as a string.
///
/// An entry that exists but is empty is `Some("")`, distinct from absent.
///
/// # Errors
/// [`PdkError::Utf8`] if the value is not UTF-8.
pub fn get(key: impl AsRef<str>) -> PdkResult<Option<String>> {
    get_bytes(key)?
        .map(|bytes| String::from_utf8(bytes).map_err(PdkError::from))
        .transpose()
}

/// Value for `key`, or `default` when absent.
///
/// # Errors
/// [`PdkError::Utf8`] if the value is not UTF-8.
pub fn get_or(key: impl AsRef<str>, default: impl Into<String>) -> PdkResult<String> {
    Ok(get(key)?.unwrap_or_else(|| default.into()))
}

/// Value for `key` decoded as JSON.
///
/// # Errors
/// [`PdkError::Decode`] if the value is present but not valid JSON for `T`.
pub fn get_json<T: DeserializeOwned>(key: impl AsRef<str>) -> PdkResult<Option<T>> {
    get_bytes(key)?
        .map(|bytes| serde_json::from_slice(&bytes).map_err(PdkError::Decode))
        .transpose()
}
