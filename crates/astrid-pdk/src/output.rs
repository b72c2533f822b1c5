//! The call output and error slots.
//!
//! Blocks handed to the host here are owned by the host from then on; they
//! are not freed on the guest side.

use serde::Serialize;

use crate::memory::Memory;
use crate::{PdkError, PdkResult};

/// Register `memory` as the call's output without copying it again.
pub fn memory(memory: Memory) {
    unsafe { astrid_pdk_sys::output_set(memory.offset().raw(), memory.len()) };
}

/// Register `data` as the call's output.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the host cannot hold the output.
pub fn bytes(data: impl AsRef<[u8]>) -> PdkResult<()> {
    memory(Memory::from_bytes(data)?);
    Ok(())
}

/// Register a UTF-8 string as the call's output.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the host cannot hold the output.
pub fn string(data: impl AsRef<str>) -> PdkResult<()> {
    bytes(data.as_ref().as_bytes())
}

/// Encode `value` as JSON and register it as the call's output.
///
/// # Errors
/// [`PdkError::Encode`] if `value` cannot be serialized.
pub fn json<T: Serialize + ?Sized>(value: &T) -> PdkResult<()> {
    let data = serde_json::to_vec(value).map_err(PdkError::Encode)?;
    bytes(data)
}

/// Encode `value` as MessagePack (named fields) and register it as the call's output.
///
/// # Errors
/// [`PdkError::MsgPackEncode`] if `value` cannot be serialized.
#[cfg(feature = "msgpack")]
pub fn msgpack<T: Serialize + ?Sized>(value: &T) -> PdkResult<()> {
    let data = rmp_serde::to_vec_named(value)?;
    bytes(data)
}

/// Staged in place of an empty error message.
const EMPTY_ERROR: &str = "plugin failed without an error message";

/// Stage `message` as the call's error.
///
/// This does not stop the plugin. The entry point is still expected to
/// return a failure status (see [`PdkError::report`]). If the host cannot
/// even allocate the message there is nothing left to report it through, so
/// the error is dropped.
///
/// An empty message is replaced by a fixed one: it would otherwise reach the
/// host as offset 0, which clears the staged error instead of setting it.
pub fn set_error(message: &str) {
    let message = if message.is_empty() { EMPTY_ERROR } else { message };
    if let Ok(memory) = Memory::from_bytes(message) {
        unsafe { astrid_pdk_sys::error_set(memory.offset().raw()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_pdk_sys::sim;
    use std::collections::BTreeMap;

    fn host_output() -> Option<Vec<u8>> {
        sim::with_host(|h| h.output().map(<[u8]>::to_vec))
    }

    #[test]
    fn bytes_become_the_output() {
        sim::reset();
        bytes(b"result").unwrap();
        assert_eq!(host_output(), Some(b"result".to_vec()));
    }

    #[test]
    fn empty_output_is_allowed() {
        sim::reset();
        string("").unwrap();
        assert_eq!(host_output(), Some(Vec::new()));
    }

    #[test]
    fn json_output_round_trips() {
        sim::reset();
        let mut value = BTreeMap::new();
        value.insert("count", 3);
        json(&value).unwrap();
        let decoded: BTreeMap<String, i32> =
            serde_json::from_slice(&host_output().unwrap()).unwrap();
        assert_eq!(decoded.get("count"), Some(&3));
    }

    #[test]
    fn unserializable_value_is_an_encode_error() {
        sim::reset();
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);
        assert!(matches!(json(&bad), Err(PdkError::Encode(_))));
        assert_eq!(host_output(), None);
    }

    #[test]
    fn set_error_stages_the_message() {
        sim::reset();
        set_error("boom");
        assert_eq!(sim::with_host(|h| h.error().map(str::to_owned)), Some("boom".into()));
    }

    #[test]
    fn empty_error_still_reaches_the_host() {
        sim::reset();
        set_error("");
        assert_eq!(
            sim::with_host(|h| h.error().map(str::to_owned)),
            Some(EMPTY_ERROR.to_owned())
        );
    }

    #[test]
    fn report_returns_the_failure_status() {
        sim::reset();
        let err = PdkError::InvalidStatus(-1);
        assert_eq!(err.report(), crate::FAILURE_STATUS);
        assert_eq!(
            sim::with_host(|h| h.error().map(str::to_owned)),
            Some("host reported invalid HTTP status code -1".into())
        );
    }
}
