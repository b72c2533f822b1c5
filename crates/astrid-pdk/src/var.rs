//! The host var store: persistent key/value storage scoped to the plugin
//! instance.
//!
//! Every call goes straight to the host. Nothing is cached on the guest side,
//! so a value written by one call is visible to the next and never stale.

use serde::{Serialize, de::DeserializeOwned};

use crate::memory::{self, HostAddress, Memory};
use crate::{PdkError, PdkResult};

/// Raw value for `key`, `None` if unset.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key cannot be written to the host.
pub fn get(key: impl AsRef<str>) -> PdkResult<Option<Vec<u8>>> {
    let offset = lookup(key.as_ref())?;
    Ok(memory::take_host_block(offset))
}

/// The host block holding the value for `key`, without copying it.
///
/// The caller owns the returned block and must [`Memory::free`] it.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key cannot be written to the host.
pub fn get_memory(key: impl AsRef<str>) -> PdkResult<Option<Memory>> {
    let offset = lookup(key.as_ref())?;
    Ok(Memory::find(offset))
}

/// Value for `key` as UTF-8.
///
/// # Errors
/// [`PdkError::Utf8`] if the value is not UTF-8.
pub fn get_string(key: impl AsRef<str>) -> PdkResult<Option<String>> {
    get(key)?
        .map(|bytes| String::from_utf8(bytes).map_err(PdkError::from))
        .transpose()
}

/// Set `key` to `value`. An empty value removes the key.
///
/// The value block is handed to the host and is not freed here.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key or value cannot be written to the host.
pub fn set(key: impl AsRef<str>, value: impl AsRef<[u8]>) -> PdkResult<()> {
    let value = Memory::from_bytes(value)?;
    memory::with_key(key.as_ref(), |key| unsafe {
        astrid_pdk_sys::var_set(key, value.offset().raw());
    })
    // The host never saw the value if the key could not be written.
    .inspect_err(|_| value.free())
}

/// Set `key` to `value`, or remove it when `value` is `None`.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key or value cannot be written to the host.
pub fn set_opt(key: impl AsRef<str>, value: Option<&[u8]>) -> PdkResult<()> {
    match value {
        Some(value) => set(key, value),
        None => remove(key),
    }
}

/// Remove `key` from the store.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key cannot be written to the host.
pub fn remove(key: impl AsRef<str>) -> PdkResult<()> {
    memory::with_key(key.as_ref(), |key| unsafe {
        astrid_pdk_sys::var_set(key, 0);
    })
}

/// Value for `key` as a little-endian `i32`.
///
/// # Errors
/// [`PdkError::LengthMismatch`] if the stored value is not exactly 4 bytes.
pub fn get_i32(key: impl AsRef<str>) -> PdkResult<Option<i32>> {
    let Some(bytes) = get(key)? else {
        return Ok(None);
    };
    let word: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| PdkError::LengthMismatch {
            expected: 4,
            actual: bytes.len() as u64,
        })?;
    Ok(Some(i32::from_le_bytes(word)))
}

/// Store `value` as a little-endian `i32`.
///
/// # Errors
/// [`PdkError::AllocationFailed`] if the key or value cannot be written to the host.
pub fn set_i32(key: impl AsRef<str>, value: i32) -> PdkResult<()> {
    set(key, value.to_le_bytes())
}

/// # Errors
/// [`PdkError::Decode`] if the stored value is not valid JSON for `T`.
pub fn get_json<T: DeserializeOwned>(key: impl AsRef<str>) -> PdkResult<Option<T>> {
    get(key)?
        .map(|bytes| serde_json::from_slice(&bytes).map_err(PdkError::Decode))
        .transpose()
}

/// # Errors
/// [`PdkError::Encode`] if `value` cannot be serialized.
pub fn set_json<T: Serialize + ?Sized>(key: impl AsRef<str>, value: &T) -> PdkResult<()> {
    let bytes = serde_json::to_vec(value).map_err(PdkError::Encode)?;
    set(key, bytes)
}

/// # Errors
/// [`PdkError::MsgPackDecode`] if the stored value does not decode into `T`.
#[cfg(feature = "msgpack")]
pub fn get_msgpack<T: DeserializeOwned>(key: impl AsRef<str>) -> PdkResult<Option<T>> {
    get(key)?
        .map(|bytes| rmp_serde::from_slice(&bytes).map_err(PdkError::from))
        .transpose()
}

/// # Errors
/// [`PdkError::MsgPackEncode`] if `value` cannot be serialized.
#[cfg(feature = "msgpack")]
pub fn set_msgpack<T: Serialize + ?Sized>(key: impl AsRef<str>, value: &T) -> PdkResult<()> {
    let bytes = rmp_serde::to_vec_named(value)?;
    set(key, bytes)
}

/// # Errors
/// [`PdkError::Borsh`] if the stored value does not decode into `T`.
#[cfg(feature = "borsh")]
pub fn get_borsh<T: borsh::BorshDeserialize>(key: impl AsRef<str>) -> PdkResult<Option<T>> {
    get(key)?
        .map(|bytes| borsh::from_slice(&bytes).map_err(PdkError::from))
        .transpose()
}

/// # Errors
/// [`PdkError::Borsh`] if `value` cannot be serialized.
#[cfg(feature = "borsh")]
pub fn set_borsh<T: borsh::BorshSerialize>(key: impl AsRef<str>, value: &T) -> PdkResult<()> {
    let bytes = borsh::to_vec(value)?;
    set(key, bytes)
}

fn lookup(key: &str) -> PdkResult<HostAddress> {
    let offset = memory::with_key(key, |key| unsafe { astrid_pdk_sys::var_get(key) })?;
    Ok(HostAddress::from_raw(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_pdk_sys::sim;
    use proptest::prelude::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[test]
    fn unset_var_is_absent() {
        sim::reset();
        assert_eq!(get("a").unwrap(), None);
    }

    #[test]
    fn set_then_get_returns_exact_bytes() {
        sim::reset();
        set("a", "this is var a").unwrap();
        assert_eq!(get("a").unwrap().as_deref(), Some(&b"this is var a"[..]));
        assert_eq!(get_string("a").unwrap().as_deref(), Some("this is var a"));
    }

    #[test]
    fn removing_makes_the_var_absent() {
        sim::reset();
        set("k", b"v").unwrap();
        set_opt("k", None).unwrap();
        assert_eq!(get("k").unwrap(), None);

        set("k", b"v").unwrap();
        remove("k").unwrap();
        assert_eq!(get("k").unwrap(), None);
    }

    #[test]
    fn setting_empty_deletes() {
        sim::reset();
        set("k", b"v").unwrap();
        set("k", b"").unwrap();
        assert_eq!(sim::with_host(|h| h.var("k").map(<[u8]>::to_vec)), None);
    }

    #[test]
    fn vars_persist_across_calls() {
        sim::reset();
        set("counter", b"1").unwrap();
        sim::with_host(sim::SimHost::new_call);
        assert_eq!(get("counter").unwrap().as_deref(), Some(&b"1"[..]));
    }

    #[test]
    fn get_memory_leaves_the_block_to_the_caller() {
        sim::reset();
        set("blob", b"0123456789").unwrap();
        let before = sim::with_host(|h| h.live_blocks());
        let mem = get_memory("blob").unwrap().unwrap();
        assert_eq!(mem.to_vec(), b"0123456789");
        assert_eq!(sim::with_host(|h| h.live_blocks()), before + 1);
        mem.free();
        assert_eq!(sim::with_host(|h| h.live_blocks()), before);
    }

    #[test]
    fn i32_values_are_little_endian() {
        sim::reset();
        set_i32("n", -2).unwrap();
        assert_eq!(
            sim::with_host(|h| h.var("n").map(<[u8]>::to_vec)),
            Some(vec![0xfe, 0xff, 0xff, 0xff])
        );
        assert_eq!(get_i32("n").unwrap(), Some(-2));

        set("n", b"xy").unwrap();
        assert!(matches!(
            get_i32("n"),
            Err(PdkError::LengthMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct State {
        seen: u32,
        tags: Vec<String>,
    }

    #[test]
    fn json_vars_round_trip() {
        sim::reset();
        let state = State {
            seen: 7,
            tags: vec![],
        };
        set_json("state", &state).unwrap();
        assert_eq!(get_json::<State>("state").unwrap(), Some(state));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        labels: BTreeMap<String, String>,
    }

    #[test]
    fn json_vars_keep_empty_maps_and_strings() {
        sim::reset();
        let profile = Profile {
            name: String::new(),
            labels: BTreeMap::new(),
        };
        set_json("profile", &profile).unwrap();
        assert_eq!(
            sim::with_host(|h| h.var("profile").map(<[u8]>::to_vec)),
            Some(br#"{"name":"","labels":{}}"#.to_vec())
        );
        assert_eq!(get_json::<Profile>("profile").unwrap(), Some(profile));
    }

    proptest! {
        #[test]
        fn json_vars_round_trip_any_profile(
            name in ".{0,24}",
            labels in proptest::collection::btree_map(".{0,8}", ".{0,16}", 0..6),
        ) {
            sim::reset();
            let profile = Profile { name, labels };
            set_json("profile", &profile).unwrap();
            prop_assert_eq!(get_json::<Profile>("profile").unwrap(), Some(profile));
        }
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn msgpack_vars_round_trip() {
        sim::reset();
        let state = State {
            seen: 1,
            tags: vec!["x".into()],
        };
        set_msgpack("state", &state).unwrap();
        assert_eq!(get_msgpack::<State>("state").unwrap(), Some(state));
    }

    #[cfg(feature = "borsh")]
    #[test]
    fn borsh_vars_round_trip() {
        sim::reset();
        set_borsh("pair", &(3u8, String::from("three"))).unwrap();
        assert_eq!(
            get_borsh::<(u8, String)>("pair").unwrap(),
            Some((3, "three".to_string()))
        );
    }
}
