//! Raw host imports for Astrid PDK guest plugins.
//!
//! This crate declares the absolute lowest-level ABI between a guest plugin
//! and an Extism-compatible host: the `extism:host/env` import module. Every
//! parameter is a bare `u64` host offset, a length, or a single byte/word.
//! Nothing here validates anything. A bad offset is a host fault and the
//! host decides what happens to the guest (usually a trap).
//!
//! Plugin authors should never call these directly. All ownership rules and
//! serialization live in the `astrid-pdk` layer above.
//!
//! On non-wasm targets the same functions are backed by [`sim`], a
//! thread-local simulated host, so everything above this crate can be unit
//! tested with a plain `cargo test`.

#![allow(unsafe_code)]
#![allow(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

#[cfg(target_arch = "wasm32")]
#[link(wasm_import_module = "extism:host/env")]
unsafe extern "C" {
    // -----------------------------------------------------------------------
    // Host memory
    // -----------------------------------------------------------------------
    /// Allocate `length` bytes of host memory, returning its offset (0 on failure).
    pub fn alloc(length: u64) -> u64;
    /// Release a block previously returned by `alloc`.
    pub fn free(offset: u64);
    /// Length of the block starting at `offset`, or 0 if there is none.
    pub fn length(offset: u64) -> u64;
    /// Like `length`, without the host validating `offset`.
    pub fn length_unsafe(offset: u64) -> u64;

    pub fn load_u8(offset: u64) -> u8;
    /// `offset` must lie on an 8-byte boundary.
    pub fn load_u64(offset: u64) -> u64;
    pub fn store_u8(offset: u64, value: u8);
    /// `offset` must lie on an 8-byte boundary.
    pub fn store_u64(offset: u64, value: u64);

    // -----------------------------------------------------------------------
    // Call input / output
    // -----------------------------------------------------------------------
    pub fn input_length() -> u64;
    pub fn input_load_u8(index: u64) -> u8;
    pub fn input_load_u64(index: u64) -> u64;

    /// Register `length` bytes at `offset` as the call's output. The host copies them.
    pub fn output_set(offset: u64, length: u64);
    /// Register the UTF-8 block at `offset` as the call's error. The host copies it.
    pub fn error_set(offset: u64);

    // -----------------------------------------------------------------------
    // Config & vars
    // -----------------------------------------------------------------------
    /// Look up the config value for the key block at `key`. 0 means absent.
    pub fn config_get(key: u64) -> u64;
    /// Look up the var for the key block at `key`. 0 means absent.
    pub fn var_get(key: u64) -> u64;
    /// Bind the key block at `key` to the value block at `value`. A `value` of 0 deletes.
    pub fn var_set(key: u64, value: u64);

    // -----------------------------------------------------------------------
    // Logging
    // -----------------------------------------------------------------------
    pub fn log_trace(offset: u64);
    pub fn log_debug(offset: u64);
    pub fn log_info(offset: u64);
    pub fn log_warn(offset: u64);
    pub fn log_error(offset: u64);
    /// Minimum level the host will record (0 = trace .. 4 = error, higher = off).
    pub fn get_log_level() -> i32;

    // -----------------------------------------------------------------------
    // HTTP
    // -----------------------------------------------------------------------
    /// Perform the request described by the JSON block at `request`, with an
    /// optional body block (0 for none). Returns the response body block, 0 if empty.
    pub fn http_request(request: u64, body: u64) -> u64;
    /// Status code of the last `http_request`.
    pub fn http_status_code() -> i32;
    /// JSON header map of the last `http_request`, 0 if the host withholds it.
    pub fn http_headers() -> u64;
}

#[cfg(not(target_arch = "wasm32"))]
pub mod sim;

#[cfg(not(target_arch = "wasm32"))]
pub use sim::abi::*;
