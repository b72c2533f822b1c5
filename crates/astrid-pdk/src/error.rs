//! PDK error types.

use thiserror::Error;

/// Status an entry point returns after staging an error with the host.
pub const FAILURE_STATUS: i32 = 1;

/// Core error type for PDK operations.
///
/// Host faults (bad offsets, out-of-range accesses) never show up here:
/// the host traps the guest before a value could be produced.
#[derive(Error, Debug)]
pub enum PdkError {
    #[error("JSON encoding error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("JSON decoding error: {0}")]
    Decode(#[source] serde_json::Error),
    #[cfg(feature = "msgpack")]
    #[error("MessagePack serialization error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[cfg(feature = "msgpack")]
    #[error("MessagePack deserialization error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[cfg(feature = "borsh")]
    #[error("Borsh serialization error: {0}")]
    Borsh(#[from] std::io::Error),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("host failed to allocate {length} bytes")]
    AllocationFailed { length: u64 },
    #[error("buffer of {actual} bytes does not match host block of {expected} bytes")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("host reported invalid HTTP status code {0}")]
    InvalidStatus(i32),
    #[error("invalid HTTP header: {0}")]
    InvalidHeader(String),
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl PdkError {
    /// Stage this error as the call's error message and return the failure status.
    ///
    /// Entry points use this as their last expression:
    ///
    /// ```rust,no_run
    /// # fn run() -> astrid_pdk::PdkResult<()> { Ok(()) }
    /// pub extern "C" fn plugin_main() -> i32 {
    ///     match run() {
    ///         Ok(()) => 0,
    ///         Err(e) => e.report(),
    ///     }
    /// }
    /// ```
    #[must_use]
    pub fn report(&self) -> i32 {
        crate::output::set_error(&self.to_string());
        FAILURE_STATUS
    }
}

/// Result type for PDK operations.
pub type PdkResult<T> = Result<T, PdkError>;
