//! Plugin development kit for Astrid guest plugins.
//!
//! This crate wraps the raw `extism:host/env` imports from `astrid-pdk-sys`
//! in a safe, synchronous API for plugins compiled to WebAssembly:
//!
//! - [`memory`]: handles to host-owned blocks, with explicit ownership transfer
//! - [`input`] / [`output`]: the call's input bytes, output and error slots
//! - [`config`] / [`var`]: the host's read-only config and persistent var store
//! - [`log`] and the `trace!`..`error!` macros: the host log sink (the
//!   macros live at the crate root, e.g. `astrid_pdk::info!`)
//! - [`http`]: outbound HTTP performed by the host
//! - `transport`: an `http`-crate transport for generic client code
//! - `telemetry`: a `tracing` layer that logs through the host
//!
//! # Example
//!
//! ```rust,no_run
//! use astrid_pdk::prelude::*;
//!
//! #[unsafe(no_mangle)]
//! pub extern "C" fn greet() -> i32 {
//!     let run = || -> PdkResult<()> {
//!         let name = input::string()?;
//!         let greeting = config::get_or("greeting", "Hello")?;
//!         astrid_pdk::info!("greeting {name}");
//!         output::string(format!("{greeting}, {name}!"))
//!     };
//!     match run() {
//!         Ok(()) => 0,
//!         Err(e) => e.report(),
//!     }
//! }
//! ```
//!
//! Everything runs on the single guest thread; there is nothing to lock and
//! nothing is asynchronous. On native targets the imports are served by
//! `astrid_pdk_sys::sim`, which is how this crate's own tests run.

#![allow(unsafe_code)]
#![allow(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod http;
pub mod input;
pub mod log;
pub mod memory;
pub mod output;
#[cfg(feature = "tracing")]
pub mod telemetry;
mod transfer;
#[cfg(feature = "http")]
pub mod transport;
pub mod var;

pub use error::{FAILURE_STATUS, PdkError, PdkResult};
pub use memory::{HostAddress, Memory};

pub mod prelude {
    pub use crate::http::{HttpRequest, HttpResponse, Method};
    pub use crate::log::LogLevel;
    pub use crate::{
        FAILURE_STATUS, HostAddress, Memory, PdkError, PdkResult, config, input, output, var,
    };

    #[cfg(feature = "http")]
    pub use crate::transport::{HostTransport, HttpTransport};
}
