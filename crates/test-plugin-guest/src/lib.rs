//! Test WASM guest plugin for end-to-end testing of the PDK.
//!
//! Exercises every host import group through six exports:
//!
//! | Export                     | Imports used                                      |
//! |----------------------------|---------------------------------------------------|
//! | `count_vowels`             | input, `config_get`, `var_get`/`var_set`, output  |
//! | `count_vowels_typed`       | input (JSON), output (JSON)                        |
//! | `count_vowels_json_output` | input, output (JSON), `log_*`                      |
//! | `greet`                    | input, `config_get`, `log_*`, output               |
//! | `http_get`                 | `http_request`, `http_status_code`, `http_headers` |
//! | `fail_with_error`          | `error_set`                                       |
//!
//! Built as a `cdylib` targeting `wasm32-unknown-unknown`. The `rlib` is what
//! the integration tests link against, with the imports served by the
//! simulated host.

use astrid_pdk::prelude::*;
use serde::{Deserialize, Serialize};

/// Fallback reported when the host sets no `thing` config key.
pub const UNSET_THING: &str = "<unset by host>";

/// Value `count_vowels` seeds var `a` with on first use.
pub const DEFAULT_VAR_A: &str = "this is var a";

/// URL `http_get` fetches.
pub const TODO_URL: &str = "https://jsonplaceholder.typicode.com/todos/1";

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u', 'A', 'E', 'I', 'O', 'U'];

#[derive(Debug, Deserialize)]
pub struct VowelsInput {
    pub input: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VowelsOutput {
    pub count: usize,
    pub total: usize,
    pub vowels: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub count: usize,
    pub config: String,
    pub a: String,
}

fn count(text: &str) -> usize {
    text.chars().filter(|c| VOWELS.contains(c)).count()
}

fn finish(result: PdkResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.report(),
    }
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn count_vowels() -> i32 {
    finish(run_count_vowels())
}

fn run_count_vowels() -> PdkResult<()> {
    let input = input::string()?;

    if var::get("a")?.is_none() {
        var::set("a", DEFAULT_VAR_A)?;
    }
    let a = var::get_string("a")?.unwrap_or_default();
    let thing = config::get_or("thing", UNSET_THING)?;

    let report = serde_json::to_vec(&Report {
        count: count(&input),
        config: thing,
        a,
    })
    .map_err(PdkError::Encode)?;
    // Hand the block straight to the host instead of copying through `output::bytes`.
    output::memory(Memory::from_bytes(report)?);
    Ok(())
}

/// Like `count_vowels`, but with JSON in and out. `total` equals `count`.
#[unsafe(no_mangle)]
pub extern "C" fn count_vowels_typed() -> i32 {
    finish(run_count_vowels_typed())
}

fn run_count_vowels_typed() -> PdkResult<()> {
    let VowelsInput { input } = input::json()?;
    let found = count(&input);
    output::json(&VowelsOutput {
        count: found,
        total: found,
        vowels: VOWELS.iter().collect(),
    })
}

/// Keeps a running total across calls in var `total`.
#[unsafe(no_mangle)]
pub extern "C" fn count_vowels_json_output() -> i32 {
    finish(run_count_vowels_json_output())
}

fn run_count_vowels_json_output() -> PdkResult<()> {
    let input = input::string()?;
    let found = count(&input);
    let total = var::get_i32("total")?
        .unwrap_or(0)
        .saturating_add(i32::try_from(found).unwrap_or(i32::MAX));
    var::set_i32("total", total)?;
    astrid_pdk::debug!("counted {found} vowels, {total} so far");
    output::json(&VowelsOutput {
        count: found,
        total: usize::try_from(total).unwrap_or_default(),
        vowels: VOWELS.iter().collect(),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn greet() -> i32 {
    finish(run_greet())
}

fn run_greet() -> PdkResult<()> {
    let name = input::string()?;
    let greeting = config::get_or("greeting", "Hello")?;
    astrid_pdk::info!("greeting {name}");
    output::string(format!("{greeting}, {name}!"))
}

/// Fetches [`TODO_URL`] and passes the response body through as output.
#[unsafe(no_mangle)]
pub extern "C" fn http_get() -> i32 {
    finish(run_http_get())
}

fn run_http_get() -> PdkResult<()> {
    let response = HttpRequest::new(TODO_URL)
        .with_header("some-name", "some-value")
        .with_header("another", "again")
        .send()?;
    astrid_pdk::info!("GET {TODO_URL} -> {}", response.status());
    match response.into_memory() {
        Some(body) => output::memory(body),
        None => output::bytes(b"")?,
    }
    Ok(())
}

#[unsafe(no_mangle)]
pub extern "C" fn fail_with_error() -> i32 {
    output::set_error("Some error message");
    FAILURE_STATUS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_both_cases() {
        assert_eq!(count("Hello World"), 3);
        assert_eq!(count("AEIOU aeiou"), 10);
        assert_eq!(count(""), 0);
        assert_eq!(count("rhythm"), 0);
    }
}
