//! In-process simulated host for native builds.
//!
//! Mirrors what an Extism host does behind `extism:host/env`, closely enough
//! for guest code to be exercised with `cargo test`:
//!
//! - a block allocator handing out 8-aligned offsets that are never reused
//! - the call input, output and error slots
//! - a read-only config map and a var map that survives [`SimHost::new_call`]
//! - a log sink filtered by a configurable minimum level
//! - a scripted HTTP responder
//! - a trace of every load/store crossing, for asserting transfer patterns
//!
//! Boundary faults (unknown offsets, out-of-range or misaligned accesses,
//! double frees) panic, which is the closest native analogue of the host
//! trapping the guest.
//!
//! The host is thread-local. Every test thread starts with a fresh one.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// First offset handed out. Offset 0 is reserved as the null sentinel.
const BASE_OFFSET: u64 = 64;

/// Word size of the `*_u64` accessors.
const WORD: u64 = 8;

thread_local! {
    static HOST: RefCell<SimHost> = RefCell::new(SimHost::default());
}

/// Run `f` against this thread's simulated host.
///
/// # Panics
/// Panics if called re-entrantly from inside another `with_host` closure.
pub fn with_host<R>(f: impl FnOnce(&mut SimHost) -> R) -> R {
    HOST.with(|host| f(&mut host.borrow_mut()))
}

/// Replace this thread's simulated host with a fresh one.
pub fn reset() {
    with_host(|host| *host = SimHost::default());
}

/// Severity of a record in the simulated log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

/// A message the guest sent to the host log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
}

/// One crossing of a byte/word accessor, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    LoadU8(u64),
    LoadU64(u64),
    StoreU8(u64),
    StoreU64(u64),
    InputU8(u64),
    InputU64(u64),
}

impl Access {
    /// Whether this crossing moved a full word.
    #[must_use]
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            Self::LoadU64(_) | Self::StoreU64(_) | Self::InputU64(_)
        )
    }
}

/// Request metadata the guest wrote for `http_request`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpCall {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
}

/// What the simulated network returns for an [`HttpCall`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpReply {
    pub status: i32,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Vec<u8>,
}

impl HttpReply {
    /// A reply with the given status, no headers and no body.
    #[must_use]
    pub fn status(status: i32) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

type Responder = Box<dyn FnMut(&HttpCall) -> HttpReply>;

/// State of the simulated host.
pub struct SimHost {
    blocks: BTreeMap<u64, Vec<u8>>,
    next_offset: u64,
    /// Successful allocations left before one fails, if a failure is armed.
    fail_alloc_in: Option<usize>,
    input: Vec<u8>,
    output: Option<Vec<u8>>,
    error: Option<String>,
    config: HashMap<String, String>,
    vars: HashMap<String, Vec<u8>>,
    log_level: i32,
    logs: Vec<LogRecord>,
    responder: Option<Responder>,
    http_calls: Vec<HttpCall>,
    last_status: i32,
    last_headers: Option<BTreeMap<String, String>>,
    accesses: Vec<Access>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
            next_offset: BASE_OFFSET,
            fail_alloc_in: None,
            input: Vec::new(),
            output: None,
            error: None,
            config: HashMap::new(),
            vars: HashMap::new(),
            log_level: Level::Trace as i32,
            logs: Vec::new(),
            responder: None,
            http_calls: Vec::new(),
            last_status: 0,
            last_headers: None,
            accesses: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SimHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimHost")
            .field("live_blocks", &self.blocks.len())
            .field("input_len", &self.input.len())
            .field("output", &self.output)
            .field("error", &self.error)
            .field("vars", &self.vars.len())
            .field("logs", &self.logs.len())
            .finish_non_exhaustive()
    }
}

fn fault(message: &str) -> ! {
    panic!("simulated host fault: {message}")
}

fn to_index(value: u64) -> usize {
    usize::try_from(value).unwrap_or_else(|_| fault("offset exceeds address space"))
}

impl SimHost {
    // -----------------------------------------------------------------------
    // Test-facing setup and inspection
    // -----------------------------------------------------------------------

    /// Set the bytes the guest will see as its call input.
    pub fn set_input(&mut self, input: impl Into<Vec<u8>>) {
        self.input = input.into();
    }

    /// Insert a config entry.
    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    /// Minimum level recorded by the log sink. Anything above `Error` disables logging.
    pub fn set_log_level(&mut self, level: i32) {
        self.log_level = level;
    }

    /// Install the function that answers `http_request`.
    pub fn respond_with(&mut self, responder: impl FnMut(&HttpCall) -> HttpReply + 'static) {
        self.responder = Some(Box::new(responder));
    }

    /// Make the next `alloc` report failure by returning offset 0.
    pub fn fail_next_alloc(&mut self) {
        self.fail_alloc_after(0);
    }

    /// Let `successes` more allocations through, then fail the one after.
    pub fn fail_alloc_after(&mut self, successes: usize) {
        self.fail_alloc_in = Some(successes);
    }

    /// Start a new plugin call in the same execution context.
    ///
    /// Memory, input/output, logs and the access trace are dropped; vars,
    /// config and the HTTP responder persist.
    pub fn new_call(&mut self) {
        self.blocks.clear();
        self.input.clear();
        self.output = None;
        self.error = None;
        self.logs.clear();
        self.http_calls.clear();
        self.last_status = 0;
        self.last_headers = None;
        self.accesses.clear();
    }

    #[must_use]
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn logs(&self) -> &[LogRecord] {
        &self.logs
    }

    /// Current host-side value of a var.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&[u8]> {
        self.vars.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn http_calls(&self) -> &[HttpCall] {
        &self.http_calls
    }

    #[must_use]
    pub fn accesses(&self) -> &[Access] {
        &self.accesses
    }

    pub fn clear_accesses(&mut self) {
        self.accesses.clear();
    }

    /// Number of allocated, not yet freed, blocks.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Contents of the block starting at `offset`, if it is live.
    #[must_use]
    pub fn block(&self, offset: u64) -> Option<&[u8]> {
        self.blocks.get(&offset).map(Vec::as_slice)
    }

    /// Allocate a block holding `bytes`, as the host does when returning data.
    pub fn allocate_with(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.reserve(bytes.len() as u64);
        self.blocks.insert(offset, bytes.to_vec());
        offset
    }

    // -----------------------------------------------------------------------
    // Memory internals
    // -----------------------------------------------------------------------

    fn reserve(&mut self, length: u64) -> u64 {
        let offset = self.next_offset;
        // Keep a gap after empty blocks so no two live blocks share an offset.
        let span = length.max(1);
        let end = offset
            .checked_add(span)
            .and_then(|end| end.checked_next_multiple_of(WORD))
            .unwrap_or_else(|| fault("host memory exhausted"));
        self.next_offset = end;
        offset
    }

    /// Locate `width` bytes at `offset` inside a live block.
    fn locate(&self, offset: u64, width: u64) -> (u64, usize) {
        let Some((&base, block)) = self.blocks.range(..=offset).next_back() else {
            fault(&format!("offset {offset} is not inside any block"));
        };
        let start = offset.checked_sub(base).unwrap_or_else(|| fault("underflow"));
        let end = start
            .checked_add(width)
            .unwrap_or_else(|| fault("access overflows"));
        if end > block.len() as u64 {
            fault(&format!(
                "access of {width} bytes at {offset} runs past block {base} of length {}",
                block.len()
            ));
        }
        (base, to_index(start))
    }

    /// Whole contents of a block. The null offset reads as empty.
    fn read_block(&self, offset: u64) -> Vec<u8> {
        if offset == 0 {
            return Vec::new();
        }
        self.blocks
            .get(&offset)
            .cloned()
            .unwrap_or_else(|| fault(&format!("offset {offset} is not a block")))
    }

    fn read_string(&self, offset: u64) -> String {
        String::from_utf8_lossy(&self.read_block(offset)).into_owned()
    }

    // -----------------------------------------------------------------------
    // Import implementations
    // -----------------------------------------------------------------------

    fn alloc(&mut self, length: u64) -> u64 {
        match self.fail_alloc_in.take() {
            Some(0) => return 0,
            Some(left) => self.fail_alloc_in = left.checked_sub(1),
            None => {}
        }
        let offset = self.reserve(length);
        self.blocks.insert(offset, vec![0; to_index(length)]);
        offset
    }

    fn free(&mut self, offset: u64) {
        if offset == 0 {
            return;
        }
        if self.blocks.remove(&offset).is_none() {
            fault(&format!("free of unknown block {offset}"));
        }
    }

    fn length(&self, offset: u64) -> u64 {
        self.blocks.get(&offset).map_or(0, |block| block.len() as u64)
    }

    fn load_u8(&mut self, offset: u64) -> u8 {
        self.accesses.push(Access::LoadU8(offset));
        let (base, at) = self.locate(offset, 1);
        self.blocks[&base][at]
    }

    fn load_u64(&mut self, offset: u64) -> u64 {
        self.accesses.push(Access::LoadU64(offset));
        if !offset.is_multiple_of(WORD) {
            fault(&format!("misaligned word load at {offset}"));
        }
        let (base, at) = self.locate(offset, WORD);
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.blocks[&base][at..][..8]);
        u64::from_le_bytes(word)
    }

    fn store_u8(&mut self, offset: u64, value: u8) {
        self.accesses.push(Access::StoreU8(offset));
        let (base, at) = self.locate(offset, 1);
        if let Some(block) = self.blocks.get_mut(&base) {
            block[at] = value;
        }
    }

    fn store_u64(&mut self, offset: u64, value: u64) {
        self.accesses.push(Access::StoreU64(offset));
        if !offset.is_multiple_of(WORD) {
            fault(&format!("misaligned word store at {offset}"));
        }
        let (base, at) = self.locate(offset, WORD);
        if let Some(block) = self.blocks.get_mut(&base) {
            block[at..][..8].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn input_load_u8(&mut self, index: u64) -> u8 {
        self.accesses.push(Access::InputU8(index));
        *self
            .input
            .get(to_index(index))
            .unwrap_or_else(|| fault(&format!("input index {index} out of range")))
    }

    fn input_load_u64(&mut self, index: u64) -> u64 {
        self.accesses.push(Access::InputU64(index));
        let start = to_index(index);
        let word = start
            .checked_add(8)
            .and_then(|end| self.input.get(start..end))
            .unwrap_or_else(|| fault(&format!("input word at {index} out of range")));
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(word);
        u64::from_le_bytes(bytes)
    }

    fn output_set(&mut self, offset: u64, length: u64) {
        if length == 0 {
            self.output = Some(Vec::new());
            return;
        }
        let (base, at) = self.locate(offset, length);
        let end = at
            .checked_add(to_index(length))
            .unwrap_or_else(|| fault("output overflows"));
        self.output = Some(self.blocks[&base][at..end].to_vec());
    }

    /// Offset 0 clears a previously staged error, as Extism hosts do.
    fn error_set(&mut self, offset: u64) {
        if offset == 0 {
            self.error = None;
            return;
        }
        self.error = Some(self.read_string(offset));
    }

    fn config_get(&mut self, key: u64) -> u64 {
        let key = self.read_string(key);
        match self.config.get(&key).cloned() {
            Some(value) => self.allocate_with(value.as_bytes()),
            None => 0,
        }
    }

    fn var_get(&mut self, key: u64) -> u64 {
        let key = self.read_string(key);
        match self.vars.get(&key).cloned() {
            Some(value) => self.allocate_with(&value),
            None => 0,
        }
    }

    fn var_set(&mut self, key: u64, value: u64) {
        let key = self.read_string(key);
        if value == 0 {
            self.vars.remove(&key);
        } else {
            let value = self.read_block(value);
            self.vars.insert(key, value);
        }
    }

    fn log(&mut self, level: Level, offset: u64) {
        let message = self.read_string(offset);
        if (level as i32) >= self.log_level {
            self.logs.push(LogRecord { level, message });
        }
    }

    fn http_request(&mut self, request: u64, body: u64) -> u64 {
        let meta = self.read_block(request);
        let mut call: HttpCall = serde_json::from_slice(&meta)
            .unwrap_or_else(|e| fault(&format!("malformed http request metadata: {e}")));
        if body != 0 {
            call.body = Some(self.read_block(body));
        }

        let mut responder = self.responder.take();
        let reply = match responder.as_mut() {
            Some(respond) => respond(&call),
            None => HttpReply::status(404),
        };
        self.responder = responder;
        self.http_calls.push(call);

        self.last_status = reply.status;
        self.last_headers = reply.headers;
        if reply.body.is_empty() {
            0
        } else {
            self.allocate_with(&reply.body)
        }
    }

    fn http_headers(&mut self) -> u64 {
        match self.last_headers.clone() {
            Some(headers) => {
                let json = serde_json::to_vec(&headers)
                    .unwrap_or_else(|e| fault(&format!("header encoding failed: {e}")));
                self.allocate_with(&json)
            }
            None => 0,
        }
    }
}

/// The `extism:host/env` surface, backed by this thread's [`SimHost`].
///
/// Signatures match the wasm imports exactly, `unsafe` included, so callers
/// compile unchanged on both targets.
#[allow(clippy::missing_safety_doc)]
pub mod abi {
    use super::{Level, with_host};

    pub unsafe fn alloc(length: u64) -> u64 {
        with_host(|h| h.alloc(length))
    }

    pub unsafe fn free(offset: u64) {
        with_host(|h| h.free(offset));
    }

    pub unsafe fn length(offset: u64) -> u64 {
        with_host(|h| h.length(offset))
    }

    pub unsafe fn length_unsafe(offset: u64) -> u64 {
        with_host(|h| h.length(offset))
    }

    pub unsafe fn load_u8(offset: u64) -> u8 {
        with_host(|h| h.load_u8(offset))
    }

    pub unsafe fn load_u64(offset: u64) -> u64 {
        with_host(|h| h.load_u64(offset))
    }

    pub unsafe fn store_u8(offset: u64, value: u8) {
        with_host(|h| h.store_u8(offset, value));
    }

    pub unsafe fn store_u64(offset: u64, value: u64) {
        with_host(|h| h.store_u64(offset, value));
    }

    pub unsafe fn input_length() -> u64 {
        with_host(|h| h.input.len() as u64)
    }

    pub unsafe fn input_load_u8(index: u64) -> u8 {
        with_host(|h| h.input_load_u8(index))
    }

    pub unsafe fn input_load_u64(index: u64) -> u64 {
        with_host(|h| h.input_load_u64(index))
    }

    pub unsafe fn output_set(offset: u64, length: u64) {
        with_host(|h| h.output_set(offset, length));
    }

    pub unsafe fn error_set(offset: u64) {
        with_host(|h| h.error_set(offset));
    }

    pub unsafe fn config_get(key: u64) -> u64 {
        with_host(|h| h.config_get(key))
    }

    pub unsafe fn var_get(key: u64) -> u64 {
        with_host(|h| h.var_get(key))
    }

    pub unsafe fn var_set(key: u64, value: u64) {
        with_host(|h| h.var_set(key, value));
    }

    pub unsafe fn log_trace(offset: u64) {
        with_host(|h| h.log(Level::Trace, offset));
    }

    pub unsafe fn log_debug(offset: u64) {
        with_host(|h| h.log(Level::Debug, offset));
    }

    pub unsafe fn log_info(offset: u64) {
        with_host(|h| h.log(Level::Info, offset));
    }

    pub unsafe fn log_warn(offset: u64) {
        with_host(|h| h.log(Level::Warn, offset));
    }

    pub unsafe fn log_error(offset: u64) {
        with_host(|h| h.log(Level::Error, offset));
    }

    pub unsafe fn get_log_level() -> i32 {
        with_host(|h| h.log_level)
    }

    pub unsafe fn http_request(request: u64, body: u64) -> u64 {
        with_host(|h| h.http_request(request, body))
    }

    pub unsafe fn http_status_code() -> i32 {
        with_host(|h| h.last_status)
    }

    pub unsafe fn http_headers() -> u64 {
        with_host(|h| h.http_headers())
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_distinct() {
        reset();
        let a = unsafe { abi::alloc(3) };
        let b = unsafe { abi::alloc(0) };
        let c = unsafe { abi::alloc(17) };
        assert_ne!(a, 0);
        assert!(a < b && b < c);
        for offset in [a, b, c] {
            assert_eq!(offset % 8, 0);
        }
        assert_eq!(unsafe { abi::length(c) }, 17);
        assert_eq!(unsafe { abi::length(b) }, 0);
    }

    #[test]
    fn freed_offsets_are_not_reused() {
        reset();
        let a = unsafe { abi::alloc(8) };
        unsafe { abi::free(a) };
        let b = unsafe { abi::alloc(8) };
        assert_ne!(a, b);
        assert_eq!(unsafe { abi::length(a) }, 0);
    }

    #[test]
    fn word_accesses_are_little_endian() {
        reset();
        let offset = unsafe { abi::alloc(8) };
        unsafe { abi::store_u64(offset, 0x0807_0605_0403_0201) };
        assert_eq!(
            with_host(|h| h.block(offset).unwrap().to_vec()),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(unsafe { abi::load_u8(offset + 7) }, 8);
    }

    #[test]
    #[should_panic(expected = "runs past block")]
    fn out_of_range_access_faults() {
        reset();
        let offset = unsafe { abi::alloc(4) };
        unsafe { abi::load_u8(offset + 4) };
    }

    #[test]
    #[should_panic(expected = "misaligned")]
    fn misaligned_word_faults() {
        reset();
        let offset = unsafe { abi::alloc(16) };
        unsafe { abi::load_u64(offset + 1) };
    }

    #[test]
    #[should_panic(expected = "free of unknown block")]
    fn double_free_faults() {
        reset();
        let offset = unsafe { abi::alloc(4) };
        unsafe { abi::free(offset) };
        unsafe { abi::free(offset) };
    }

    #[test]
    fn vars_survive_new_call() {
        reset();
        let key = with_host(|h| h.allocate_with(b"k"));
        let value = with_host(|h| h.allocate_with(b"v"));
        unsafe { abi::var_set(key, value) };
        with_host(SimHost::new_call);
        assert_eq!(with_host(|h| h.var("k").map(<[u8]>::to_vec)), Some(b"v".to_vec()));
        assert_eq!(with_host(|h| h.live_blocks()), 0);
    }

    #[test]
    fn log_sink_filters_below_level() {
        reset();
        with_host(|h| h.set_log_level(Level::Warn as i32));
        let msg = with_host(|h| h.allocate_with(b"hello"));
        unsafe { abi::log_info(msg) };
        unsafe { abi::log_error(msg) };
        let logs = with_host(|h| h.logs().to_vec());
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, Level::Error);
    }

    #[test]
    fn http_without_responder_is_not_found() {
        reset();
        let meta =
            with_host(|h| h.allocate_with(br#"{"url":"https://x","method":"GET","headers":{}}"#));
        let body = unsafe { abi::http_request(meta, 0) };
        assert_eq!(body, 0);
        assert_eq!(unsafe { abi::http_status_code() }, 404);
        assert_eq!(unsafe { abi::http_headers() }, 0);
    }

    #[test]
    fn allocation_failure_can_be_deferred() {
        reset();
        with_host(|h| h.fail_alloc_after(2));
        assert_ne!(unsafe { abi::alloc(8) }, 0);
        assert_ne!(unsafe { abi::alloc(8) }, 0);
        assert_eq!(unsafe { abi::alloc(8) }, 0);
        assert_ne!(unsafe { abi::alloc(8) }, 0);
    }

    #[test]
    fn null_error_clears_the_staged_error() {
        reset();
        let msg = with_host(|h| h.allocate_with(b"boom"));
        unsafe { abi::error_set(msg) };
        assert_eq!(with_host(|h| h.error().map(str::to_owned)), Some("boom".into()));
        unsafe { abi::error_set(0) };
        assert_eq!(with_host(|h| h.error().map(str::to_owned)), None);
    }
}
