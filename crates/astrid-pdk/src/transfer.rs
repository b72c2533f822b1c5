//! Word-at-a-time byte transfer across the boundary.
//!
//! The host exposes no bulk copy, only byte and 8-byte word accessors. To move
//! `N` bytes we cross `N / 8` times with words (little-endian, whatever the
//! native order) and then `N % 8` times with single bytes for the tail.
//! Byte order is part of the wire contract with the host.

use astrid_pdk_sys as sys;

use crate::memory::HostAddress;

const WORD: usize = 8;

/// Something the guest can read bytes and words out of.
pub(crate) trait WordSource {
    fn load_u64(&self, index: u64) -> u64;
    fn load_u8(&self, index: u64) -> u8;
}

/// Something the guest can write bytes and words into.
pub(crate) trait WordSink {
    fn store_u64(&self, index: u64, value: u64);
    fn store_u8(&self, index: u64, value: u8);
}

/// A host memory block addressed relative to its offset.
pub(crate) struct HostRegion {
    base: HostAddress,
}

impl HostRegion {
    pub(crate) fn new(base: HostAddress) -> Self {
        Self { base }
    }
}

impl WordSource for HostRegion {
    fn load_u64(&self, index: u64) -> u64 {
        unsafe { sys::load_u64(self.base.at(index)) }
    }

    fn load_u8(&self, index: u64) -> u8 {
        unsafe { sys::load_u8(self.base.at(index)) }
    }
}

impl WordSink for HostRegion {
    fn store_u64(&self, index: u64, value: u64) {
        unsafe { sys::store_u64(self.base.at(index), value) }
    }

    fn store_u8(&self, index: u64, value: u8) {
        unsafe { sys::store_u8(self.base.at(index), value) }
    }
}

/// The host-managed call input. There is no handle for it and nothing to free.
pub(crate) struct InputStream;

impl InputStream {
    pub(crate) fn len() -> u64 {
        unsafe { sys::input_length() }
    }
}

impl WordSource for InputStream {
    fn load_u64(&self, index: u64) -> u64 {
        unsafe { sys::input_load_u64(index) }
    }

    fn load_u8(&self, index: u64) -> u8 {
        unsafe { sys::input_load_u8(index) }
    }
}

/// Fill `buffer` from `source`, words first, then the tail.
pub(crate) fn read_into(source: &impl WordSource, buffer: &mut [u8]) {
    let mut chunks = buffer.chunks_exact_mut(WORD);
    let mut index = 0u64;
    for chunk in &mut chunks {
        chunk.copy_from_slice(&source.load_u64(index).to_le_bytes());
        index += WORD as u64;
    }
    for byte in chunks.into_remainder() {
        *byte = source.load_u8(index);
        index += 1;
    }
}

/// Write `data` into `sink`, words first, then the tail.
pub(crate) fn write_from(sink: &impl WordSink, data: &[u8]) {
    let mut chunks = data.chunks_exact(WORD);
    let mut index = 0u64;
    for chunk in &mut chunks {
        let mut word = [0u8; WORD];
        word.copy_from_slice(chunk);
        sink.store_u64(index, u64::from_le_bytes(word));
        index += WORD as u64;
    }
    for &byte in chunks.remainder() {
        sink.store_u8(index, byte);
        index += 1;
    }
}
