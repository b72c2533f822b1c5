//! Host memory handles.
//!
//! A [`Memory`] names a block the host owns. The guest cannot dereference it;
//! every read and write is a boundary crossing through the transfer codec.
//! Handles are plain values with no destructor: a block allocated by the
//! guest must either be handed to the host (as output, error, var value or
//! HTTP request) or released with [`Memory::free`], never both.

use std::str::FromStr;

use astrid_pdk_sys as sys;

use crate::transfer::{self, HostRegion};
use crate::{PdkError, PdkResult};

/// Opaque offset of a block in host memory.
///
/// No arithmetic is exposed outside the crate, so guest code can only hold
/// offsets the host actually handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostAddress(u64);

impl HostAddress {
    /// The "no block" sentinel.
    pub const NULL: Self = Self(0);

    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value passed across the boundary.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) const fn at(self, index: u64) -> u64 {
        self.0.wrapping_add(index)
    }
}

/// A block of host memory: offset plus fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory {
    offset: HostAddress,
    length: u64,
}

impl Memory {
    /// The absent handle.
    pub const NULL: Self = Self {
        offset: HostAddress::NULL,
        length: 0,
    };

    /// Allocate `length` uninitialized bytes on the host.
    ///
    /// A zero length yields [`Memory::NULL`] without crossing the boundary.
    ///
    /// # Errors
    /// [`PdkError::AllocationFailed`] if the host returns offset 0.
    pub fn new(length: u64) -> PdkResult<Self> {
        if length == 0 {
            return Ok(Self::NULL);
        }
        let offset = unsafe { sys::alloc(length) };
        if offset == 0 {
            return Err(PdkError::AllocationFailed { length });
        }
        Ok(Self {
            offset: HostAddress(offset),
            length,
        })
    }

    /// Allocate a block and copy `data` into it.
    ///
    /// # Errors
    /// [`PdkError::AllocationFailed`] if the host cannot allocate the block.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> PdkResult<Self> {
        let data = data.as_ref();
        let memory = Self::new(data.len() as u64)?;
        memory.store(data)?;
        Ok(memory)
    }

    /// Re-wrap a bare offset returned by the host, asking the host for its length.
    ///
    /// Returns `None` for offset 0 or when the host reports a zero length.
    #[must_use]
    pub fn find(offset: HostAddress) -> Option<Self> {
        if offset.is_null() {
            return None;
        }
        let length = unsafe { sys::length(offset.raw()) };
        (length > 0).then_some(Self { offset, length })
    }

    /// Like [`Memory::find`] for offsets the host has just returned, skipping
    /// host-side validation of the offset.
    pub(crate) fn find_unchecked(offset: HostAddress) -> Option<Self> {
        if offset.is_null() {
            return None;
        }
        let length = unsafe { sys::length_unsafe(offset.raw()) };
        (length > 0).then_some(Self { offset, length })
    }

    #[must_use]
    pub const fn offset(&self) -> HostAddress {
        self.offset
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.length
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether this is the absent sentinel.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.offset.is_null()
    }

    /// Copy the block into `buffer`, which must be exactly [`Memory::len`] bytes.
    ///
    /// # Errors
    /// [`PdkError::LengthMismatch`] if the buffer has the wrong size.
    pub fn load(&self, buffer: &mut [u8]) -> PdkResult<()> {
        self.check_len(buffer.len())?;
        transfer::read_into(&HostRegion::new(self.offset), buffer);
        Ok(())
    }

    /// Copy `data`, which must be exactly [`Memory::len`] bytes, into the block.
    ///
    /// # Errors
    /// [`PdkError::LengthMismatch`] if `data` has the wrong size.
    pub fn store(&self, data: impl AsRef<[u8]>) -> PdkResult<()> {
        let data = data.as_ref();
        self.check_len(data.len())?;
        transfer::write_from(&HostRegion::new(self.offset), data);
        Ok(())
    }

    /// Read the whole block into a new buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buffer = vec![0; self.local_len()];
        transfer::read_into(&HostRegion::new(self.offset), &mut buffer);
        buffer
    }

    /// Read the whole block as UTF-8.
    ///
    /// # Errors
    /// [`PdkError::Utf8`] if the block is not valid UTF-8.
    pub fn to_string(&self) -> PdkResult<String> {
        Ok(String::from_utf8(self.to_vec())?)
    }

    /// Release the block. The handle is consumed; the host must not see the
    /// offset again.
    pub fn free(self) {
        if !self.offset.is_null() {
            unsafe { sys::free(self.offset.raw()) };
        }
    }

    fn local_len(&self) -> usize {
        // A block larger than the guest address space could never be loaded anyway.
        usize::try_from(self.length).unwrap_or(usize::MAX)
    }

    fn check_len(&self, actual: usize) -> PdkResult<()> {
        let actual = actual as u64;
        if actual == self.length {
            Ok(())
        } else {
            Err(PdkError::LengthMismatch {
                expected: self.length,
                actual,
            })
        }
    }
}

/// `"text".parse::<Memory>()` allocates a block holding the UTF-8 bytes.
impl FromStr for Memory {
    type Err = PdkError;

    fn from_str(s: &str) -> PdkResult<Self> {
        Self::from_bytes(s)
    }
}

/// Copy a block the host just returned into guest memory and free it.
///
/// Offset 0 means absent. A live block of length 0 is a present, empty value.
pub(crate) fn take_host_block(offset: HostAddress) -> Option<Vec<u8>> {
    if offset.is_null() {
        return None;
    }
    let length = unsafe { sys::length(offset.raw()) };
    let memory = Memory { offset, length };
    let data = memory.to_vec();
    memory.free();
    Some(data)
}

/// Write `key` into a temporary block, run `f` with its offset, then free it.
///
/// The host copies keys, so the block is never needed after the call.
pub(crate) fn with_key<R>(key: &str, f: impl FnOnce(u64) -> R) -> PdkResult<R> {
    let key = Memory::from_bytes(key)?;
    let result = f(key.offset().raw());
    key.free();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_pdk_sys::sim;

    #[test]
    fn from_bytes_round_trips_through_the_host() {
        sim::reset();
        let mem = Memory::from_bytes(b"hello, host!").unwrap();
        assert_eq!(mem.len(), 12);
        assert_eq!(mem.to_vec(), b"hello, host!");
        assert_eq!(
            sim::with_host(|h| h.block(mem.offset().raw()).map(<[u8]>::to_vec)),
            Some(b"hello, host!".to_vec())
        );
    }

    #[test]
    fn zero_length_allocation_is_null_and_free() {
        sim::reset();
        let mem = Memory::new(0).unwrap();
        assert!(mem.is_null());
        assert!(mem.is_empty());
        assert_eq!(mem.to_vec(), Vec::<u8>::new());
        mem.free();
        assert_eq!(sim::with_host(|h| h.live_blocks()), 0);
    }

    #[test]
    fn allocation_failure_is_reported() {
        sim::reset();
        sim::with_host(sim::SimHost::fail_next_alloc);
        let err = Memory::new(16).unwrap_err();
        assert!(matches!(err, PdkError::AllocationFailed { length: 16 }));
    }

    #[test]
    fn load_rejects_wrong_buffer_size() {
        sim::reset();
        let mem = Memory::from_bytes([1, 2, 3]).unwrap();
        let mut short = [0u8; 2];
        assert!(matches!(
            mem.load(&mut short),
            Err(PdkError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(mem.store([9u8; 4]).is_err());

        let mut exact = [0u8; 3];
        mem.load(&mut exact).unwrap();
        assert_eq!(exact, [1, 2, 3]);
    }

    #[test]
    fn find_recovers_length_from_the_host() {
        sim::reset();
        let raw = sim::with_host(|h| h.allocate_with(b"from host"));
        let mem = Memory::find(HostAddress::from_raw(raw)).unwrap();
        assert_eq!(mem.len(), 9);
        assert_eq!(mem.to_string().unwrap(), "from host");
    }

    #[test]
    fn find_treats_null_and_empty_as_absent() {
        sim::reset();
        assert!(Memory::find(HostAddress::NULL).is_none());
        let empty = sim::with_host(|h| h.allocate_with(b""));
        assert!(Memory::find(HostAddress::from_raw(empty)).is_none());
    }

    #[test]
    fn free_releases_the_block() {
        sim::reset();
        let mem = Memory::from_bytes(b"bye").unwrap();
        assert_eq!(sim::with_host(|h| h.live_blocks()), 1);
        mem.free();
        assert_eq!(sim::with_host(|h| h.live_blocks()), 0);
    }

    #[test]
    fn live_handles_never_alias() {
        sim::reset();
        let handles: Vec<Memory> = (1..=32u64).map(|n| Memory::new(n).unwrap()).collect();
        let mut offsets: Vec<u64> = handles.iter().map(|m| m.offset().raw()).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), handles.len());
        for pair in handles.windows(2) {
            let end = pair[0].offset().raw() + pair[0].len();
            assert!(end <= pair[1].offset().raw());
        }
    }

    #[test]
    fn strings_parse_into_blocks() {
        sim::reset();
        let mem: Memory = "count_vowels".parse().unwrap();
        assert_eq!(mem.len(), 12);
        assert_eq!(mem.to_string().unwrap(), "count_vowels");
        assert!(Memory::from_str("").unwrap().is_null());
    }

    #[test]
    fn to_string_rejects_invalid_utf8() {
        sim::reset();
        let mem = Memory::from_bytes([0xff, 0xfe]).unwrap();
        assert!(matches!(mem.to_string(), Err(PdkError::Utf8(_))));
    }
}
