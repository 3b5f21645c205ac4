//! Owned storage for passwords and derived keys
//!
//! A [`SecretBuffer`] exclusively owns its bytes. It cannot be cloned, every
//! transfer is an explicit move, and the bytes are overwritten with zeros
//! before the memory is released. On Unix the backing pages are locked
//! against being swapped out for as long as the buffer holds them.
//!
//! Page locks are not reference counted by the kernel, so every non-empty
//! buffer gets whole pages of its own: the secret starts on a page boundary
//! inside a slightly larger allocation and nothing else lives on the pages
//! that get locked. Unlocking one buffer can therefore never expose another.

use std::fmt;
use std::mem;

use zeroize::Zeroize;

pub struct SecretBuffer {
    storage: Box<[u8]>,
    offset: usize,
    len: usize,
    /// Bytes locked starting at `offset`, zero when nothing is locked.
    locked_len: usize,
}

impl SecretBuffer {
    /// An empty buffer holding no secret.
    pub fn new() -> Self {
        Self {
            storage: Box::default(),
            offset: 0,
            len: 0,
            locked_len: 0,
        }
    }

    /// Allocates `len` zero bytes, typically as the target of a key derivation.
    pub fn allocate(len: usize) -> Self {
        if len == 0 {
            return Self::new();
        }

        let page = page_size();
        let span = len.div_ceil(page) * page;
        // One spare page leaves room to start on a page boundary.
        let storage = vec![0u8; span + page].into_boxed_slice();
        let offset = match storage.as_ptr().align_offset(page) {
            o if o < page => o,
            _ => 0,
        };
        let locked_len = if lock_pages(&storage[offset..offset + span]) {
            span
        } else {
            0
        };

        Self {
            storage,
            offset,
            len,
            locked_len,
        }
    }

    /// Copies `source` into a fresh buffer and zeroes `source` before returning.
    pub fn from_consumed_bytes(source: &mut [u8]) -> Self {
        let mut buf = Self::allocate(source.len());
        buf.as_bytes_mut().copy_from_slice(source);
        source.zeroize();
        buf
    }

    /// Takes a string (such as a password from the command line), copies its
    /// bytes into a fresh buffer and wipes the string's own allocation.
    pub fn from_consumed_string(source: String) -> Self {
        let mut bytes = source.into_bytes();
        let buf = Self::from_consumed_bytes(&mut bytes);
        bytes.zeroize();
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }

    /// Transfers this buffer's contents into `other`.
    ///
    /// Whatever `other` held is wiped first. Afterwards `self` is empty.
    pub fn move_into(&mut self, other: &mut SecretBuffer) {
        other.release();
        other.storage = mem::take(&mut self.storage);
        other.offset = mem::replace(&mut self.offset, 0);
        other.len = mem::replace(&mut self.len, 0);
        other.locked_len = mem::replace(&mut self.locked_len, 0);
    }

    fn release(&mut self) {
        self.storage[..].zeroize();
        if self.locked_len > 0 {
            unlock_pages(&self.storage[self.offset..self.offset + self.locked_len]);
        }
        self.storage = Box::default();
        self.offset = 0;
        self.len = 0;
        self.locked_len = 0;
    }
}

impl Default for SecretBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.len)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn page_size() -> usize {
    // SAFETY: sysconf only reads a system constant.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|&s| s > 0).unwrap_or(4096)
}

#[cfg(not(unix))]
fn page_size() -> usize {
    1
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn lock_pages(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    // SAFETY: the range is a live heap allocation owned by the caller, and
    // mlock neither reads nor writes through the pointer.
    let rc = unsafe { libc::mlock(bytes.as_ptr().cast(), bytes.len()) };
    if rc != 0 {
        tracing::debug!(
            len = bytes.len(),
            error = %std::io::Error::last_os_error(),
            "could not lock secret memory; it may be written to swap"
        );
        return false;
    }
    true
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn unlock_pages(bytes: &[u8]) {
    // SAFETY: same range that was passed to mlock in lock_pages.
    unsafe {
        libc::munlock(bytes.as_ptr().cast(), bytes.len());
    }
}

#[cfg(not(unix))]
fn lock_pages(_bytes: &[u8]) -> bool {
    false
}

#[cfg(not(unix))]
fn unlock_pages(_bytes: &[u8]) {}
