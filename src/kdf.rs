//! Password-based key derivation using scrypt
//!
//! Keys are derived with no salt, so the same password and work factor
//! always yield the same key. Decryption depends on this: everything needed
//! to rebuild the key is the password plus the work factor from the header.

use std::ops::RangeInclusive;

use scrypt::{Params, scrypt};

use crate::error::{Result, WuffcryptError};
use crate::secret::SecretBuffer;

/// scrypt r parameter (block size)
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization)
const SCRYPT_P: u32 = 1;

/// Work factors this build will derive keys for. scrypt needs
/// 128 * r * 2^wf bytes, so the ceiling of 22 is 4 GiB. N = 1 is rejected.
pub const WORK_FACTOR_RANGE: RangeInclusive<u8> = 1..=22;

/// Derive `out_len` key bytes from `password` with scrypt at N = 2^`work_factor`.
///
/// A failure here means no valid key exists for the request. It is reported
/// as a fatal internal error and no key material is returned.
pub fn derive(password: &SecretBuffer, work_factor: u8, out_len: usize) -> Result<SecretBuffer> {
    if !WORK_FACTOR_RANGE.contains(&work_factor) {
        return Err(WuffcryptError::fatal(format!(
            "work factor {} outside supported range {}..={}",
            work_factor,
            WORK_FACTOR_RANGE.start(),
            WORK_FACTOR_RANGE.end()
        )));
    }

    let params = Params::new(work_factor, SCRYPT_R, SCRYPT_P, out_len).map_err(|e| {
        WuffcryptError::fatal(format!(
            "invalid scrypt parameters (work factor {}, key length {}): {}",
            work_factor, out_len, e
        ))
    })?;

    tracing::debug!(work_factor, out_len, "deriving key");

    let mut key = SecretBuffer::allocate(out_len);
    scrypt(password.as_bytes(), &[], &params, key.as_bytes_mut())
        .map_err(|e| WuffcryptError::fatal(format!("scrypt key derivation failed: {}", e)))?;

    Ok(key)
}
