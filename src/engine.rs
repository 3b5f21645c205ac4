//! Per-block authenticated encryption using NaCl secretbox (XSalsa20Poly1305)
//!
//! Every block of a file is sealed under the same derived key with its own
//! 24-byte nonce: a 20-byte per-file random prefix followed by the 32-bit
//! block counter. The counter bytes are laid out in the byte order recorded
//! in the file header, so a file written on a big-endian host decrypts on a
//! little-endian host and vice versa.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{ErrorCategory, ErrorKind, Result, WuffcryptError};
use crate::kdf;
use crate::secret::SecretBuffer;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// Length of the full XSalsa20 nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the random, per-file part of the nonce
pub const NONCE_PREFIX_LEN: usize = NONCE_LEN - size_of::<u32>();

/// Poly1305 tag bytes added to every sealed block
pub const TAG_OVERHEAD: usize = 16;

pub type NoncePrefix = [u8; NONCE_PREFIX_LEN];

/// Byte order used to lay out the block counter inside the nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// The byte order of the host this code runs on.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    pub fn encode_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

fn block_nonce(prefix: &NoncePrefix, counter: u32, byte_order: ByteOrder) -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&byte_order.encode_u32(counter));
    Nonce::from(nonce)
}

/// Derives the key and keys a cipher with it. The derived buffer is wiped
/// on return; the cipher holds the only remaining copy and wipes it on drop.
fn keyed_cipher(password: &SecretBuffer, work_factor: u8) -> Result<XSalsa20Poly1305> {
    let key = kdf::derive(password, work_factor, KEY_LEN)?;
    XSalsa20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| WuffcryptError::fatal("derived key has the wrong length"))
}

/// Seals plaintext blocks for one file.
pub struct Encrypter {
    cipher: XSalsa20Poly1305,
    nonce_prefix: NoncePrefix,
    work_factor: u8,
    byte_order: ByteOrder,
}

impl Encrypter {
    /// Derives the key from `password` and draws a fresh random nonce prefix.
    /// Counters are encoded in the host's native byte order.
    pub fn new(password: &SecretBuffer, work_factor: u8) -> Result<Self> {
        Self::with_byte_order(password, work_factor, ByteOrder::native())
    }

    /// Like [`Encrypter::new`] but encoding counters in `byte_order`.
    pub fn with_byte_order(
        password: &SecretBuffer,
        work_factor: u8,
        byte_order: ByteOrder,
    ) -> Result<Self> {
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        OsRng.fill_bytes(&mut nonce_prefix);

        Self::with_parameters(password, work_factor, nonce_prefix, byte_order)
    }

    /// Builds an encrypter around a caller-chosen nonce prefix.
    ///
    /// This is ONLY for generating deterministic output in tests. The prefix
    /// MUST be fresh for every file encrypted under the same password and
    /// work factor; reusing one repeats nonces under the same key.
    pub fn with_parameters(
        password: &SecretBuffer,
        work_factor: u8,
        nonce_prefix: NoncePrefix,
        byte_order: ByteOrder,
    ) -> Result<Self> {
        Ok(Self {
            cipher: keyed_cipher(password, work_factor)?,
            nonce_prefix,
            work_factor,
            byte_order,
        })
    }

    /// Seals `block` as block number `counter`. The result is
    /// `block.len() + TAG_OVERHEAD` bytes long.
    pub fn encrypt(&self, block: &[u8], counter: u32) -> Result<Vec<u8>> {
        let nonce = block_nonce(&self.nonce_prefix, counter, self.byte_order);
        let sealed = self
            .cipher
            .encrypt(&nonce, block)
            .map_err(|e| WuffcryptError::fatal(format!("encryption failed: {}", e)))?;

        if sealed.len() != block.len() + TAG_OVERHEAD {
            return Err(WuffcryptError::fatal(format!(
                "sealed block has unexpected length {} for {} plaintext bytes",
                sealed.len(),
                block.len()
            )));
        }

        Ok(sealed)
    }

    pub fn nonce_prefix(&self) -> &NoncePrefix {
        &self.nonce_prefix
    }

    pub fn work_factor(&self) -> u8 {
        self.work_factor
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

/// Opens sealed blocks of one file.
pub struct Decrypter {
    cipher: XSalsa20Poly1305,
    nonce_prefix: NoncePrefix,
    byte_order: ByteOrder,
}

impl Decrypter {
    /// Derives the key from `password` and `work_factor` as stored in the
    /// header, and reuses the header's nonce prefix and byte order.
    pub fn new(
        password: &SecretBuffer,
        nonce_prefix: NoncePrefix,
        work_factor: u8,
        byte_order: ByteOrder,
    ) -> Result<Self> {
        Ok(Self {
            cipher: keyed_cipher(password, work_factor)?,
            nonce_prefix,
            byte_order,
        })
    }

    /// Verifies and opens block number `counter`.
    ///
    /// Either the whole plaintext is returned or nothing is: on
    /// authentication failure no plaintext bytes leave this function.
    pub fn decrypt(&self, ciphertext: &[u8], counter: u32) -> Result<Vec<u8>> {
        let nonce = block_nonce(&self.nonce_prefix, counter, self.byte_order);
        self.cipher.decrypt(&nonce, ciphertext).map_err(|_| {
            WuffcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::VerificationFailed,
                "corrupt input, tampered-with data, or bad password",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK_FACTOR: u8 = 4;

    fn password(s: &str) -> SecretBuffer {
        SecretBuffer::from_consumed_string(s.to_string())
    }

    #[test]
    fn test_native_byte_order() {
        let expected = if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        };
        assert_eq!(ByteOrder::native(), expected);
        assert_eq!(
            ByteOrder::native().encode_u32(0x0102_0304),
            0x0102_0304u32.to_ne_bytes()
        );
    }

    #[test]
    fn test_counter_layout_in_nonce() {
        let prefix = [0xaau8; NONCE_PREFIX_LEN];

        let le = block_nonce(&prefix, 1, ByteOrder::LittleEndian);
        assert_eq!(&le[..NONCE_PREFIX_LEN], &prefix[..]);
        assert_eq!(&le[NONCE_PREFIX_LEN..], &[1, 0, 0, 0]);

        let be = block_nonce(&prefix, 1, ByteOrder::BigEndian);
        assert_eq!(&be[NONCE_PREFIX_LEN..], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_roundtrip() {
        let enc = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let sealed = enc.encrypt(b"hello", 0).unwrap();
        assert_eq!(sealed.len(), 5 + TAG_OVERHEAD);

        let dec = Decrypter::new(
            &password("abc"),
            *enc.nonce_prefix(),
            WORK_FACTOR,
            enc.byte_order(),
        )
        .unwrap();
        assert_eq!(dec.decrypt(&sealed, 0).unwrap(), b"hello");
    }

    #[test]
    fn test_empty_block() {
        let enc = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let sealed = enc.encrypt(b"", 0).unwrap();
        assert_eq!(sealed.len(), TAG_OVERHEAD);

        let dec = Decrypter::new(
            &password("abc"),
            *enc.nonce_prefix(),
            WORK_FACTOR,
            enc.byte_order(),
        )
        .unwrap();
        assert!(dec.decrypt(&sealed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_counter_fails() {
        let enc = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let sealed = enc.encrypt(b"block", 7).unwrap();

        let dec = Decrypter::new(
            &password("abc"),
            *enc.nonce_prefix(),
            WORK_FACTOR,
            enc.byte_order(),
        )
        .unwrap();
        let err = dec.decrypt(&sealed, 8).expect_err("expected verification failure");
        assert_eq!(err.kind, Some(ErrorKind::VerificationFailed));
    }

    #[test]
    fn test_wrong_byte_order_fails() {
        let prefix = [3u8; NONCE_PREFIX_LEN];
        let enc = Encrypter::with_parameters(
            &password("abc"),
            WORK_FACTOR,
            prefix,
            ByteOrder::BigEndian,
        )
        .unwrap();
        let sealed = enc.encrypt(b"block", 1).unwrap();

        let dec = Decrypter::new(&password("abc"), prefix, WORK_FACTOR, ByteOrder::LittleEndian)
            .unwrap();
        let err = dec.decrypt(&sealed, 1).expect_err("expected verification failure");
        assert_eq!(err.kind, Some(ErrorKind::VerificationFailed));

        let dec =
            Decrypter::new(&password("abc"), prefix, WORK_FACTOR, ByteOrder::BigEndian).unwrap();
        assert_eq!(dec.decrypt(&sealed, 1).unwrap(), b"block");
    }

    #[test]
    fn test_wrong_password_fails() {
        let enc = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let sealed = enc.encrypt(b"secret data", 0).unwrap();

        let dec = Decrypter::new(
            &password("xyz"),
            *enc.nonce_prefix(),
            WORK_FACTOR,
            enc.byte_order(),
        )
        .unwrap();
        let err = dec.decrypt(&sealed, 0).expect_err("expected verification failure");
        assert_eq!(err.kind, Some(ErrorKind::VerificationFailed));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let enc = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let sealed = enc.encrypt(b"", 0).unwrap();

        let dec = Decrypter::new(
            &password("abc"),
            *enc.nonce_prefix(),
            WORK_FACTOR,
            enc.byte_order(),
        )
        .unwrap();
        for len in 0..sealed.len() {
            let err = dec
                .decrypt(&sealed[..len], 0)
                .expect_err("expected verification failure");
            assert_eq!(err.kind, Some(ErrorKind::VerificationFailed));
        }
    }

    #[test]
    fn test_fresh_nonce_prefix_per_encrypter() {
        let e1 = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let e2 = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        assert_ne!(e1.nonce_prefix(), e2.nonce_prefix());
    }

    #[test]
    fn test_deterministic_with_fixed_prefix() {
        let prefix = [0x24u8; NONCE_PREFIX_LEN];
        let e1 = Encrypter::with_parameters(
            &password("abc"),
            WORK_FACTOR,
            prefix,
            ByteOrder::LittleEndian,
        )
        .unwrap();
        let e2 = Encrypter::with_parameters(
            &password("abc"),
            WORK_FACTOR,
            prefix,
            ByteOrder::LittleEndian,
        )
        .unwrap();

        assert_eq!(e1.encrypt(b"same", 3).unwrap(), e2.encrypt(b"same", 3).unwrap());
        assert_ne!(e1.encrypt(b"same", 3).unwrap(), e1.encrypt(b"same", 4).unwrap());
    }

    #[test]
    fn test_one_keyed_engine_handles_many_blocks() {
        let enc = Encrypter::new(&password("abc"), WORK_FACTOR).unwrap();
        let dec = Decrypter::new(
            &password("abc"),
            *enc.nonce_prefix(),
            WORK_FACTOR,
            enc.byte_order(),
        )
        .unwrap();

        for counter in 0..64u32 {
            let block = counter.to_le_bytes().repeat(counter as usize);
            let sealed = enc.encrypt(&block, counter).unwrap();
            assert_eq!(sealed, enc.encrypt(&block, counter).unwrap());
            assert_eq!(dec.decrypt(&sealed, counter).unwrap(), block);
        }
    }

    #[test]
    fn test_key_derivation_failure_surfaces_at_construction() {
        let err = Encrypter::new(&password("abc"), 0)
            .err()
            .expect("expected derivation failure");
        assert_eq!(err.kind, Some(ErrorKind::FatalInternal));

        let err = Decrypter::new(&password("abc"), [0u8; NONCE_PREFIX_LEN], 40, ByteOrder::native())
            .err()
            .expect("expected derivation failure");
        assert_eq!(err.kind, Some(ErrorKind::FatalInternal));
    }
}
