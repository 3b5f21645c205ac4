//! The wuffcrypt container format
//!
//! Layout:
//! - magic: 7 bytes, ASCII `wuffcry`
//! - byte-order marker: 2 bytes, `0x7470` in the writer's byte order
//!   (`pt` when written little-endian, `tp` when written big-endian)
//! - version: 1 byte
//! - work factor: 1 byte (log2 of scrypt N)
//! - nonce prefix: 20 bytes
//! - blocks: sealed blocks of up to `BLOCK_SIZE` plaintext bytes each,
//!   every one `TAG_OVERHEAD` bytes longer than its plaintext
//!
//! There is no length field. The first block holding fewer than
//! `BLOCK_SIZE` plaintext bytes is the last one, so every stream has at
//! least one block, even for empty input.

use std::io::{self, Read, Write};

use crate::engine::{ByteOrder, Decrypter, Encrypter, NONCE_PREFIX_LEN, NoncePrefix, TAG_OVERHEAD};
use crate::error::{ErrorCategory, ErrorKind, Result, WuffcryptError};
use crate::kdf::WORK_FACTOR_RANGE;
use crate::secret::SecretBuffer;

/// Magic prefix of every wuffcrypt file
pub const MAGIC: &[u8; 7] = b"wuffcry";

/// Written in the writer's byte order right after the magic
pub const BYTE_ORDER_MARKER: u16 = 0x7470;

/// The only format version this build reads and writes
pub const FORMAT_VERSION: u8 = 0;

/// Work factor used for new files unless configured otherwise
pub const DEFAULT_WORK_FACTOR: u8 = 17;

/// Maximum plaintext bytes per block
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Size of a full sealed block on disk
pub const ENCRYPTED_BLOCK_SIZE: usize = BLOCK_SIZE + TAG_OVERHEAD;

/// Total header length in bytes
pub const HEADER_LEN: usize = MAGIC.len() + 2 + 1 + 1 + NONCE_PREFIX_LEN;

/// Knobs for writing new files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    pub work_factor: u8,
    /// Byte order of the marker and of the block counters. Readers honor
    /// whatever is recorded, so this only matters for testing portability.
    pub byte_order: ByteOrder,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            work_factor: DEFAULT_WORK_FACTOR,
            byte_order: ByteOrder::native(),
        }
    }
}

/// Fixed-size header at the start of every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub byte_order: ByteOrder,
    pub version: u8,
    pub work_factor: u8,
    pub nonce_prefix: NoncePrefix,
}

impl FileHeader {
    pub fn write_to(&self, sink: &mut impl Write) -> Result<()> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&self.byte_order.encode_u16(BYTE_ORDER_MARKER));
        header.push(self.version);
        header.push(self.work_factor);
        header.extend_from_slice(&self.nonce_prefix);

        sink.write_all(&header)
            .map_err(|e| WuffcryptError::io("failed to write header", e))
    }

    /// Reads and parses a header. The version is returned as found; checking
    /// it against [`FORMAT_VERSION`] is up to the caller.
    pub fn read_from(source: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; MAGIC.len() + 2];
        let n = read_full(source, &mut magic)
            .map_err(|e| WuffcryptError::io("failed to read header", e))?;
        if n < magic.len() || &magic[..MAGIC.len()] != MAGIC {
            return Err(WuffcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidFileType,
                "input unrecognized as wuffcrypt data",
            ));
        }

        let marker = [magic[MAGIC.len()], magic[MAGIC.len() + 1]];
        let byte_order = if marker == ByteOrder::LittleEndian.encode_u16(BYTE_ORDER_MARKER) {
            ByteOrder::LittleEndian
        } else if marker == ByteOrder::BigEndian.encode_u16(BYTE_ORDER_MARKER) {
            ByteOrder::BigEndian
        } else {
            return Err(WuffcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidFileType,
                "input has an unknown byte-order marker",
            ));
        };

        let mut fields = [0u8; 2 + NONCE_PREFIX_LEN];
        let n = read_full(source, &mut fields)
            .map_err(|e| WuffcryptError::io("failed to read header", e))?;
        if n < fields.len() {
            return Err(WuffcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::CorruptHeader,
                "input likely truncated while reading header",
            ));
        }

        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        nonce_prefix.copy_from_slice(&fields[2..]);

        Ok(Self {
            byte_order,
            version: fields[0],
            work_factor: fields[1],
            nonce_prefix,
        })
    }
}

/// Encrypt everything `source` yields and write the container to `sink`.
pub fn write_container<R: Read, W: Write>(
    mut source: R,
    mut sink: W,
    password: &SecretBuffer,
    options: &EncryptOptions,
) -> Result<()> {
    let encrypter = Encrypter::with_byte_order(password, options.work_factor, options.byte_order)?;

    write_with(&mut source, &mut sink, &encrypter)
}

/// Like [`write_container`] but sealing with an already constructed [`Encrypter`].
pub fn write_with<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    encrypter: &Encrypter,
) -> Result<()> {
    let header = FileHeader {
        byte_order: encrypter.byte_order(),
        version: FORMAT_VERSION,
        work_factor: encrypter.work_factor(),
        nonce_prefix: *encrypter.nonce_prefix(),
    };
    header.write_to(sink)?;
    tracing::debug!(
        version = header.version,
        work_factor = header.work_factor,
        byte_order = ?header.byte_order,
        "wrote header"
    );

    let mut block = vec![0u8; BLOCK_SIZE];
    let mut counter: u32 = 0;
    let mut total: u64 = 0;
    loop {
        let n = read_full(source, &mut block)
            .map_err(|e| WuffcryptError::io("failed to read plaintext", e))?;

        let sealed = encrypter.encrypt(&block[..n], counter)?;
        sink.write_all(&sealed)
            .map_err(|e| WuffcryptError::io("failed to write block", e))?;
        tracing::trace!(counter, plaintext_len = n, "sealed block");
        total += n as u64;

        if n < BLOCK_SIZE {
            break;
        }
        counter = next_counter(counter)?;
    }

    sink.flush()
        .map_err(|e| WuffcryptError::io("failed to flush output", e))?;
    tracing::debug!(blocks = u64::from(counter) + 1, bytes = total, "encryption complete");

    Ok(())
}

/// Verify and decrypt a container from `source`, writing plaintext to `sink`.
///
/// Each block is authenticated before its plaintext reaches `sink`. A
/// failure anywhere aborts the whole stream; plaintext of earlier blocks
/// that was already written must not be trusted by the caller.
pub fn read_container<R: Read, W: Write>(
    mut source: R,
    mut sink: W,
    password: &SecretBuffer,
) -> Result<()> {
    let header = FileHeader::read_from(&mut source)?;
    if header.version != FORMAT_VERSION {
        return Err(WuffcryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::WrongVersion,
            format!(
                "file format version {} is not supported (expected {})",
                header.version, FORMAT_VERSION
            ),
        ));
    }
    // The work factor decides how much memory scrypt allocates, so it is
    // bounded before any key derivation starts.
    if !WORK_FACTOR_RANGE.contains(&header.work_factor) {
        return Err(WuffcryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::CorruptHeader,
            format!(
                "work factor {} in header is outside the supported range {}..={}",
                header.work_factor,
                WORK_FACTOR_RANGE.start(),
                WORK_FACTOR_RANGE.end()
            ),
        ));
    }
    tracing::debug!(
        work_factor = header.work_factor,
        byte_order = ?header.byte_order,
        "read header"
    );

    let decrypter = Decrypter::new(
        password,
        header.nonce_prefix,
        header.work_factor,
        header.byte_order,
    )?;

    let mut chunk = vec![0u8; ENCRYPTED_BLOCK_SIZE];
    let mut counter: u32 = 0;
    loop {
        let n = read_full(&mut source, &mut chunk)
            .map_err(|e| WuffcryptError::io("failed to read ciphertext", e))?;

        let plaintext = decrypter.decrypt(&chunk[..n], counter).inspect_err(|_| {
            tracing::warn!(counter, "block failed verification");
        })?;
        sink.write_all(&plaintext)
            .map_err(|e| WuffcryptError::io("failed to write plaintext", e))?;
        tracing::trace!(counter, plaintext_len = plaintext.len(), "opened block");

        if n < ENCRYPTED_BLOCK_SIZE {
            break;
        }
        counter = next_counter(counter)?;
    }

    sink.flush()
        .map_err(|e| WuffcryptError::io("failed to flush output", e))?;
    tracing::debug!(blocks = u64::from(counter) + 1, "decryption complete");

    Ok(())
}

fn next_counter(counter: u32) -> Result<u32> {
    counter
        .checked_add(1)
        .ok_or_else(|| WuffcryptError::fatal("block counter exhausted; input too large"))
}

/// Fill `buf` from `source` until it is full or the source is exhausted.
/// Returns the number of bytes read, which is only short at end of input.
fn read_full(source: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
