//! File encryption/decryption operations
//!
//! Opens the files on either side of the container codec. Output is written
//! to a temporary file next to the destination and only renamed into place
//! once the whole stream succeeded, so a failed decrypt never leaves
//! unverified plaintext at the destination path.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::container::{self, EncryptOptions};
use crate::error::{ErrorCategory, ErrorKind, Result, WuffcryptError};
use crate::secret::SecretBuffer;

/// Encrypt a file with a password
///
/// Reads plaintext from `input_path` and writes the wuffcrypt container to
/// `output_path`. The output file is created with mode 0o600 (read/write for
/// owner only) on Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    password: &SecretBuffer,
    options: &EncryptOptions,
) -> Result<()> {
    let input = open_input(input_path)?;
    let mut temp_file = create_temp_beside(output_path)?;

    container::write_container(input, temp_file.as_file_mut(), password, options)
        .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))?;

    persist_secure(temp_file, output_path)?;
    tracing::info!(
        input = %input_path.display(),
        output = %output_path.display(),
        "encrypted"
    );
    Ok(())
}

/// Decrypt a file with a password
///
/// Reads the wuffcrypt container at `input_path` and writes the plaintext to
/// `output_path`. Nothing is written to `output_path` unless every block
/// verified.
pub fn decrypt_file(input_path: &Path, output_path: &Path, password: &SecretBuffer) -> Result<()> {
    let input = open_input(input_path)?;
    let mut temp_file = create_temp_beside(output_path)?;

    container::read_container(input, temp_file.as_file_mut(), password)
        .map_err(|e| e.with_context(format!("failed to decrypt {}", input_path.display())))?;

    persist_secure(temp_file, output_path)?;
    tracing::info!(
        input = %input_path.display(),
        output = %output_path.display(),
        "decrypted"
    );
    Ok(())
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        let category = if e.kind() == io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        WuffcryptError::with_kind_and_source(
            category,
            ErrorKind::OpenError,
            format!("failed to open {}", path.display()),
            e,
        )
    })
}

fn create_temp_beside(output_path: &Path) -> Result<NamedTempFile> {
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".wuffcrypt-tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            WuffcryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::OpenError,
                format!("failed to open {}", output_path.display()),
                e,
            )
        })
}

/// Flush, fsync and restrict the temp file, then atomically rename it over
/// `target`.
fn persist_secure(mut temp_file: NamedTempFile, target: &Path) -> Result<()> {
    temp_file
        .flush()
        .map_err(|e| WuffcryptError::io("failed to flush tempfile", e))?;
    // fsync() such that the rename later, if it succeeds, will always point
    // to a complete file.
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| WuffcryptError::io("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| WuffcryptError::io("failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| WuffcryptError::io("failed to set tempfile permissions", e))?;
    }

    temp_file.persist(target).map_err(|e| {
        WuffcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::OpenError,
            format!("failed to rename to target file {}", target.display()),
            e,
        )
    })?;
    Ok(())
}
