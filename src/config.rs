//! Runtime settings read from the environment
//!
//! `WUFFCRYPT_WORK_FACTOR` overrides the scrypt work factor written into new
//! files. Decryption ignores it and uses the value from the file header.

use crate::container::{DEFAULT_WORK_FACTOR, EncryptOptions};
use crate::error::{ErrorCategory, ErrorKind, Result, WuffcryptError};
use crate::kdf::WORK_FACTOR_RANGE;

pub const WORK_FACTOR_ENV: &str = "WUFFCRYPT_WORK_FACTOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub encrypt: EncryptOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut encrypt = EncryptOptions::default();

        if let Some(raw) = lookup(WORK_FACTOR_ENV) {
            let work_factor = raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|wf| WORK_FACTOR_RANGE.contains(wf))
                .ok_or_else(|| {
                    WuffcryptError::with_kind(
                        ErrorCategory::User,
                        ErrorKind::Usage,
                        format!(
                            "{} must be an integer between {} and {}, got {:?}",
                            WORK_FACTOR_ENV,
                            WORK_FACTOR_RANGE.start(),
                            WORK_FACTOR_RANGE.end(),
                            raw
                        ),
                    )
                })?;
            if work_factor != DEFAULT_WORK_FACTOR {
                tracing::debug!(work_factor, "work factor overridden from environment");
            }
            encrypt.work_factor = work_factor;
        }

        Ok(Self { encrypt })
    }
}
