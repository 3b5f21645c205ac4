//! wuffcrypt - Password-based streaming file encryption
//!
//! Files are sealed block by block with NaCl secretbox (XSalsa20Poly1305)
//! under a key derived from the password with scrypt. See [`container`] for
//! the on-disk format.

#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod secret;
