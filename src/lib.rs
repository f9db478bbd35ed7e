//! cchaos - Password-based file and directory encryption
//!
//! Files are sealed into self-describing containers: Argon2id derives a key
//! from the password and a per-file salt, AES-256-GCM encrypts the contents,
//! and the header records everything except the password that decryption
//! needs.

#![forbid(unsafe_code)]

pub mod container;
pub mod error;
pub mod file_ops;
pub mod footer;
pub mod hooks;
pub mod kdf;
pub mod password;
pub mod secretcrypt;
pub mod tree;

pub use error::{CchaosError, ErrorCategory, ErrorKind, Result};
pub use kdf::KdfParams;
