//! Container header codec
//!
//! The header is a fixed 67-byte prefix, with all integers big-endian:
//! - magic: 10 bytes, `CCHAOS2.3\0`
//! - version: 4 bytes, `v2.3`
//! - reserved block: 20 bytes, `COMBOCHAOS_METADATA\0`
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - kdf params: time cost (u16), memory in MiB (u8), parallelism (u16)
//!
//! The AES-256-GCM ciphertext follows directly, authenticated together with
//! every header byte. The codec never looks at the ciphertext.

use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use crate::kdf::{KdfParams, SALT_LEN};

/// Format family marker
pub const MAGIC: &[u8; 10] = b"CCHAOS2.3\0";

/// Format revision tag
pub const VERSION: &[u8; 4] = b"v2.3";

/// Reserved for future metadata; currently constant
pub const RESERVED_BLOCK: &[u8; 20] = b"COMBOCHAOS_METADATA\0";

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the encoded kdf parameters
pub const KDF_PARAMS_LEN: usize = 5;

const SALT_OFFSET: usize = MAGIC.len() + VERSION.len() + RESERVED_BLOCK.len();
const NONCE_OFFSET: usize = SALT_OFFSET + SALT_LEN;
const KDF_OFFSET: usize = NONCE_OFFSET + NONCE_LEN;

/// Total header length
pub const HEADER_LEN: usize = KDF_OFFSET + KDF_PARAMS_LEN;

/// Everything a container needs besides the password to be decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub kdf: KdfParams,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..MAGIC.len()].copy_from_slice(MAGIC);
        out[MAGIC.len()..MAGIC.len() + VERSION.len()].copy_from_slice(VERSION);
        out[MAGIC.len() + VERSION.len()..SALT_OFFSET].copy_from_slice(RESERVED_BLOCK);
        out[SALT_OFFSET..NONCE_OFFSET].copy_from_slice(&self.salt);
        out[NONCE_OFFSET..KDF_OFFSET].copy_from_slice(&self.nonce);

        let kdf = &mut out[KDF_OFFSET..];
        kdf[0..2].copy_from_slice(&self.kdf.time_cost().to_be_bytes());
        kdf[2] = self.kdf.memory_mib();
        kdf[3..5].copy_from_slice(&self.kdf.parallelism().to_be_bytes());
        out
    }
}

/// Lay out a header from its variable fields.
pub fn encode_header(
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
    kdf: &KdfParams,
) -> [u8; HEADER_LEN] {
    Header {
        salt: *salt,
        nonce: *nonce,
        kdf: *kdf,
    }
    .encode()
}

/// Parse and validate the header at the start of `input`.
///
/// Returns the header and the number of bytes it occupies; the ciphertext
/// starts at that offset.
pub fn decode_header(input: &[u8]) -> Result<(Header, usize)> {
    if input.len() < MAGIC.len() {
        return Err(format_error(
            ErrorKind::TruncatedInput,
            "input likely truncated while reading magic",
        ));
    }
    if !has_magic(input) {
        return Err(format_error(
            ErrorKind::FormatInvalid,
            "input unrecognized as cchaos data (magic mismatch)",
        ));
    }

    if input.len() < SALT_OFFSET {
        return Err(format_error(
            ErrorKind::TruncatedInput,
            "input likely truncated while reading version",
        ));
    }
    if &input[MAGIC.len()..MAGIC.len() + VERSION.len()] != VERSION {
        return Err(format_error(
            ErrorKind::VersionUnsupported,
            "input claims to be cchaos, but not a version we support",
        ));
    }

    if input.len() < HEADER_LEN {
        return Err(format_error(
            ErrorKind::TruncatedInput,
            "input likely truncated while reading header",
        ));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&input[SALT_OFFSET..NONCE_OFFSET]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&input[NONCE_OFFSET..KDF_OFFSET]);

    let kdf = &input[KDF_OFFSET..HEADER_LEN];
    let time_cost = u16::from_be_bytes([kdf[0], kdf[1]]);
    let memory_mib = kdf[2];
    let parallelism = u16::from_be_bytes([kdf[3], kdf[4]]);
    let kdf = KdfParams::from_encoded(time_cost, memory_mib, parallelism).map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::FormatInvalid,
            "header carries unusable key derivation parameters",
            e,
        )
    })?;

    Ok((Header { salt, nonce, kdf }, HEADER_LEN))
}

/// Whether `input` starts with the container magic.
pub fn has_magic(input: &[u8]) -> bool {
    input.starts_with(MAGIC)
}

fn format_error(kind: ErrorKind, msg: &str) -> CchaosError {
    CchaosError::with_kind(ErrorCategory::User, kind, msg)
}
