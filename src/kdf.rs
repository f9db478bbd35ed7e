//! Password-based key derivation using Argon2id
//!
//! Every container carries the cost parameters it was sealed with, so the
//! parameter type here is shaped by what the header can express: a 16-bit
//! time cost, memory in whole MiB (8 bits), and 16-bit parallelism.

use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

const KIB_PER_MIB: u32 = 1024;

/// Default Argon2 time cost (iterations)
pub const DEFAULT_TIME_COST: u16 = 3;

/// Default Argon2 memory cost in MiB
pub const DEFAULT_MEMORY_MIB: u8 = 64;

/// Default Argon2 parallelism (lanes)
pub const DEFAULT_PARALLELISM: u16 = 2;

/// Argon2id cost parameters, in the exact ranges the container header can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    time_cost: u16,
    memory_mib: u8,
    parallelism: u16,
}

impl KdfParams {
    /// Validates caller-supplied costs.
    ///
    /// `memory_kib` must be a whole number of MiB between 1 and 255 MiB,
    /// since the header stores memory as a single MiB count.
    pub fn new(time_cost: u32, memory_kib: u32, parallelism: u32) -> Result<Self> {
        let time_cost = u16::try_from(time_cost)
            .ok()
            .filter(|t| *t >= 1)
            .ok_or_else(|| {
                invalid_params(format!(
                    "time cost must be between 1 and {}, got {}",
                    u16::MAX,
                    time_cost
                ))
            })?;

        if memory_kib % KIB_PER_MIB != 0 {
            return Err(invalid_params(format!(
                "memory cost must be a multiple of {} KiB, got {} KiB",
                KIB_PER_MIB, memory_kib
            )));
        }
        let memory_mib = u8::try_from(memory_kib / KIB_PER_MIB)
            .ok()
            .filter(|m| *m >= 1)
            .ok_or_else(|| {
                invalid_params(format!(
                    "memory cost must be between 1 and {} MiB, got {} KiB",
                    u8::MAX,
                    memory_kib
                ))
            })?;

        let parallelism = u16::try_from(parallelism)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| {
                invalid_params(format!(
                    "parallelism must be between 1 and {}, got {}",
                    u16::MAX,
                    parallelism
                ))
            })?;

        Self::from_encoded(time_cost, memory_mib, parallelism)
    }

    /// Builds parameters from their header encoding, checking that Argon2
    /// accepts the combination.
    pub fn from_encoded(time_cost: u16, memory_mib: u8, parallelism: u16) -> Result<Self> {
        let params = Self {
            time_cost,
            memory_mib,
            parallelism,
        };
        params.argon2_params()?;
        Ok(params)
    }

    pub fn time_cost(&self) -> u16 {
        self.time_cost
    }

    pub fn memory_mib(&self) -> u8 {
        self.memory_mib
    }

    pub fn memory_kib(&self) -> u32 {
        u32::from(self.memory_mib) * KIB_PER_MIB
    }

    pub fn parallelism(&self) -> u16 {
        self.parallelism
    }

    fn argon2_params(&self) -> Result<Params> {
        Params::new(
            self.memory_kib(),
            u32::from(self.time_cost),
            u32::from(self.parallelism),
            Some(KEY_LEN),
        )
        .map_err(|e| {
            invalid_params(format!(
                "argon2 rejected time={} memory={}KiB parallelism={}: {}",
                self.time_cost,
                self.memory_kib(),
                self.parallelism,
                e
            ))
        })
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_mib: DEFAULT_MEMORY_MIB,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Derive a 32-byte key from a password and salt using Argon2id v1.3
pub fn derive_key(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, key.as_mut_slice())
        .map_err(|e| {
            CchaosError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::KdfFailure,
                format!("argon2 key derivation failed: {}", e),
            )
        })?;

    Ok(key)
}

/// Same as [`derive_key`], taking the costs as loose integers.
pub fn derive_key_raw(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    time_cost: u32,
    memory_kib: u32,
    parallelism: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = KdfParams::new(time_cost, memory_kib, parallelism)?;
    derive_key(password, salt, &params)
}

fn invalid_params(msg: String) -> CchaosError {
    CchaosError::with_kind(ErrorCategory::User, ErrorKind::InvalidParameters, msg)
}
