//! File encryption/decryption operations
//!
//! This module provides high-level single-file operations for encrypting and
//! decrypting files using the cchaos container format. Any error stops the
//! operation and nothing is published at the destination.

use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use crate::hooks::{NoopHook, PostDecryptHook};
use crate::kdf::KdfParams;
use crate::password::PasswordSource;
use crate::secretcrypt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Encrypt a file with a password
///
/// Reads plaintext from `input_path`, encrypts it using a password from
/// `password_source` and the given Argon2 costs, and writes the container to
/// `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    password_source: &mut dyn PasswordSource,
    kdf: &KdfParams,
) -> Result<()> {
    let plaintext = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let password = password_source.password()?;
    let container = secretcrypt::encrypt(&password, &plaintext, kdf)
        .map_err(|e| e.with_context("encryption failed"))?;
    write_atomic(output_path, &container)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    debug!(
        input = %input_path.display(),
        output = %output_path.display(),
        bytes = plaintext.len(),
        "encrypted file"
    );
    Ok(())
}

/// Decrypt a file with a password
///
/// Reads a container from `input_path`, decrypts it using a password from
/// `password_source`, and writes the plaintext to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    password_source: &mut dyn PasswordSource,
) -> Result<()> {
    decrypt_file_with_hook(input_path, output_path, password_source, &NoopHook)
}

/// Like [`decrypt_file`], handing the verified plaintext to `hook` once it
/// has been written.
pub fn decrypt_file_with_hook(
    input_path: &Path,
    output_path: &Path,
    password_source: &mut dyn PasswordSource,
    hook: &dyn PostDecryptHook,
) -> Result<()> {
    let container = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let password = password_source.password()?;
    let plaintext = secretcrypt::decrypt(&password, &container)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    write_atomic(output_path, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    debug!(
        input = %input_path.display(),
        output = %output_path.display(),
        bytes = plaintext.len(),
        "decrypted file"
    );
    hook.after_decrypt(input_path, &plaintext);
    Ok(())
}

/// Atomically publish `contents` at `path` (tempfile + fsync + rename).
///
/// Either the previous file (if any) or the complete new file exists at
/// `path`, never a partial one. The result has mode 0o600 on Unix.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                CchaosError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }

    temp_file.persist(path).map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

pub(crate) fn read_error(path: &Path, err: io::Error) -> CchaosError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    CchaosError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
