//! Recursive encryption/decryption of directory trees
//!
//! Each regular file becomes (or comes from) an independent container at the
//! same relative path under the destination, with [`MARKER_EXTENSION`]
//! appended to its name. Per-file failures are collected in a [`TreeReport`]
//! and never stop the remaining files; only problems that would affect the
//! whole run (missing source, destination inside source) are returned as
//! errors, before anything is written.

use crate::container;
use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use crate::file_ops::{read_error, write_atomic};
use crate::hooks::PostDecryptHook;
use crate::kdf::KdfParams;
use crate::password::PasswordSource;
use crate::secretcrypt;
use rayon::prelude::*;
use std::ffi::OsStr;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extension marking an encrypted file, without the leading dot.
pub const MARKER_EXTENSION: &str = "enc";

#[derive(Clone)]
pub struct TreeOptions {
    /// Number of files processed concurrently. Each in-flight file holds one
    /// Argon2 memory buffer, see [`jobs_for_memory_budget`].
    pub jobs: NonZeroUsize,
    /// Whether dot-files and dot-directories are visited.
    pub include_hidden: bool,
    /// Run on each successfully decrypted file.
    pub hook: Option<Arc<dyn PostDecryptHook>>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            jobs: NonZeroUsize::MIN,
            include_hidden: true,
            hook: None,
        }
    }
}

#[derive(Debug)]
pub struct FileFailure {
    /// Source path the failure belongs to.
    pub path: PathBuf,
    pub error: CchaosError,
}

/// Outcome of a tree operation, one entry per visited path.
#[derive(Debug, Default)]
pub struct TreeReport {
    /// Destination paths that were written.
    pub written: Vec<PathBuf>,
    /// Source paths that were deliberately left alone.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
}

impl TreeReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of walking a source tree.
#[derive(Debug, Default)]
pub struct Listing {
    /// Regular files, sorted.
    pub files: Vec<PathBuf>,
    /// Subdirectories that could not be read.
    pub failures: Vec<FileFailure>,
}

/// Collect all regular files under `root` recursively.
///
/// Symlinks are never followed, so link cycles cannot cause endless descent.
/// Only a failure to read `root` itself is an error; unreadable
/// subdirectories are recorded in the listing.
pub fn collect_files(root: &Path, include_hidden: bool) -> Result<Listing> {
    let mut listing = Listing::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(read_error(&dir, e)),
            Err(e) => {
                listing.failures.push(FileFailure {
                    error: read_error(&dir, e),
                    path: dir,
                });
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    listing.failures.push(FileFailure {
                        path: dir.clone(),
                        error: read_error(&dir, e),
                    });
                    continue;
                }
            };
            let path = entry.path();
            if !include_hidden && is_hidden(&entry.file_name()) {
                continue;
            }
            // file_type() describes the entry itself, not a symlink target.
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    listing.failures.push(FileFailure {
                        error: read_error(&path, e),
                        path,
                    });
                    continue;
                }
            };

            if file_type.is_symlink() {
                debug!(path = %path.display(), "not following symlink");
            } else if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                listing.files.push(path);
            }
        }
    }

    listing.files.sort(); // deterministic order
    Ok(listing)
}

/// Encrypt every regular file under `src_dir` into `dst_dir`.
///
/// `a/b.txt` becomes `<dst_dir>/a/b.txt.enc`. Files that already carry the
/// marker extension are skipped. The password is read once.
pub fn encrypt_tree(
    password_source: &mut dyn PasswordSource,
    src_dir: &Path,
    dst_dir: &Path,
    kdf: &KdfParams,
    options: &TreeOptions,
) -> Result<TreeReport> {
    let (src_root, dst_root) = check_roots(src_dir, dst_dir)?;
    let password = password_source.password()?;
    let listing = collect_files(&src_root, options.include_hidden)?;

    let outcomes = run_jobs(options.jobs, &listing.files, |path| {
        if has_marker(path) {
            debug!(path = %path.display(), "already encrypted, skipping");
            return Ok(None);
        }
        let rel = relative_to(&src_root, path)?;
        let dest = dst_root.join(encrypted_name(rel));

        let plaintext = fs::read(path).map_err(|e| read_error(path, e))?;
        let sealed = secretcrypt::encrypt(&password, &plaintext, kdf)?;
        create_parent(&dest)?;
        write_atomic(&dest, &sealed)?;

        debug!(input = %path.display(), output = %dest.display(), "encrypted file");
        Ok(Some(dest))
    })?;

    Ok(summarize("encrypt", listing, outcomes))
}

/// Decrypt every container under `src_dir` into `dst_dir`.
///
/// `a/b.txt.enc` becomes `<dst_dir>/a/b.txt`. Files without the marker
/// extension or without the container magic are skipped. Decryption uses
/// the parameters embedded in each container.
pub fn decrypt_tree(
    password_source: &mut dyn PasswordSource,
    src_dir: &Path,
    dst_dir: &Path,
    options: &TreeOptions,
) -> Result<TreeReport> {
    let (src_root, dst_root) = check_roots(src_dir, dst_dir)?;
    let password = password_source.password()?;
    let listing = collect_files(&src_root, options.include_hidden)?;

    let outcomes = run_jobs(options.jobs, &listing.files, |path| {
        if !has_marker(path) {
            return Ok(None);
        }
        let rel = relative_to(&src_root, path)?;
        let dest = dst_root.join(rel.with_extension(""));

        let sealed = fs::read(path).map_err(|e| read_error(path, e))?;
        if !container::has_magic(&sealed) {
            warn!(path = %path.display(), "not a cchaos container, skipping");
            return Ok(None);
        }
        let plaintext = secretcrypt::decrypt(&password, &sealed)?;
        create_parent(&dest)?;
        write_atomic(&dest, &plaintext)?;

        debug!(input = %path.display(), output = %dest.display(), "decrypted file");
        if let Some(hook) = &options.hook {
            hook.after_decrypt(path, &plaintext);
        }
        Ok(Some(dest))
    })?;

    Ok(summarize("decrypt", listing, outcomes))
}

/// Largest worker count whose combined Argon2 memory fits in `budget_mib`,
/// capped at the machine's available parallelism and never below one.
pub fn jobs_for_memory_budget(budget_mib: u64, memory_mib: u8) -> NonZeroUsize {
    let cpus = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
    let by_memory = budget_mib / u64::from(memory_mib.max(1));
    let jobs = usize::try_from(by_memory).unwrap_or(usize::MAX).min(cpus.get());
    NonZeroUsize::new(jobs).unwrap_or(NonZeroUsize::MIN)
}

type JobResult = Result<Option<PathBuf>>;

/// Apply `job` to every file, sequentially or on a dedicated rayon pool.
///
/// `Ok(None)` from a job means the file was skipped.
fn run_jobs<F>(jobs: NonZeroUsize, files: &[PathBuf], job: F) -> Result<Vec<(PathBuf, JobResult)>>
where
    F: Fn(&Path) -> JobResult + Send + Sync,
{
    let run = |path: &PathBuf| (path.clone(), job(path.as_path()));

    if jobs.get() == 1 {
        return Ok(files.iter().map(run).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.get())
        .build()
        .map_err(|e| {
            CchaosError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to start worker pool",
                e,
            )
        })?;
    Ok(pool.install(|| files.par_iter().map(run).collect()))
}

fn summarize(op: &str, listing: Listing, outcomes: Vec<(PathBuf, JobResult)>) -> TreeReport {
    let mut report = TreeReport {
        failures: listing.failures,
        ..TreeReport::default()
    };

    for (path, outcome) in outcomes {
        match outcome {
            Ok(Some(dest)) => report.written.push(dest),
            Ok(None) => report.skipped.push(path),
            Err(error) => {
                warn!(path = %path.display(), "{op} failed: {error}");
                report.failures.push(FileFailure { path, error });
            }
        }
    }

    info!(
        written = report.written.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "{op} tree finished"
    );
    report
}

/// Validate the source and destination roots before anything is touched.
///
/// Returns the canonical source directory and the resolved destination, which
/// has no `..` left in it.
fn check_roots(src_dir: &Path, dst_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let src_root = fs::canonicalize(src_dir).map_err(|e| read_error(src_dir, e))?;
    if !src_root.is_dir() {
        return Err(CchaosError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotADirectory,
            format!("source {} is not a directory", src_dir.display()),
        ));
    }

    if dst_dir.exists() && !dst_dir.is_dir() {
        return Err(CchaosError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotADirectory,
            format!("destination {} is not a directory", dst_dir.display()),
        ));
    }

    let dst_root = resolve_path(dst_dir)?;
    if dst_root.starts_with(&src_root) {
        return Err(CchaosError::with_kind(
            ErrorCategory::User,
            ErrorKind::PathCollision,
            format!(
                "destination {} must not be the source directory or inside it",
                dst_dir.display()
            ),
        ));
    }

    Ok((src_root, dst_root))
}

/// Canonicalize a path that may not exist yet: the longest existing
/// ancestor is canonicalized and the missing remainder is appended.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| read_error(path, e))?;

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    let mut resolved = loop {
        match fs::canonicalize(existing) {
            Ok(canonical) => break canonical,
            Err(_) => match (existing.parent(), existing.components().next_back()) {
                (Some(parent), Some(last)) => {
                    missing.push(last);
                    existing = parent;
                }
                _ => break PathBuf::new(),
            },
        }
    };

    for component in missing.into_iter().rev() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => resolved.push(name),
            _ => {}
        }
    }
    Ok(resolved)
}

fn relative_to<'a>(root: &Path, path: &'a Path) -> Result<&'a Path> {
    path.strip_prefix(root).map_err(|e| {
        CchaosError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("{} is not under {}", path.display(), root.display()),
            e,
        )
    })
}

fn encrypted_name(rel: &Path) -> PathBuf {
    let mut name = rel.as_os_str().to_os_string();
    name.push(".");
    name.push(MARKER_EXTENSION);
    PathBuf::from(name)
}

fn has_marker(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(MARKER_EXTENSION))
}

fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}

fn create_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            CchaosError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to create directory {}", parent.display()),
                e,
            )
        })?;
    }
    Ok(())
}
