//! Password sources
//!
//! Every operation asks its source exactly once; directory runs reuse that
//! one password for all files.

use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use std::io::Read;
use zeroize::Zeroizing;

const PROMPT: &str = "Password: ";
const CONFIRM_PROMPT: &str = "Repeat password: ";

pub trait PasswordSource {
    /// The password as raw bytes; it need not be UTF-8.
    fn password(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// A password already held in memory.
pub struct FixedPassword(Zeroizing<Vec<u8>>);

impl FixedPassword {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(password.into()))
    }
}

impl PasswordSource for FixedPassword {
    fn password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.0.clone())
    }
}

/// Reads the password from a pipe, such as stdin with `--password-stdin`.
///
/// Everything up to EOF counts, minus a single trailing `\n` or `\r\n`, so
/// `echo secret | cchaos ...` uses `secret`.
pub struct PipedPassword<R> {
    input: R,
}

impl<R: Read> PipedPassword<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: Read> PasswordSource for PipedPassword<R> {
    fn password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.input.read_to_end(&mut data).map_err(|e| {
            CchaosError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read password from input",
                e,
            )
        })?;
        strip_line_ending(&mut data);
        Ok(data)
    }
}

/// Prompts on the controlling terminal without echo.
///
/// With confirmation on, the password is asked twice and both entries must
/// match.
pub struct TerminalPassword {
    confirm: bool,
}

impl TerminalPassword {
    /// Single prompt, for decryption.
    pub fn once() -> Self {
        Self { confirm: false }
    }

    /// Prompt and repeat, for encryption.
    pub fn confirmed() -> Self {
        Self { confirm: true }
    }
}

impl PasswordSource for TerminalPassword {
    fn password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let first = prompt(PROMPT)?;
        if !self.confirm {
            return Ok(first);
        }
        let second = prompt(CONFIRM_PROMPT)?;
        check_confirmation(first, &second)
    }
}

// rpassword only yields UTF-8; --password-stdin takes arbitrary bytes.
fn prompt(text: &str) -> Result<Zeroizing<Vec<u8>>> {
    rpassword::prompt_password(text)
        .map(|p| Zeroizing::new(p.into_bytes()))
        .map_err(|e| {
            CchaosError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "cannot prompt for a password (no terminal?); use --password-stdin",
                e,
            )
        })
}

fn check_confirmation(first: Zeroizing<Vec<u8>>, second: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if first.as_slice() != second {
        return Err(CchaosError::with_kind(
            ErrorCategory::User,
            ErrorKind::PasswordUnavailable,
            "passwords do not match",
        ));
    }
    Ok(first)
}

fn strip_line_ending(data: &mut Vec<u8>) {
    if data.last() == Some(&b'\n') {
        data.pop();
        if data.last() == Some(&b'\r') {
            data.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_fixed_password_repeats() {
        let mut source = FixedPassword::new("hunter2");
        assert_eq!(source.password().unwrap().as_slice(), b"hunter2");
        assert_eq!(source.password().unwrap().as_slice(), b"hunter2");
    }

    #[test]
    fn test_piped_strips_single_line_ending() {
        let cases: [(&[u8], &[u8]); 5] = [
            (b"secret", b"secret"),
            (b"secret\n", b"secret"),
            (b"secret\r\n", b"secret"),
            (b"secret\n\n", b"secret\n"),
            (b"", b""),
        ];
        for (input, expected) in cases {
            let mut source = PipedPassword::new(input);
            assert_eq!(source.password().unwrap().as_slice(), expected);
        }
    }

    #[test]
    fn test_piped_keeps_non_utf8_bytes() {
        let raw: &[u8] = &[0xff, 0xfe, 0x00, b'\r'];
        let mut source = PipedPassword::new(raw);
        assert_eq!(source.password().unwrap().as_slice(), raw);
    }

    #[test]
    fn test_piped_read_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("pipe closed"))
            }
        }

        let err = PipedPassword::new(Broken).password().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Io));
    }

    #[test]
    fn test_confirmation() {
        let ok = check_confirmation(Zeroizing::new(b"same".to_vec()), b"same").unwrap();
        assert_eq!(ok.as_slice(), b"same");

        let err = check_confirmation(Zeroizing::new(b"same".to_vec()), b"sane").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::PasswordUnavailable));
        assert_eq!(err.category, ErrorCategory::User);
    }

    /// Needs a human at a terminal:
    ///
    /// cargo test test_terminal_prompt_interactive -- --ignored --nocapture
    #[test]
    #[ignore]
    fn test_terminal_prompt_interactive() {
        let password = TerminalPassword::confirmed().password().unwrap();
        assert!(!password.is_empty());
    }
}
