//! Encryption/decryption using Argon2id + AES-256-GCM
//!
//! This module implements password-based encryption using:
//! - Argon2id for key derivation from the password (see [`crate::kdf`])
//! - AES-256-GCM for authenticated encryption
//!
//! A container is the 67-byte header (see [`crate::container`]) followed by
//! the AES-256-GCM output over `plaintext || footer`. The whole header is
//! passed as associated data, so altering any header byte after the magic
//! and version checks makes authentication fail.

use crate::container::{self, HEADER_LEN, Header, NONCE_LEN};
use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use crate::footer::{self, Footer};
use crate::kdf::{self, KdfParams, SALT_LEN};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Length of the GCM authentication tag
pub const TAG_LEN: usize = 16;

/// Encrypt plaintext with a password using random salt, nonce and footer
///
/// Returns the complete container: header(67) + ciphertext(variable).
pub fn encrypt(password: &[u8], plaintext: &[u8], kdf: &KdfParams) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let footer = Footer::choose(&mut OsRng);

    encrypt_deterministic(password, plaintext, &salt, &nonce, footer, kdf)
}

/// Encrypt with the cost parameters given as loose integers
///
/// The parameters are validated before any key derivation takes place.
pub fn encrypt_with_costs(
    password: &[u8],
    plaintext: &[u8],
    time_cost: u32,
    memory_kib: u32,
    parallelism: u32,
) -> Result<Vec<u8>> {
    let kdf = KdfParams::new(time_cost, memory_kib, parallelism)?;
    encrypt(password, plaintext, &kdf)
}

/// Encrypt plaintext with a password using provided salt, nonce and footer
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which generates random salt/nonce.
pub fn encrypt_deterministic(
    password: &[u8],
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
    footer: Footer,
    kdf: &KdfParams,
) -> Result<Vec<u8>> {
    let header = container::encode_header(salt, nonce, kdf);
    let key = kdf::derive_key(password, salt, kdf)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

    let footer_bytes = footer.bytes();
    let mut payload = Zeroizing::new(Vec::with_capacity(plaintext.len() + footer_bytes.len()));
    payload.extend_from_slice(plaintext);
    payload.extend_from_slice(footer_bytes);

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: &payload,
                aad: &header,
            },
        )
        .map_err(|e| {
            CchaosError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CipherFailure,
                format!("encryption failed: {}", e),
            )
        })?;

    let mut output = Vec::with_capacity(HEADER_LEN + sealed.len());
    output.extend_from_slice(&header);
    output.extend_from_slice(&sealed);

    Ok(output)
}

/// Decrypt a container with a password
///
/// Key derivation always uses the parameters embedded in the header. Either
/// the fully verified plaintext is returned or an error; header problems
/// surface as format errors, everything else as an authentication failure.
pub fn decrypt(password: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    let (header, header_len) = container::decode_header(input)?;
    let (aad, sealed) = input.split_at(header_len);

    let key = kdf::derive_key(password, &header.salt, &header.kdf)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

    let payload = cipher
        .decrypt(
            Nonce::from_slice(&header.nonce),
            Payload { msg: sealed, aad },
        )
        .map(Zeroizing::new)
        .map_err(|_| CchaosError::authentication_failed())?;

    let plaintext = footer::strip_footer(&payload)?;
    Ok(plaintext.to_vec())
}

/// Parse only the header of a container, without deriving any key.
pub fn inspect(input: &[u8]) -> Result<Header> {
    container::decode_header(input).map(|(header, _)| header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footer::{FILLER_LEN, SENTINEL};

    fn cheap() -> KdfParams {
        KdfParams::new(1, 1024, 1).unwrap()
    }

    #[test]
    fn test_empty_plaintext() {
        let ciphertext = encrypt(b"test", b"", &cheap()).unwrap();
        let decrypted = decrypt(b"test", &ciphertext).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_empty_plaintext_container_sizes() {
        let salt = [1u8; SALT_LEN];
        let nonce = [2u8; NONCE_LEN];

        let with_sentinel =
            encrypt_deterministic(b"test", b"", &salt, &nonce, Footer::Sentinel, &cheap()).unwrap();
        assert_eq!(with_sentinel.len(), HEADER_LEN + SENTINEL.len() + TAG_LEN);

        let with_filler = encrypt_deterministic(
            b"test",
            b"",
            &salt,
            &nonce,
            Footer::RandomFiller([0; FILLER_LEN]),
            &cheap(),
        )
        .unwrap();
        assert_eq!(with_filler.len(), HEADER_LEN + FILLER_LEN + TAG_LEN);

        assert!(decrypt(b"test", &with_sentinel).unwrap().is_empty());
        assert!(decrypt(b"test", &with_filler).unwrap().is_empty());
    }

    #[test]
    fn test_small_plaintext() {
        let ciphertext = encrypt(b"test", b"hello", &cheap()).unwrap();
        let decrypted = decrypt(b"test", &ciphertext).unwrap();
        assert_eq!(b"hello", &decrypted[..]);
    }

    #[test]
    fn test_all_byte_values() {
        let plaintext: Vec<u8> = (0..=255).collect();
        let ciphertext = encrypt(b"test", &plaintext, &cheap()).unwrap();
        assert_eq!(decrypt(b"test", &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_large_plaintext() {
        let plaintext = vec![0x42u8; 128 * 1024]; // 128KB
        let ciphertext = encrypt(b"test", &plaintext, &cheap()).unwrap();
        assert_eq!(decrypt(b"test", &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_deterministic_encryption() {
        let salt = [1u8; SALT_LEN];
        let nonce = [2u8; NONCE_LEN];

        let ct1 = encrypt_deterministic(
            b"test",
            b"hello world",
            &salt,
            &nonce,
            Footer::Sentinel,
            &cheap(),
        )
        .unwrap();
        let ct2 = encrypt_deterministic(
            b"test",
            b"hello world",
            &salt,
            &nonce,
            Footer::Sentinel,
            &cheap(),
        )
        .unwrap();

        // Same salt/nonce/footer produces identical ciphertext
        assert_eq!(ct1, ct2);
        assert_eq!(decrypt(b"test", &ct1).unwrap(), b"hello world");
    }

    #[test]
    fn test_plaintext_ending_in_sentinel() {
        let salt = [1u8; SALT_LEN];
        let nonce = [2u8; NONCE_LEN];
        let mut plaintext = b"lyrics: ".to_vec();
        plaintext.extend_from_slice(SENTINEL);

        for footer in [Footer::Sentinel, Footer::RandomFiller([0x5A; FILLER_LEN])] {
            let ct = encrypt_deterministic(b"test", &plaintext, &salt, &nonce, footer, &cheap())
                .unwrap();
            assert_eq!(decrypt(b"test", &ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_salt_and_nonce() {
        let ct1 = encrypt(b"test", b"same message", &cheap()).unwrap();
        let ct2 = encrypt(b"test", b"same message", &cheap()).unwrap();

        let h1 = inspect(&ct1).unwrap();
        let h2 = inspect(&ct2).unwrap();
        assert_ne!(h1.salt, h2.salt);
        assert_ne!(h1.nonce, h2.nonce);

        assert_eq!(decrypt(b"test", &ct1).unwrap(), b"same message");
        assert_eq!(decrypt(b"test", &ct2).unwrap(), b"same message");
    }

    #[test]
    fn test_parameters_are_embedded() {
        let a = KdfParams::new(1, 1024, 1).unwrap();
        let b = KdfParams::new(2, 2048, 3).unwrap();

        let ct_a = encrypt(b"pw", b"first", &a).unwrap();
        let ct_b = encrypt(b"pw", b"second", &b).unwrap();

        assert_eq!(inspect(&ct_a).unwrap().kdf, a);
        assert_eq!(inspect(&ct_b).unwrap().kdf, b);
        assert_eq!(decrypt(b"pw", &ct_a).unwrap(), b"first");
        assert_eq!(decrypt(b"pw", &ct_b).unwrap(), b"second");
    }

    #[test]
    fn test_encrypt_with_costs_validates() {
        let err = encrypt_with_costs(b"pw", b"data", 1, 1000, 1).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameters));

        let ct = encrypt_with_costs(b"pw", b"data", 1, 1024, 1).unwrap();
        assert_eq!(decrypt(b"pw", &ct).unwrap(), b"data");
    }

    #[test]
    fn test_wrong_password() {
        let ciphertext = encrypt(b"correct", b"secret data", &cheap()).unwrap();
        let err = decrypt(b"wrong", &ciphertext).unwrap_err();

        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(
            err.to_string()
                .contains("wrong password or corrupted/tampered data")
        );
    }

    #[test]
    fn test_tampering_after_version_is_authentication_failure() {
        let salt = [3u8; SALT_LEN];
        let nonce = [4u8; NONCE_LEN];
        let ciphertext = encrypt_deterministic(
            b"test",
            b"hello",
            &salt,
            &nonce,
            Footer::RandomFiller([7; FILLER_LEN]),
            &cheap(),
        )
        .unwrap();

        // Reserved block, salt, nonce and every ciphertext byte; one bit per
        // byte, cycling through bit positions.
        let kdf_start = HEADER_LEN - container::KDF_PARAMS_LEN;
        let positions = (14..kdf_start).chain(HEADER_LEN..ciphertext.len());
        for (i, pos) in positions.enumerate() {
            let mut tampered = ciphertext.clone();
            tampered[pos] ^= 1 << (i % 8);
            let err = decrypt(b"test", &tampered).unwrap_err();
            assert_eq!(
                err.kind,
                Some(ErrorKind::AuthenticationFailed),
                "flip at byte {} was not detected",
                pos
            );
        }

        // Cost fields, changed to other valid values.
        for pos in [kdf_start + 1, kdf_start + 2, kdf_start + 4] {
            let mut tampered = ciphertext.clone();
            tampered[pos] ^= 0b10;
            let err = decrypt(b"test", &tampered).unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        }
    }

    #[test]
    fn test_tampered_magic_is_format_error() {
        let mut ciphertext = encrypt(b"test", b"hello", &cheap()).unwrap();
        ciphertext[0] ^= 0x01;
        let err = decrypt(b"test", &ciphertext).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::FormatInvalid));
    }

    #[test]
    fn test_tampered_version_is_format_error() {
        let mut ciphertext = encrypt(b"test", b"hello", &cheap()).unwrap();
        ciphertext[11] ^= 0x01;
        let err = decrypt(b"test", &ciphertext).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::VersionUnsupported));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let ciphertext = encrypt(b"test", b"hello", &cheap()).unwrap();

        for len in [HEADER_LEN, HEADER_LEN + 1, HEADER_LEN + TAG_LEN, ciphertext.len() - 1] {
            let err = decrypt(b"test", &ciphertext[..len]).unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        }
    }

    #[test]
    fn test_truncated_header() {
        let ciphertext = encrypt(b"test", b"hello", &cheap()).unwrap();
        let err = decrypt(b"test", &ciphertext[..HEADER_LEN - 1]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TruncatedInput));
    }

    #[test]
    fn test_trailing_data() {
        let mut ciphertext = encrypt(b"test", b"hello", &cheap()).unwrap();
        ciphertext.push(0xFF);
        let err = decrypt(b"test", &ciphertext).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_not_a_container() {
        let err = decrypt(b"test", b"just some plaintext that is long enough").unwrap_err();
        assert!(err.is_format_error());
    }
}
