//! Trailing padding appended to plaintext before sealing
//!
//! A container's payload is `plaintext || footer`. The footer is either the
//! public sentinel line or 8 random bytes, picked with equal odds. Nothing in
//! the header records which one was used: the decrypting side checks whether
//! the payload ends with the sentinel.
//!
//! Known limitation: a filler-padded payload is mis-stripped only when the
//! plaintext already ends with the first 42 bytes of the sentinel and the 8
//! random bytes happen to equal its last 8. For such a plaintext the odds are
//! 2^-64 per container; for any other plaintext they are zero.

use crate::error::{CchaosError, ErrorCategory, ErrorKind, Result};
use rand::{CryptoRng, Rng};

/// Appended in place of random filler with probability [`SENTINEL_PROBABILITY`].
pub const SENTINEL: &[u8] = b"Never gonna give you up, never gonna let you down\n";

pub const SENTINEL_PROBABILITY: f64 = 0.5;

/// Length of the random filler variant
pub const FILLER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Footer {
    Sentinel,
    RandomFiller([u8; FILLER_LEN]),
}

impl Footer {
    /// Draw a footer from a cryptographically secure RNG.
    pub fn choose<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        if rng.gen_bool(SENTINEL_PROBABILITY) {
            Footer::Sentinel
        } else {
            let mut filler = [0u8; FILLER_LEN];
            rng.fill_bytes(&mut filler);
            Footer::RandomFiller(filler)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Footer::Sentinel => SENTINEL,
            Footer::RandomFiller(filler) => filler,
        }
    }
}

/// Remove the footer from a verified payload, returning the plaintext.
pub fn strip_footer(payload: &[u8]) -> Result<&[u8]> {
    if let Some(plaintext) = payload.strip_suffix(SENTINEL) {
        return Ok(plaintext);
    }
    if payload.len() < FILLER_LEN {
        return Err(CchaosError::with_kind(
            ErrorCategory::User,
            ErrorKind::FormatInvalid,
            "decrypted payload is missing its footer",
        ));
    }
    Ok(&payload[..payload.len() - FILLER_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_sentinel_is_stripped_whole() {
        let mut payload = b"hello".to_vec();
        payload.extend_from_slice(SENTINEL);
        assert_eq!(strip_footer(&payload).unwrap(), b"hello");
    }

    #[test]
    fn test_filler_is_stripped() {
        let mut payload = b"hello".to_vec();
        payload.extend_from_slice(&[0xAB; FILLER_LEN]);
        assert_eq!(strip_footer(&payload).unwrap(), b"hello");
    }

    #[test]
    fn test_footer_only_payloads() {
        assert_eq!(strip_footer(SENTINEL).unwrap(), b"");
        assert_eq!(strip_footer(&[0u8; FILLER_LEN]).unwrap(), b"");
    }

    #[test]
    fn test_plaintext_ending_in_sentinel_survives_filler() {
        let mut payload = SENTINEL.to_vec();
        payload.extend_from_slice(&[0x01; FILLER_LEN]);
        assert_eq!(strip_footer(&payload).unwrap(), SENTINEL);
    }

    #[test]
    fn test_filler_completing_the_sentinel_is_misread() {
        let split = SENTINEL.len() - FILLER_LEN;
        let mut filler = [0u8; FILLER_LEN];
        filler.copy_from_slice(&SENTINEL[split..]);

        let mut payload = b"data".to_vec();
        payload.extend_from_slice(&SENTINEL[..split]);
        payload.extend_from_slice(Footer::RandomFiller(filler).bytes());
        assert_eq!(strip_footer(&payload).unwrap(), b"data");

        // Any other plaintext keeps its tail.
        let mut payload = b"data".to_vec();
        payload.extend_from_slice(&SENTINEL[1..split]);
        payload.extend_from_slice(&filler);
        assert_eq!(strip_footer(&payload).unwrap().len(), 4 + split - 1);
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let err = strip_footer(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::FormatInvalid));
    }

    #[test]
    fn test_choose_draws_both_variants() {
        let mut sentinels = 0;
        let mut fillers = 0;
        for _ in 0..200 {
            match Footer::choose(&mut OsRng) {
                Footer::Sentinel => sentinels += 1,
                Footer::RandomFiller(_) => fillers += 1,
            }
        }
        // Odds of either count being zero over 200 fair draws are 2^-199.
        assert!(sentinels > 0);
        assert!(fillers > 0);
    }

    #[test]
    fn test_bytes() {
        assert_eq!(Footer::Sentinel.bytes(), SENTINEL);
        assert_eq!(Footer::RandomFiller([9; FILLER_LEN]).bytes(), &[9u8; FILLER_LEN]);
    }
}
