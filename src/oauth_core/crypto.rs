//! Cryptographic utilities for OAuth 1.0a (random credentials, HMAC-SHA1) using `ring`.

use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;

use super::types::OAuthError;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the charset size below 256; bytes above it are
/// rejected so every character is equally likely.
const REJECTION_BOUND: u8 = (256 / ALPHANUMERIC.len() * ALPHANUMERIC.len()) as u8;

/// Generates an alphanumeric string of `length` characters from the system CSPRNG.
///
/// Used for consumer keys and secrets, token keys and secrets, and verifiers.
pub fn random_string(length: usize) -> Result<String, OAuthError> {
    let rng = SystemRandom::new();
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while out.len() < length {
        rng.fill(&mut buf).map_err(|_| OAuthError::RandomUnavailable)?;
        for &byte in buf.iter().filter(|b| **b < REJECTION_BOUND) {
            if out.len() == length {
                break;
            }
            out.push(ALPHANUMERIC[byte as usize % ALPHANUMERIC.len()] as char);
        }
    }
    Ok(out)
}

/// Computes an HMAC-SHA1 tag over `data`.
pub fn hmac_sha1_sign(key: &[u8], data: &[u8]) -> Vec<u8> {
    let s_key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::sign(&s_key, data).as_ref().to_vec()
}

/// Verifies an HMAC-SHA1 tag in constant time.
pub fn hmac_sha1_verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let s_key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::verify(&s_key, data, tag).is_ok()
}

/// Compares two byte strings without short-circuiting on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
