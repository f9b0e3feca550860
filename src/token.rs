//! Random material for sessions, TOTP seeds, and backup codes.
//!
//! Raw token values are returned to the caller exactly once (to set a cookie
//! or show a QR/backup sheet) and must never be logged.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use totp_rs::Secret;

const SESSION_TOKEN_BYTES: usize = 32;
const TOTP_SECRET_BYTES: usize = 20;
const BACKUP_CODE_BYTES: usize = 5;
const BACKUP_CODE_COUNT: usize = 10;

/// Generate a 32-byte random token, URL-safe-base64 encoded.
///
/// Used for both access and refresh tokens; the two are always generated
/// independently.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a 20-byte TOTP seed, base32 encoded for authenticator apps.
pub fn generate_totp_secret() -> Result<String> {
    let mut bytes = [0u8; TOTP_SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate TOTP secret")?;
    match Secret::Raw(bytes.to_vec()).to_encoded() {
        Secret::Encoded(encoded) => Ok(encoded),
        Secret::Raw(_) => Err(anyhow!("failed to base32-encode TOTP secret")),
    }
}

/// Generate the one-time backup code set: 10 codes, 5 random bytes each,
/// rendered as 10 lowercase hex characters.
pub fn generate_backup_codes() -> Result<Vec<String>> {
    let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
    for _ in 0..BACKUP_CODE_COUNT {
        let mut bytes = [0u8; BACKUP_CODE_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate backup code")?;
        codes.push(hex_encode(&bytes));
    }
    Ok(codes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Strict shape check for submitted TOTP codes: exactly six decimal digits.
/// Anything else fails before any crypto work happens.
#[must_use]
pub fn is_totp_code_shape(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|byte| byte.is_ascii_digit())
}

/// Shape check for submitted backup codes: ten hex characters.
#[must_use]
pub fn is_backup_code_shape(code: &str) -> bool {
    code.len() == 2 * BACKUP_CODE_BYTES && code.bytes().all(|byte| byte.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::{
        generate_backup_codes, generate_token, generate_totp_secret, is_totp_code_shape,
    };
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::collections::HashSet;
    use totp_rs::Secret;

    #[test]
    fn generated_token_decodes_to_32_bytes() {
        let token = generate_token().unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(token.as_bytes()).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn tokens_are_independent() {
        let first = generate_token().unwrap();
        let second = generate_token().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn totp_secret_is_base32_of_20_bytes() {
        let secret = generate_totp_secret().unwrap();
        let bytes = Secret::Encoded(secret).to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn backup_codes_are_ten_unique_hex_strings() {
        let codes = generate_backup_codes().unwrap();
        assert_eq!(codes.len(), 10);
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 10);
            assert!(code.bytes().all(|byte| byte.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn backup_code_shape_requires_ten_hex_chars() {
        assert!(super::is_backup_code_shape("0a1b2c3d4e"));
        assert!(!super::is_backup_code_shape("0a1b2c3d4"));
        assert!(!super::is_backup_code_shape("0a1b2c3d4g"));
    }

    #[test]
    fn totp_code_shape_requires_six_digits() {
        assert!(is_totp_code_shape("012345"));
        assert!(!is_totp_code_shape("12345"));
        assert!(!is_totp_code_shape("1234567"));
        assert!(!is_totp_code_shape("12a456"));
        assert!(!is_totp_code_shape(""));
    }
}
