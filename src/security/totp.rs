//! TOTP secrets and single-use backup codes

use rand::RngCore;
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

/// Issuer shown by authenticator apps
pub const ISSUER: &str = "Business Analyst Assistant";
pub const BACKUP_CODE_COUNT: usize = 10;

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;
/// Accepted drift in steps on either side of the current one
const SKEW: u8 = 2;

#[derive(Error, Debug)]
pub enum TwoFactorError {
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),
    #[error("Clock error: {0}")]
    Clock(String),
}

/// Material handed to the user when 2FA is being set up
#[derive(Debug, Clone)]
pub struct TwoFactorSetup {
    /// Base32 secret, also stored server side
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

fn build(secret_b32: &str, account: &str) -> Result<TOTP, TwoFactorError> {
    let bytes = Secret::Encoded(secret_b32.to_string())
        .to_bytes()
        .map_err(|e| TwoFactorError::InvalidSecret(format!("{:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        bytes,
        Some(ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| TwoFactorError::InvalidSecret(e.to_string()))
}

/// New secret, provisioning URL and backup codes for `account`
pub fn generate_setup(account: &str) -> Result<TwoFactorSetup, TwoFactorError> {
    let secret = match Secret::generate_secret().to_encoded() {
        Secret::Encoded(s) => s,
        Secret::Raw(_) => {
            return Err(TwoFactorError::InvalidSecret(
                "secret was not base32 encoded".to_string(),
            ))
        }
    };

    let totp = build(&secret, account)?;

    Ok(TwoFactorSetup {
        otpauth_url: totp.get_url(),
        secret,
        backup_codes: generate_backup_codes(BACKUP_CODE_COUNT),
    })
}

fn normalize_code(code: &str) -> Option<String> {
    let digits: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    (digits.len() == DIGITS && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

/// Check a code against the current time window
pub fn verify_code(secret_b32: &str, code: &str) -> Result<bool, TwoFactorError> {
    let Some(code) = normalize_code(code) else {
        return Ok(false);
    };
    build(secret_b32, "verify")?
        .check_current(&code)
        .map_err(|e| TwoFactorError::Clock(e.to_string()))
}

/// Check a code against an explicit unix time
pub fn verify_code_at(
    secret_b32: &str,
    code: &str,
    unix_time: u64,
) -> Result<bool, TwoFactorError> {
    let Some(code) = normalize_code(code) else {
        return Ok(false);
    };
    Ok(build(secret_b32, "verify")?.check(&code, unix_time))
}

/// Code an authenticator would show at `unix_time`
pub fn code_at(secret_b32: &str, unix_time: u64) -> Result<String, TwoFactorError> {
    Ok(build(secret_b32, "verify")?.generate(unix_time))
}

/// `count` codes of 4 random bytes rendered as uppercase hex
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rng.fill_bytes(&mut bytes);
            bytes.iter().map(|b| format!("{:02X}", b)).collect()
        })
        .collect()
}

/// Remove `submitted` from `codes` if present, ignoring case
pub fn consume_backup_code(codes: &mut Vec<String>, submitted: &str) -> bool {
    let wanted = submitted.trim().to_uppercase();
    if wanted.is_empty() {
        return false;
    }
    match codes.iter().position(|c| c.to_uppercase() == wanted) {
        Some(index) => {
            codes.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_material() {
        let setup = generate_setup("ana@example.com").unwrap();

        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));
        assert!(setup.otpauth_url.contains("issuer=Business%20Analyst%20Assistant"));
        assert_eq!(setup.backup_codes.len(), BACKUP_CODE_COUNT);
        for code in &setup.backup_codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_window_tolerance() {
        let setup = generate_setup("ana@example.com").unwrap();
        let now = 1_700_000_000u64;
        let code = code_at(&setup.secret, now).unwrap();

        assert!(verify_code_at(&setup.secret, &code, now).unwrap());
        // Two steps of drift are accepted, three are not
        assert!(verify_code_at(&setup.secret, &code, now + 2 * STEP_SECS).unwrap());
        assert!(!verify_code_at(&setup.secret, &code, now + 3 * STEP_SECS).unwrap());
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let setup = generate_setup("ana@example.com").unwrap();
        assert!(!verify_code(&setup.secret, "abc").unwrap());
        assert!(!verify_code(&setup.secret, "1234567").unwrap());
        assert!(verify_code("not base32 !!", "123456").is_err());
    }

    #[test]
    fn test_backup_code_consumed_once() {
        let mut codes = vec!["ABCD1234".to_string(), "FFFF0000".to_string()];

        assert!(consume_backup_code(&mut codes, " abcd1234 "));
        assert_eq!(codes, vec!["FFFF0000".to_string()]);
        assert!(!consume_backup_code(&mut codes, "ABCD1234"));
        assert!(!consume_backup_code(&mut codes, ""));
    }
}
