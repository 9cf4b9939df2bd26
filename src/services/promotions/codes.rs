//! Coupon code generation and the code character policy.

use crate::errors::ServiceError;
use rand::Rng;

pub const CODE_LENGTH: usize = 6;

/// Letters without the glyphs that read like digits (I, L, O)
const LETTERS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"123456789";
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ123456789";
const AMBIGUOUS: &[char] = &['0', 'O', 'o', 'L', 'l', 'I', 'i'];

pub const CODE_TOO_LONG: &str = "The code exceeds the maximum allowable length of 6";
pub const CODE_NOT_ALPHANUMERIC: &str = "The code must be alphanumeric";
pub const CODE_AMBIGUOUS_CHARACTERS: &str =
    "Code contains characters not allowed (0, O, o, L, l, I, i)";

fn pick<R: Rng>(rng: &mut R, set: &[u8]) -> char {
    set[rng.gen_range(0..set.len())] as char
}

/// One letter, one digit, then random fill from the full alphabet.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_LENGTH);
    code.push(pick(&mut rng, LETTERS));
    code.push(pick(&mut rng, DIGITS));
    while code.len() < CODE_LENGTH {
        code.push(pick(&mut rng, ALPHABET));
    }
    code
}

/// Pad a short client supplied code up to `CODE_LENGTH`.
///
/// When the prefix lacks a letter or a digit the first padded positions supply
/// one, so a clean prefix always yields a code that passes the policy.
pub fn complete_code(partial: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut code = partial.trim().to_uppercase();
    if code.chars().count() >= CODE_LENGTH {
        return code;
    }
    if !code.chars().any(|c| c.is_ascii_alphabetic()) {
        code.push(pick(&mut rng, LETTERS));
    }
    if code.chars().count() < CODE_LENGTH && !code.chars().any(|c| c.is_ascii_digit()) {
        code.push(pick(&mut rng, DIGITS));
    }
    while code.chars().count() < CODE_LENGTH {
        code.push(pick(&mut rng, ALPHABET));
    }
    code
}

/// Trim, uppercase and check the code against the policy.
pub fn normalize_code(raw: &str) -> Result<String, ServiceError> {
    let code = raw.trim().to_uppercase();

    if code.chars().count() > CODE_LENGTH {
        return Err(ServiceError::BadRequest(CODE_TOO_LONG.to_string()));
    }

    let all_alphanumeric = code.chars().all(|c| c.is_ascii_alphanumeric());
    let has_letter = code.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = code.chars().any(|c| c.is_ascii_digit());
    if !all_alphanumeric || !has_letter || !has_digit {
        return Err(ServiceError::BadRequest(CODE_NOT_ALPHANUMERIC.to_string()));
    }

    if code.contains(AMBIGUOUS) {
        return Err(ServiceError::BadRequest(
            CODE_AMBIGUOUS_CHARACTERS.to_string(),
        ));
    }

    Ok(code)
}

/// The code a new coupon is stored under: generated when absent, padded when short.
pub fn resolve_code(requested: Option<&str>) -> Result<String, ServiceError> {
    match requested.map(str::trim).filter(|c| !c.is_empty()) {
        None => normalize_code(&generate_code()),
        Some(code) if code.chars().count() < CODE_LENGTH => normalize_code(&complete_code(code)),
        Some(code) => normalize_code(code),
    }
}
