//! One-time codes for email verification.

use rand::Rng;
use subtle::ConstantTimeEq;

/// Number of digits in a verification code.
pub const OTP_DIGITS: usize = 6;

/// A zero-padded random six-digit code.
pub fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:0width$}", width = OTP_DIGITS)
}

/// Constant-time comparison of a stored code with a submitted one.
/// Surrounding whitespace in the submission is ignored.
pub fn otp_matches(expected: &str, provided: &str) -> bool {
    let provided = provided.trim();
    expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}
