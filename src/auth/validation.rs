use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const PASSWORD_RULES: &str = "Password must be at least 8 characters long, include uppercase, lowercase, a number, and a special character";

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn is_password_strong(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

/// Normalizes and checks an inbound email, mapping failures to 400s.
pub fn require_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email address"));
    }
    Ok(email)
}

pub fn require_strong_password(password: &str) -> Result<(), AppError> {
    if is_password_strong(password) {
        Ok(())
    } else {
        Err(AppError::validation(PASSWORD_RULES))
    }
}

/// 0 = male, 1 = female, 2 = other. Serialized as its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl TryFrom<i16> for Gender {
    type Error = AppError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Gender::Male),
            1 => Ok(Gender::Female),
            2 => Ok(Gender::Other),
            _ => Err(AppError::validation("Invalid gender value")),
        }
    }
}

impl From<Gender> for i16 {
    fn from(g: Gender) -> Self {
        match g {
            Gender::Male => 0,
            Gender::Female => 1,
            Gender::Other => 2,
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i16>()
            .map_err(|_| AppError::validation("Invalid gender value"))
            .and_then(Gender::try_from)
    }
}

/// OTP as sent by clients: a JSON number or a string of digits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OtpInput {
    Number(u64),
    Text(String),
}

/// Accepts exactly six ASCII digits without a leading zero.
pub fn parse_otp_code(input: &OtpInput) -> Result<u32, AppError> {
    let text = match input {
        OtpInput::Number(n) => n.to_string(),
        OtpInput::Text(s) => s.trim().to_string(),
    };
    if text.len() != 6 || !text.bytes().all(|b| b.is_ascii_digit()) || text.starts_with('0') {
        return Err(AppError::validation("6 digit OTP is required"));
    }
    text.parse::<u32>()
        .map_err(|_| AppError::validation("6 digit OTP is required"))
}
