//! Brazilian document helpers shared by the lookup hooks and the forms.
//!
//! - CEP (postal code): 8 digits, displayed as `00000-000`.
//! - CNPJ (company tax ID): 14 digits, displayed as `00.000.000/0000-00`,
//!   last two digits are mod-11 check digits.
//! - Phones: parsed with the BR region and shown in national format.
use phonenumber::country::Id as CountryId;
use phonenumber::{Mode, PhoneNumber};
use regex::Regex;
use std::sync::OnceLock;

pub const CEP_DIGITS: usize = 8;
pub const CNPJ_DIGITS: usize = 14;

/// Strips everything that is not an ASCII digit.
pub fn normalize_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Progressive CEP mask. Extra digits beyond 8 are dropped, so applying it
/// twice gives the same result as applying it once.
pub fn format_cep(raw: &str) -> String {
    let digits: String = normalize_digits(raw).chars().take(CEP_DIGITS).collect();
    if digits.len() > 5 {
        format!("{}-{}", &digits[..5], &digits[5..])
    } else {
        digits
    }
}

/// Progressive CNPJ mask.
pub fn format_cnpj(raw: &str) -> String {
    let digits: String = normalize_digits(raw).chars().take(CNPJ_DIGITS).collect();
    let mut out = String::with_capacity(18);
    for (i, c) in digits.chars().enumerate() {
        match i {
            2 | 5 => out.push('.'),
            8 => out.push('/'),
            12 => out.push('-'),
            _ => {}
        }
        out.push(c);
    }
    out
}

pub fn is_valid_cep(raw: &str) -> bool {
    normalize_digits(raw).len() == CEP_DIGITS
}

/// Full CNPJ validation: digit count, not a repeated digit, both check digits.
pub fn is_valid_cnpj(raw: &str) -> bool {
    let digits: Vec<u32> = normalize_digits(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();
    if digits.len() != CNPJ_DIGITS {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = cnpj_check_digit(&digits[..12]);
    let second = cnpj_check_digit(&digits[..13]);
    digits[12] == first && digits[13] == second
}

fn cnpj_check_digit(digits: &[u32]) -> u32 {
    // weights cycle 2..=9 from the rightmost digit
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| d * (2 + (i as u32 % 8)))
        .sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

fn parse_br_phone(digits: &str) -> Option<PhoneNumber> {
    let number = match phonenumber::parse(Some(CountryId::BR), digits) {
        Ok(number) => number,
        Err(e) => {
            tracing::debug!("Unparseable BR phone {}: {:?}", digits, e);
            return None;
        }
    };
    phonenumber::is_valid(&number).then_some(number)
}

/// Display format for a phone coming from an external record, e.g.
/// `"11987654321"` -> `"(11) 98765-4321"`. Numbers that do not parse as a
/// valid BR phone are returned as bare digits.
pub fn format_br_phone(raw: &str) -> Option<String> {
    let digits = normalize_digits(raw);
    if digits.is_empty() {
        return None;
    }
    match parse_br_phone(&digits) {
        Some(number) => Some(number.format().mode(Mode::National).to_string()),
        None => Some(digits),
    }
}

/// Email sanity check for the login form.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email regex is valid")
    });
    email.len() >= 5 && regex.is_match(email)
}
