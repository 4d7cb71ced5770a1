//! Italian identifiers: tax code (codice fiscale) and VAT number (partita IVA).

use regex::Regex;

use crate::api::error::ApiError;

/// Trim and uppercase, then require 16 alphanumerics.
pub(crate) fn tax_code(value: &str) -> Result<String, ApiError> {
    let normalized = value.trim().to_uppercase();
    if Regex::new(r"^[A-Z0-9]{16}$").is_ok_and(|regex| regex.is_match(&normalized)) {
        Ok(normalized)
    } else {
        Err(ApiError::validation("Invalid tax code (16 alphanumeric characters)"))
    }
}

/// Eleven digits whose last one matches the official check digit.
pub(crate) fn vat_number(value: &str) -> Result<String, ApiError> {
    let normalized = value.trim();
    let digits: Vec<u32> = normalized.chars().filter_map(|c| c.to_digit(10)).collect();
    if normalized.len() != 11 || digits.len() != 11 {
        return Err(ApiError::validation("Invalid VAT number (11 digits)"));
    }

    let sum: u32 = digits[..10]
        .iter()
        .enumerate()
        .map(|(index, &digit)| {
            if index % 2 == 0 {
                digit
            } else {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            }
        })
        .sum();

    if (10 - sum % 10) % 10 == digits[10] {
        Ok(normalized.to_string())
    } else {
        Err(ApiError::validation("Invalid VAT number (checksum)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_code_normalizes_case() {
        assert_eq!(
            tax_code(" rssmra80a01h501u ").ok(),
            Some("RSSMRA80A01H501U".to_string())
        );
        assert!(tax_code("RSSMRA80A01H501").is_err());
        assert!(tax_code("RSSMRA80A01H501-").is_err());
    }

    #[test]
    fn vat_number_checksum() {
        // 0123456789 -> check digit 7
        assert_eq!(vat_number("01234567897").ok(), Some("01234567897".to_string()));
        assert!(vat_number("01234567890").is_err());
        assert!(vat_number("0123456789").is_err());
        assert!(vat_number("0123456789a").is_err());
        assert_eq!(vat_number("00000000000").ok(), Some("00000000000".to_string()));
    }
}
