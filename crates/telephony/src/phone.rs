//! Phone number normalization to E.164

/// Locale rule applied to numbers without a country code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneRegion {
    /// +91, 10-digit national numbers
    India,
    /// +1 (NANP), 10-digit national numbers
    NorthAmerica,
}

impl PhoneRegion {
    /// Country calling code without the plus sign
    pub fn country_code(&self) -> &'static str {
        match self {
            Self::India => "91",
            Self::NorthAmerica => "1",
        }
    }
}

/// Normalize a raw phone string to E.164.
///
/// Spaces, dashes, dots and parentheses are dropped. Numbers already carrying
/// a leading `+` are kept as-is. National numbers get the region's country
/// code. Other digit strings come back cleaned but otherwise unchanged.
/// Values with no digits or with letters (`anonymous`, `Restricted`, SIP
/// URIs) that cannot be normalized are returned trimmed, so a caller ID is
/// never lost.
pub fn normalize_phone_number(raw: &str, region: PhoneRegion) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return trimmed.to_string();
    }

    if has_plus {
        return format!("+{}", digits);
    }

    let code = region.country_code();
    let national_len = 10;

    if digits.len() == code.len() + national_len && digits.starts_with(code) {
        return format!("+{}", digits);
    }
    if digits.len() == national_len {
        return format!("+{}{}", code, digits);
    }
    // Trunk prefix, e.g. 09876543210 dialled inside India
    if region == PhoneRegion::India && digits.len() == 11 && digits.starts_with('0') {
        return format!("+{}{}", code, &digits[1..]);
    }

    if trimmed.chars().any(|c| c.is_alphabetic()) {
        trimmed.to_string()
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digit_india() {
        for n in ["9999999999", "8000000001", "0123456789"] {
            assert_eq!(
                normalize_phone_number(n, PhoneRegion::India),
                format!("+91{}", n)
            );
        }
    }

    #[test]
    fn test_e164_is_idempotent() {
        for s in ["+919999999999", "+14155550100", "+442071838750"] {
            assert_eq!(normalize_phone_number(s, PhoneRegion::India), s);
            assert_eq!(normalize_phone_number(s, PhoneRegion::NorthAmerica), s);
            let once = normalize_phone_number(s, PhoneRegion::India);
            assert_eq!(normalize_phone_number(&once, PhoneRegion::India), once);
        }
    }

    #[test]
    fn test_country_code_without_plus() {
        assert_eq!(
            normalize_phone_number("919876543210", PhoneRegion::India),
            "+919876543210"
        );
        assert_eq!(
            normalize_phone_number("14155550100", PhoneRegion::NorthAmerica),
            "+14155550100"
        );
    }

    #[test]
    fn test_formatting_stripped() {
        assert_eq!(
            normalize_phone_number("(415) 555-0100", PhoneRegion::NorthAmerica),
            "+14155550100"
        );
        assert_eq!(
            normalize_phone_number("+91 98765-43210", PhoneRegion::India),
            "+919876543210"
        );
        assert_eq!(
            normalize_phone_number("09876543210", PhoneRegion::India),
            "+919876543210"
        );
    }

    #[test]
    fn test_unnormalizable_kept() {
        assert_eq!(normalize_phone_number("12345", PhoneRegion::India), "12345");
        assert_eq!(normalize_phone_number("", PhoneRegion::India), "");
        assert_eq!(normalize_phone_number("   ", PhoneRegion::India), "");
    }

    #[test]
    fn test_withheld_caller_ids_kept() {
        let cases = [
            ("anonymous", "anonymous"),
            ("Restricted", "Restricted"),
            (" Unknown ", "Unknown"),
            ("+", "+"),
            ("sip:alice@example.com", "sip:alice@example.com"),
            ("sip:1001@pbx.example.com", "sip:1001@pbx.example.com"),
        ];
        for region in [PhoneRegion::India, PhoneRegion::NorthAmerica] {
            for (raw, expected) in cases {
                assert_eq!(normalize_phone_number(raw, region), expected, "{}", raw);
            }
        }
    }
}
