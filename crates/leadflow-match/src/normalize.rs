//! Canonicalization of raw lead attributes into comparable forms.
//!
//! Every normalizer is a pure, deterministic, idempotent function of the
//! raw string. Blank input yields `None`, never an empty string, so
//! downstream equality checks treat "absent" uniformly. Nothing here is
//! persisted; normalized views are recomputed on every comparison.

use serde_json::Value as JsonValue;

use leadflow_core::defaults::{PHONE_COUNTRY_PREFIX, PHONE_LOCAL_DIGITS};

/// Lowercased, trimmed email address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Cleaned phone number.
///
/// Strips every non-digit character except a leading `+`. Bare 8-digit
/// local Danish subscriber numbers get the `+45` prefix; a `45` country
/// code already present (with or without `+`) is not doubled. Danish
/// output is always `+45` followed by 8 digits; anything else is the
/// cleaned digit string.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    // A '+' counts as leading when it precedes the first digit.
    let has_plus = raw
        .chars()
        .find(|c| c.is_ascii_digit() || *c == '+')
        .map(|c| c == '+')
        .unwrap_or(false);

    let country_digits = &PHONE_COUNTRY_PREFIX[1..];
    let normalized = if digits.len() == PHONE_LOCAL_DIGITS && !has_plus {
        format!("{PHONE_COUNTRY_PREFIX}{digits}")
    } else if digits.len() == PHONE_LOCAL_DIGITS + country_digits.len()
        && digits.starts_with(country_digits)
    {
        format!("+{digits}")
    } else if has_plus {
        format!("+{digits}")
    } else {
        digits
    };

    Some(normalized)
}

/// Lowercased name with internal whitespace runs collapsed to one space.
pub fn normalize_name(raw: &str) -> Option<String> {
    collapse_whitespace(raw)
}

/// Same whitespace/case rule as names.
pub fn normalize_address(raw: &str) -> Option<String> {
    collapse_whitespace(raw)
}

/// Uppercased postal code with all whitespace stripped (not collapsed),
/// tolerating country-prefixed codes like "dk-2100" -> "DK-2100".
pub fn normalize_postal_code(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.to_uppercase())
}

fn collapse_whitespace(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Ephemeral canonical view of a payload's identifying attributes.
///
/// Derived-only; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedAttributes {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
}

impl NormalizedAttributes {
    /// Derive the canonical view from a raw payload object.
    pub fn from_payload(payload: &JsonValue) -> Self {
        let raw = |key: &str| payload.get(key).and_then(JsonValue::as_str);
        Self {
            email: raw("email").and_then(normalize_email),
            phone: raw("phone").and_then(normalize_phone),
            name: raw("name").and_then(normalize_name),
            address: raw("address").and_then(normalize_address),
            postal_code: raw("postal_code").and_then(normalize_postal_code),
        }
    }

    /// Whether the payload carries at least one identifying field:
    /// email, phone, name, or address + postal code.
    pub fn has_identifying_field(&self) -> bool {
        self.email.is_some()
            || self.phone.is_some()
            || self.name.is_some()
            || (self.address.is_some() && self.postal_code.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_email_case_and_whitespace() {
        assert_eq!(
            normalize_email(" Test@Example.COM "),
            Some("test@example.com".to_string())
        );
    }

    #[test]
    fn test_normalize_email_blank() {
        assert_eq!(normalize_email(""), None);
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn test_normalize_email_idempotent() {
        let once = normalize_email(" MIXED@Case.dk ").unwrap();
        assert_eq!(normalize_email(&once), Some(once.clone()));
    }

    #[test]
    fn test_normalize_phone_local_danish() {
        assert_eq!(normalize_phone("12 34 56 78"), Some("+4512345678".to_string()));
    }

    #[test]
    fn test_normalize_phone_variants_agree() {
        let expected = Some("+4512345678".to_string());
        assert_eq!(normalize_phone("12 34 56 78"), expected);
        assert_eq!(normalize_phone("+45 12 34 56 78"), expected);
        assert_eq!(normalize_phone("(+45) 12 34 56 78"), expected);
        assert_eq!(normalize_phone("4512345678"), expected);
    }

    #[test]
    fn test_normalize_phone_foreign_number() {
        assert_eq!(normalize_phone("+49 170 1234567"), Some("+491701234567".to_string()));
    }

    #[test]
    fn test_normalize_phone_short_number_kept_as_digits() {
        assert_eq!(normalize_phone("112"), Some("112".to_string()));
    }

    #[test]
    fn test_normalize_phone_blank() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("abc"), None);
        assert_eq!(normalize_phone("+"), None);
    }

    #[test]
    fn test_normalize_phone_idempotent() {
        let once = normalize_phone("12 34 56 78").unwrap();
        assert_eq!(normalize_phone(&once), Some(once.clone()));
    }

    #[test]
    fn test_normalize_name_collapses_whitespace() {
        assert_eq!(
            normalize_name("  John\t  DOE  "),
            Some("john doe".to_string())
        );
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("Nørrebrogade   42,  2. th"),
            Some("nørrebrogade 42, 2. th".to_string())
        );
    }

    #[test]
    fn test_normalize_postal_code_country_prefix() {
        assert_eq!(normalize_postal_code("dk-2100"), Some("DK-2100".to_string()));
    }

    #[test]
    fn test_normalize_postal_code_strips_whitespace() {
        assert_eq!(normalize_postal_code(" 21 00 "), Some("2100".to_string()));
    }

    #[test]
    fn test_normalize_postal_code_blank() {
        assert_eq!(normalize_postal_code("  "), None);
    }

    #[test]
    fn test_from_payload() {
        let attrs = NormalizedAttributes::from_payload(&json!({
            "email": " Jane@Firm.DK ",
            "phone": "12 34 56 78",
            "name": "Jane  Smith",
            "address": "Main   St 1",
            "postal_code": "dk-2100",
            "company": "ignored",
        }));

        assert_eq!(attrs.email.as_deref(), Some("jane@firm.dk"));
        assert_eq!(attrs.phone.as_deref(), Some("+4512345678"));
        assert_eq!(attrs.name.as_deref(), Some("jane smith"));
        assert_eq!(attrs.address.as_deref(), Some("main st 1"));
        assert_eq!(attrs.postal_code.as_deref(), Some("DK-2100"));
    }

    #[test]
    fn test_from_payload_non_string_values_ignored() {
        let attrs = NormalizedAttributes::from_payload(&json!({
            "email": 42,
            "phone": null,
        }));
        assert_eq!(attrs.email, None);
        assert_eq!(attrs.phone, None);
    }

    #[test]
    fn test_has_identifying_field() {
        let empty = NormalizedAttributes::from_payload(&json!({}));
        assert!(!empty.has_identifying_field());

        let email_only = NormalizedAttributes::from_payload(&json!({"email": "a@b.dk"}));
        assert!(email_only.has_identifying_field());

        // Address alone is not identifying; it needs a postal code.
        let address_only = NormalizedAttributes::from_payload(&json!({"address": "Main St 1"}));
        assert!(!address_only.has_identifying_field());

        let address_postal = NormalizedAttributes::from_payload(&json!({
            "address": "Main St 1",
            "postal_code": "2100",
        }));
        assert!(address_postal.has_identifying_field());
    }
}
