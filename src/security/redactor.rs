//! Message redaction.
//!
//! Replaces PII in inquiry text with typed literal tags before the text is
//! allowed anywhere near the downstream assistant or the logs.

use super::pii::redaction_rules;
use std::borrow::Cow;

/// Redacts PII from inquiry messages.
///
/// Redaction is a total function: it never fails, and input without PII is
/// returned byte-identical. Rules are applied in the fixed category order
/// email, SSN, credit card; every occurrence of every category is replaced
/// with that category's tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRedactor;

impl MessageRedactor {
    /// Creates a new message redactor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Redacts all PII in `message`, returning the redacted text.
    #[must_use]
    pub fn redact(&self, message: &str) -> String {
        if message.is_empty() {
            return String::new();
        }

        let mut result = message.to_string();
        for rule in &redaction_rules() {
            let replaced = rule.regex.replace_all(&result, rule.category.tag());
            if let Cow::Owned(owned) = replaced {
                result = owned;
            }
        }
        result
    }

    /// Returns the redacted message and whether anything was replaced.
    #[must_use]
    pub fn redact_with_flag(&self, message: &str) -> (String, bool) {
        let redacted = self.redact(message);
        let was_redacted = redacted != message;
        (redacted, was_redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_redact_email() {
        let redactor = MessageRedactor::new();
        assert_eq!(
            redactor.redact("Contact me at test@example.com immediately."),
            "Contact me at <REDACTED: EMAIL> immediately."
        );
    }

    #[test]
    fn test_redact_both_ssn_forms() {
        let redactor = MessageRedactor::new();
        assert_eq!(
            redactor.redact("My SSN is 123-45-6789 or 123456789."),
            "My SSN is <REDACTED: SSN> or <REDACTED: SSN>."
        );
    }

    #[test]
    fn test_redact_grouped_credit_card() {
        let redactor = MessageRedactor::new();
        assert_eq!(
            redactor.redact("Charge my card 4242-4242-4242-4242 now."),
            "Charge my card <REDACTED: CREDIT_CARD> now."
        );
    }

    #[test]
    fn test_redact_multiple_occurrences() {
        let redactor = MessageRedactor::new();
        assert_eq!(
            redactor.redact("a@b.com and c@d.org"),
            "<REDACTED: EMAIL> and <REDACTED: EMAIL>"
        );
    }

    #[test]
    fn test_redact_mixed_categories() {
        let redactor = MessageRedactor::new();
        let redacted =
            redactor.redact("Mail x@y.io, SSN 123-45-6789, card 4111111111111111.");

        assert_eq!(
            redacted,
            "Mail <REDACTED: EMAIL>, SSN <REDACTED: SSN>, card <REDACTED: CREDIT_CARD>."
        );
    }

    // Non-PII inputs must come back byte-identical.
    #[test_case("" ; "empty input")]
    #[test_case("My IP is 127.0.0.1" ; "ip address")]
    #[test_case("Order 12345678 shipped" ; "eight digit number")]
    #[test_case("Reference 123456789012 noted" ; "twelve digit number")]
    #[test_case("Just a plain sentence." ; "plain text")]
    fn test_unchanged(input: &str) {
        let redactor = MessageRedactor::new();
        assert_eq!(redactor.redact(input), input);
    }

    #[test]
    fn test_redact_with_flag() {
        let redactor = MessageRedactor::new();

        let (redacted, was_redacted) = redactor.redact_with_flag("mail me: a@b.com");
        assert!(was_redacted);
        assert_eq!(redacted, "mail me: <REDACTED: EMAIL>");

        let (redacted, was_redacted) = redactor.redact_with_flag("nothing here");
        assert!(!was_redacted);
        assert_eq!(redacted, "nothing here");
    }

    #[test]
    fn test_non_pii_text_is_byte_identical_around_matches() {
        let redactor = MessageRedactor::new();
        let redacted = redactor.redact("prefix test@example.com suffix");

        assert!(redacted.starts_with("prefix "));
        assert!(redacted.ends_with(" suffix"));
    }

    #[test]
    fn test_tagged_text_is_not_rematched() {
        let redactor = MessageRedactor::new();
        let once = redactor.redact("SSN 123-45-6789");
        let twice = redactor.redact(&once);

        assert_eq!(once, twice);
    }
}
