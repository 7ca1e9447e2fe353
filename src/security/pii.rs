//! PII detection.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]
//!
//! Detects the three classes of personally identifiable information the
//! gateway redacts: email addresses, SSN-like digit groups, and credit card
//! numbers. All patterns are word-boundary anchored with bounded quantifiers;
//! the `regex` crate compiles them to finite automata, so matching is linear
//! in input length regardless of input shape.

use regex::Regex;
use std::sync::LazyLock;

/// Category of detected PII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiCategory {
    /// Email address.
    Email,
    /// Social security number (dashed or 9 contiguous digits).
    Ssn,
    /// Credit card number (grouped or contiguous per brand rule).
    CreditCard,
}

impl PiiCategory {
    /// Human-readable category name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Email => "Email Address",
            Self::Ssn => "SSN",
            Self::CreditCard => "Credit Card Number",
        }
    }

    /// The literal replacement tag for this category.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Email => "<REDACTED: EMAIL>",
            Self::Ssn => "<REDACTED: SSN>",
            Self::CreditCard => "<REDACTED: CREDIT_CARD>",
        }
    }
}

/// A detected PII match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiiMatch {
    /// Category of PII detected.
    pub category: PiiCategory,
    /// Start byte position in content.
    pub start: usize,
    /// End byte position in content.
    pub end: usize,
}

// Define regex patterns as separate statics
// Note: These patterns are static and guaranteed to compile, so expect() is safe

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,24}\b")
        .expect("static regex: email pattern")
});

/// Dashed 3-2-4 form or exactly 9 contiguous digits. The word boundaries keep
/// 8-digit numbers and longer digit runs (card numbers, IP octet sequences)
/// out of this class.
static SSN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}-\d{2}-\d{4}\b|\b\d{9}\b").expect("static regex: SSN pattern")
});

/// Four groups of four digits separated by dash or space, or a contiguous
/// 13-16 digit run matching a card brand prefix (Visa, Mastercard, Amex,
/// Discover). A 12-digit ungrouped number matches neither alternative.
static CREDIT_CARD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:\d{4}[- ]){3}\d{4}\b|\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
    )
    .expect("static regex: credit card pattern")
});

/// A redaction rule: one PII category bound to its pattern.
pub(crate) struct RedactionRule {
    pub(crate) category: PiiCategory,
    pub(crate) regex: &'static LazyLock<Regex>,
}

/// Returns the redaction rules in their fixed application order.
///
/// Order matters: SSNs are redacted before credit cards so a 9-digit SSN is
/// never swallowed by the looser card patterns, and emails go first so digit
/// patterns never fire inside an address. Replacement tags contain no digits
/// or `@`, so later rules cannot re-match already-tagged text.
pub(crate) fn redaction_rules() -> [RedactionRule; 3] {
    [
        RedactionRule {
            category: PiiCategory::Email,
            regex: &EMAIL_REGEX,
        },
        RedactionRule {
            category: PiiCategory::Ssn,
            regex: &SSN_REGEX,
        },
        RedactionRule {
            category: PiiCategory::CreditCard,
            regex: &CREDIT_CARD_REGEX,
        },
    ]
}

/// Detector for personally identifiable information.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiiDetector;

impl PiiDetector {
    /// Creates a new PII detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks if content contains PII.
    #[must_use]
    pub fn contains_pii(&self, content: &str) -> bool {
        !self.detect(content).is_empty()
    }

    /// Returns all detected PII matches, sorted by position with overlapping
    /// matches removed (earlier category in the fixed order wins).
    #[must_use]
    pub fn detect(&self, content: &str) -> Vec<PiiMatch> {
        let mut found = Vec::new();

        for rule in &redaction_rules() {
            for m in rule.regex.find_iter(content) {
                found.push(PiiMatch {
                    category: rule.category,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }

        found.sort_by_key(|m| m.start);
        deduplicate_overlapping(found)
    }

    /// Returns the categories of PII detected, in detection order.
    #[must_use]
    pub fn detect_categories(&self, content: &str) -> Vec<PiiCategory> {
        self.detect(content)
            .into_iter()
            .map(|m| m.category)
            .collect()
    }
}

/// Removes overlapping matches, keeping the first occurrence.
fn deduplicate_overlapping(sorted_matches: Vec<PiiMatch>) -> Vec<PiiMatch> {
    let mut result: Vec<PiiMatch> = Vec::new();
    let mut last_end = 0;

    for m in sorted_matches {
        if m.start >= last_end {
            last_end = m.end;
            result.push(m);
        }
    }

    result
}
