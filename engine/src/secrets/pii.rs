//! Personal and case-sensitive data scrubbing for user queries.
//!
//! Queries are sent to a hosted model and persisted with the session, so
//! when `[privacy] scrub_queries` is on, the orchestrator passes each query
//! through [`PiiScrubber`] first. Two pattern families are covered:
//!
//! - Personal data: SSNs, card numbers, email addresses, IP addresses,
//!   dates of birth, phone numbers, driver's licence numbers
//! - Legal matter data: case and docket numbers, bar numbers, settlement
//!   amounts, client names, court names, attorney names
//!
//! Patterns run in a fixed order, most specific first, so a card number is
//! never half-eaten by the phone pattern.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// What replaces a detected item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrubMode {
    /// A typed placeholder such as `[EMAIL]`
    #[default]
    Replace,
    /// `[REDACTED]` for every kind
    Redact,
    /// Nothing
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiKind {
    Ssn,
    CreditCard,
    Email,
    IpAddress,
    DateOfBirth,
    Phone,
    DriversLicense,
    CaseNumber,
    BarNumber,
    SettlementAmount,
    ClientReference,
    CourtReference,
    AttorneyName,
}

impl PiiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::Email => "email",
            Self::IpAddress => "ip_address",
            Self::DateOfBirth => "date_of_birth",
            Self::Phone => "phone",
            Self::DriversLicense => "drivers_license",
            Self::CaseNumber => "case_number",
            Self::BarNumber => "bar_number",
            Self::SettlementAmount => "settlement_amount",
            Self::ClientReference => "client_reference",
            Self::CourtReference => "court_reference",
            Self::AttorneyName => "attorney_name",
        }
    }

    /// Placeholder used in [`ScrubMode::Replace`]
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Ssn => "[SSN]",
            Self::CreditCard => "[CREDIT CARD]",
            Self::Email => "[EMAIL]",
            Self::IpAddress => "[IP ADDRESS]",
            Self::DateOfBirth => "[DATE OF BIRTH]",
            Self::Phone => "[PHONE]",
            Self::DriversLicense => "[DRIVER LICENSE]",
            Self::CaseNumber => "[CASE NUMBER]",
            Self::BarNumber => "[BAR NUMBER]",
            Self::SettlementAmount => "[SETTLEMENT AMOUNT]",
            Self::ClientReference => "[CLIENT NAME]",
            Self::CourtReference => "[COURT NAME]",
            Self::AttorneyName => "[ATTORNEY NAME]",
        }
    }

    /// True for legal matter data rather than general personal data
    pub fn is_legal(&self) -> bool {
        matches!(
            self,
            Self::CaseNumber
                | Self::BarNumber
                | Self::SettlementAmount
                | Self::ClientReference
                | Self::CourtReference
                | Self::AttorneyName
        )
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PII_PATTERNS: OnceLock<Vec<(PiiKind, Regex)>> = OnceLock::new();

fn pii_patterns() -> &'static [(PiiKind, Regex)] {
    PII_PATTERNS.get_or_init(|| {
        let table: [(PiiKind, &str); 16] = [
            // Legal matter data first: its patterns carry numbers the
            // personal-data patterns would otherwise split up
            (
                PiiKind::CaseNumber,
                r"(?i)\b(?:case|docket)\s*(?:no\.?|number|#)\s*[:\-]?\s*\d[\w:]*(?:[-/][\w:]+)*",
            ),
            (
                PiiKind::BarNumber,
                r"(?i)\bbar\s*(?:no\.?|number|#)\s*[:\-]?\s*\d{4,}\b",
            ),
            (
                PiiKind::SettlementAmount,
                r"(?i)\$\d{1,3}(?:,\d{3})*(?:\.\d{2})?\s*(?:settlement|damages|award)",
            ),
            (
                PiiKind::ClientReference,
                r"\b(?i:my|our|the)\s+(?i:client)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*",
            ),
            (
                PiiKind::CourtReference,
                r"\b[A-Z][a-z]*\s+(?:District|Superior|Circuit|County)\s+Court\b",
            ),
            (
                PiiKind::AttorneyName,
                r"\b(?:Attorney for|Counsel for|Representing)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*",
            ),
            (
                PiiKind::CreditCard,
                r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b",
            ),
            (PiiKind::Ssn, r"\b\d{3}[-\s]\d{2}[-\s]\d{4}\b"),
            (PiiKind::Ssn, r"\b\d{9}\b"),
            (
                PiiKind::Email,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            (PiiKind::IpAddress, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
            (PiiKind::DateOfBirth, r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b"),
            (PiiKind::DateOfBirth, r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b"),
            (
                PiiKind::Phone,
                r"\+\d{1,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}",
            ),
            (
                PiiKind::Phone,
                r"\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            ),
            (PiiKind::DriversLicense, r"\b[A-Z]\d{7,8}\b"),
        ];

        table
            .iter()
            .map(|(kind, pattern)| {
                (
                    *kind,
                    Regex::new(pattern).expect("Invalid PII pattern"),
                )
            })
            .collect()
    })
}

/// Result of one scrub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubReport {
    pub text: String,
    /// One entry per scrubbed item, in pattern order
    pub detected: Vec<PiiKind>,
}

impl ScrubReport {
    pub fn is_clean(&self) -> bool {
        self.detected.is_empty()
    }

    /// Distinct kinds found, comma separated, for audit logging
    pub fn kinds(&self) -> String {
        let mut kinds: Vec<&str> = Vec::new();
        for kind in &self.detected {
            if !kinds.contains(&kind.as_str()) {
                kinds.push(kind.as_str());
            }
        }
        kinds.join(", ")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PiiScrubber {
    mode: ScrubMode,
}

impl PiiScrubber {
    pub fn new(mode: ScrubMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ScrubMode {
        self.mode
    }

    /// Replace every detected item in `text` according to the mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use legal_mind_engine::secrets::{PiiKind, PiiScrubber, ScrubMode};
    ///
    /// let report = PiiScrubber::new(ScrubMode::Replace).scrub("Email jane@example.com today");
    /// assert_eq!(report.text, "Email [EMAIL] today");
    /// assert_eq!(report.detected, vec![PiiKind::Email]);
    /// ```
    pub fn scrub(&self, text: &str) -> ScrubReport {
        let mut result = text.to_string();
        let mut detected = Vec::new();

        for (kind, pattern) in pii_patterns() {
            let hits = pattern.find_iter(&result).count();
            if hits == 0 {
                continue;
            }
            detected.extend(std::iter::repeat(*kind).take(hits));

            let replacement = match self.mode {
                ScrubMode::Replace => kind.placeholder(),
                ScrubMode::Redact => "[REDACTED]",
                ScrubMode::Remove => "",
            };
            result = pattern
                .replace_all(&result, regex::NoExpand(replacement))
                .into_owned();
        }

        ScrubReport {
            text: result,
            detected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replace(text: &str) -> ScrubReport {
        PiiScrubber::new(ScrubMode::Replace).scrub(text)
    }

    #[test]
    fn test_ssn_formats() {
        let report = replace("SSN 123-45-6789, alt 123 45 6789, raw 123456789");
        assert_eq!(report.text, "SSN [SSN], alt [SSN], raw [SSN]");
        assert_eq!(report.detected, vec![PiiKind::Ssn; 3]);
    }

    #[test]
    fn test_email_address() {
        let report = replace("Reach counsel at jane.doe+legal@firm.co.uk please");
        assert_eq!(report.text, "Reach counsel at [EMAIL] please");
    }

    #[test]
    fn test_phone_numbers() {
        assert_eq!(replace("Call (555) 123-4567").text, "Call [PHONE]");
        assert_eq!(replace("Call 555.123.4567 now").text, "Call [PHONE] now");
        assert_eq!(replace("Office +44 20 7946 0958").text, "Office [PHONE]");
    }

    #[test]
    fn test_credit_card_is_not_split_into_phone_numbers() {
        let report = replace("Card 4111 1111 1111 1111 was charged");
        assert_eq!(report.text, "Card [CREDIT CARD] was charged");
        assert_eq!(report.detected, vec![PiiKind::CreditCard]);
    }

    #[test]
    fn test_ip_and_dates_and_licence() {
        let report = replace("Login from 192.168.1.20, born 03/15/1985, licence D1234567");
        assert_eq!(
            report.text,
            "Login from [IP ADDRESS], born [DATE OF BIRTH], licence [DRIVER LICENSE]"
        );
        assert_eq!(replace("DOB 1985-03-15").text, "DOB [DATE OF BIRTH]");
    }

    #[test]
    fn test_case_and_docket_numbers() {
        assert_eq!(
            replace("See Case No. 2:21-cv-01234 for details").text,
            "See [CASE NUMBER] for details"
        );
        assert_eq!(replace("docket #98765").text, "[CASE NUMBER]");
        // "case law" carries no number
        assert!(replace("What does case law say?").is_clean());
    }

    #[test]
    fn test_bar_number_and_settlement() {
        assert_eq!(replace("Bar No. 123456").text, "[BAR NUMBER]");
        assert_eq!(
            replace("They offered $250,000.00 settlement").text,
            "They offered [SETTLEMENT AMOUNT]"
        );
    }

    #[test]
    fn test_client_court_and_attorney_names() {
        assert_eq!(
            replace("Can my client John Smith appeal?").text,
            "Can [CLIENT NAME] appeal?"
        );
        assert_eq!(
            replace("Filed in Northern District Court yesterday").text,
            "Filed in [COURT NAME] yesterday"
        );
        assert_eq!(
            replace("Signed, Attorney for Acme Holdings").text,
            "Signed, [ATTORNEY NAME]"
        );
        // Lower-case words are not names
        assert!(replace("my client is worried").is_clean());
    }

    #[test]
    fn test_modes() {
        let text = "Mail jane@example.com";
        assert_eq!(
            PiiScrubber::new(ScrubMode::Redact).scrub(text).text,
            "Mail [REDACTED]"
        );
        assert_eq!(PiiScrubber::new(ScrubMode::Remove).scrub(text).text, "Mail ");
    }

    #[test]
    fn test_plain_legal_question_is_untouched() {
        let text = "Compare GDPR Article 6 and the EU AI Act for a SaaS company";
        let report = replace(text);
        assert!(report.is_clean());
        assert_eq!(report.text, text);
    }

    #[test]
    fn test_report_kinds_are_distinct() {
        let report = replace("a@b.io and c@d.io, SSN 123-45-6789");
        assert_eq!(report.detected.len(), 3);
        assert_eq!(report.kinds(), "ssn, email");
    }

    #[test]
    fn test_kind_families() {
        assert!(PiiKind::CaseNumber.is_legal());
        assert!(!PiiKind::Email.is_legal());
    }
}
