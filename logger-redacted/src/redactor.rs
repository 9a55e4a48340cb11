use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap();
    static ref PHONE_REGEX: Regex =
        Regex::new(r"\b(?:\+1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b")
            .unwrap();
    static ref SSN_REGEX: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap();
    static ref CARD_REGEX: Regex =
        Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap();
    static ref MRN_REGEX: Regex = Regex::new(r"\bMRN[-\s]?\d{5,}\b").unwrap();
}

/// PHI redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    pub redact_cards: bool,
    pub redact_mrn: bool,
    /// Replace with a short hash instead of a mask so redacted values can
    /// still be correlated across log lines.
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_cards: true,
            redact_mrn: true,
            hash_for_correlation: true,
        }
    }
}

/// PHI redactor for log lines
///
/// Billing logs routinely carry patient contact details, record numbers, and
/// card numbers inside free-text notes. Every formatted log line is passed
/// through here before it reaches an appender.
pub struct PhiRedactor {
    config: RedactionConfig,
}

impl PhiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_emails {
            result = self.replace(&EMAIL_REGEX, &result, "EMAIL", "***@***");
        }
        if self.config.redact_phones {
            result = self.replace(&PHONE_REGEX, &result, "PHONE", "(***) ***-****");
        }
        if self.config.redact_ssn {
            result = self.replace(&SSN_REGEX, &result, "SSN", "***-**-****");
        }
        if self.config.redact_cards {
            result = self.replace(&CARD_REGEX, &result, "CARD", "****-****-****-****");
        }
        if self.config.redact_mrn {
            result = self.replace(&MRN_REGEX, &result, "MRN", "MRN******");
        }

        result
    }

    fn replace(&self, pattern: &Regex, text: &str, label: &str, mask: &str) -> String {
        pattern
            .replace_all(text, |caps: &regex::Captures| {
                if self.config.hash_for_correlation {
                    format!("{}[{}]", label, hash_value(&caps[0]))
                } else {
                    mask.to_string()
                }
            })
            .to_string()
    }
}

impl Default for PhiRedactor {
    fn default() -> Self {
        Self::new(RedactionConfig::default())
    }
}

fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    // First 8 bytes keep the correlation token short.
    general_purpose::STANDARD.encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked() -> PhiRedactor {
        PhiRedactor::new(RedactionConfig {
            hash_for_correlation: false,
            ..Default::default()
        })
    }

    #[test]
    fn redacts_email() {
        let redacted = masked().redact("payment receipt sent to john.doe@example.com");
        assert!(!redacted.contains("john.doe@example.com"));
        assert!(redacted.contains("***@***"));
    }

    #[test]
    fn redacts_phone() {
        let redacted = masked().redact("patient callback (555) 123-4567");
        assert!(redacted.contains("(***) ***-****"));
    }

    #[test]
    fn redacts_card_number() {
        let redacted = masked().redact("declined card 4111-1111-1111-1111");
        assert!(!redacted.contains("4111"));
    }

    #[test]
    fn redacts_mrn() {
        let redacted = masked().redact("chart MRN-8812345 flagged for review");
        assert!(!redacted.contains("8812345"));
        assert!(redacted.contains("MRN******"));
    }

    #[test]
    fn hash_mode_is_stable_for_correlation() {
        let redactor = PhiRedactor::default();
        let a = redactor.redact("mail to billing@clinic.org");
        let b = redactor.redact("second mail to billing@clinic.org");
        let token_a = a.split("EMAIL[").nth(1).unwrap();
        let token_b = b.split("EMAIL[").nth(1).unwrap();
        assert_eq!(token_a, token_b);
    }

    #[test]
    fn plain_text_passes_through() {
        let text = "invoice INV-2025-0001 settled";
        assert_eq!(masked().redact(text), text);
    }
}
