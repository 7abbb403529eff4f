//! Human-readable order numbers and payment references.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Order number of the form `ORD-YYYYMMDD-XXXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Draws a new candidate for the given day. Uniqueness is checked by the caller.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("ORD-{}-{suffix}", now.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// New reference handed to the payment gateway for correlation.
pub fn new_payment_reference() -> String {
    format!("PAY-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_order_number_format() {
        let day = Utc.with_ymd_and_hms(2026, 3, 9, 14, 30, 0).unwrap();
        let number = OrderNumber::generate(day);
        let s = number.as_str();

        assert_eq!(s.len(), "ORD-20260309-XXXXXX".len());
        assert!(s.starts_with("ORD-20260309-"));
        assert!(
            s[13..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn test_payment_reference_is_unique() {
        let a = new_payment_reference();
        let b = new_payment_reference();
        assert!(a.starts_with("PAY-"));
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }
}
