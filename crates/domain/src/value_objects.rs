//! Value objects shared by the catalog and order models.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-unit value.
    pub const fn from_units(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }

    /// Applies a rate expressed in basis points (750 = 7.5%).
    ///
    /// The result is rounded to whole cents, half away from zero.
    pub fn percent_bps(&self, bps: u32) -> Money {
        let scaled = i128::from(self.cents) * i128::from(bps);
        let mut cents = scaled / 10_000;
        let remainder = scaled % 10_000;
        if remainder.abs() * 2 >= 10_000 {
            cents += scaled.signum();
        }
        Money {
            cents: cents as i64,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents - rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A postal address for shipping or billing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
}

impl Address {
    /// Checks that every required field is filled in.
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("fullName", &self.full_name),
            ("phone", &self.phone),
            ("line1", &self.line1),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidAddress(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// Who owns an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Customer {
    /// An authenticated account.
    #[serde(rename_all = "camelCase")]
    User {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    /// A guest checkout identified only by e-mail.
    Guest { email: String },
}

impl Customer {
    /// Returns the contact e-mail, if known.
    pub fn email(&self) -> Option<&str> {
        match self {
            Customer::User { email, .. } => email.as_deref(),
            Customer::Guest { email } => Some(email),
        }
    }

    /// Returns the account id for authenticated customers.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Customer::User { user_id, .. } => Some(user_id),
            Customer::Guest { .. } => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Customer::Guest { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            full_name: "Ada Obi".to_string(),
            phone: "+2348000000000".to_string(),
            line1: "12 Marina Road".to_string(),
            line2: None,
            city: "Ikeja".to_string(),
            state: "Lagos".to_string(),
            postal_code: None,
            country: "NG".to_string(),
        }
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_units(10);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.multiply(3).cents(), 3000);
        assert_eq!(vec![a, b, b].into_iter().sum::<Money>().cents(), 2000);
    }

    #[test]
    fn test_percent_bps_exact() {
        assert_eq!(Money::from_units(2400).percent_bps(750), Money::from_units(180));
    }

    #[test]
    fn test_percent_bps_rounds_half_away_from_zero() {
        // 0.07 * 7.5% = 0.525 cents -> 1 cent
        assert_eq!(Money::from_cents(7).percent_bps(750).cents(), 1);
        // 0.06 * 7.5% = 0.45 cents -> 0 cents
        assert_eq!(Money::from_cents(6).percent_bps(750).cents(), 0);
        // 0.20 * 7.5% = 1.5 cents -> 2 cents
        assert_eq!(Money::from_cents(20).percent_bps(750).cents(), 2);
        assert_eq!(Money::from_cents(-20).percent_bps(750).cents(), -2);
    }

    #[test]
    fn test_money_serializes_as_cents() {
        let json = serde_json::to_string(&Money::from_cents(999)).unwrap();
        assert_eq!(json, "999");
    }

    #[test]
    fn test_address_validation() {
        assert!(address().validate().is_ok());

        let mut incomplete = address();
        incomplete.city = "  ".to_string();
        incomplete.phone.clear();
        let err = incomplete.validate().unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidAddress("missing phone, city".to_string())
        );
    }

    #[test]
    fn test_customer_accessors() {
        let guest = Customer::Guest {
            email: "guest@example.com".to_string(),
        };
        assert!(guest.is_guest());
        assert_eq!(guest.email(), Some("guest@example.com"));
        assert_eq!(guest.user_id(), None);

        let user = Customer::User {
            user_id: "u-1".to_string(),
            email: None,
        };
        assert!(!user.is_guest());
        assert_eq!(user.user_id(), Some("u-1"));
    }
}
