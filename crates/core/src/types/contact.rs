//! Contact details: staff email addresses and customer phone numbers.
//!
//! Both types validate on construction and on deserialization, so a value
//! that made it into a request body is already well-formed.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    #[error("email domain cannot be empty")]
    EmptyDomain,
}

/// A staff email address.
///
/// Stored lowercased so the unique index on `users.email` is effectively
/// case-insensitive.
///
/// ```
/// use atelier_core::Email;
///
/// let email = Email::parse(" Tailor@Example.com ").unwrap();
/// assert_eq!(email.as_str(), "tailor@example.com");
/// assert!(Email::parse("no-at-symbol").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email`, trimming surrounding whitespace and lowercasing.
    ///
    /// # Errors
    ///
    /// Returns an [`EmailError`] if the address is empty, too long, or is
    /// not of the form `local@domain`.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let (local, domain) = s.split_once('@').ok_or(EmailError::MissingAtSymbol)?;
        if local.is_empty() {
            return Err(EmailError::EmptyLocalPart);
        }
        if domain.is_empty() {
            return Err(EmailError::EmptyDomain);
        }

        Ok(Self(s.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number cannot be empty")]
    Empty,
    #[error("phone number must be at most {max} characters")]
    TooLong { max: usize },
    #[error("phone number contains invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("phone number must contain at least one digit")]
    NoDigits,
}

/// A customer phone number.
///
/// The phone number is the identity key of a customer: at most one customer
/// exists per number across every shop. Only digits, spaces and `+ - ( )` are
/// accepted; the number is kept as entered (trimmed) so that substring search
/// matches what staff typed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub const MAX_LENGTH: usize = 32;

    /// Parse a `PhoneNumber`.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] if the trimmed input is empty, too long,
    /// contains a character outside the accepted set, or has no digit.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneError::Empty);
        }
        if s.chars().count() > Self::MAX_LENGTH {
            return Err(PhoneError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')')))
        {
            return Err(PhoneError::InvalidCharacter(c));
        }
        if !s.chars().any(|c| c.is_ascii_digit()) {
            return Err(PhoneError::NoDigits);
        }
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// Implements sqlx `TEXT` support for a validated string newtype.
///
/// Values read back from the database are trusted; they were validated on
/// the way in.
#[cfg(feature = "postgres")]
macro_rules! text_column {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                Ok(Self(<String as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

#[cfg(feature = "postgres")]
pub(crate) use text_column;

#[cfg(feature = "postgres")]
text_column!(Email);
#[cfg(feature = "postgres")]
text_column!(PhoneNumber);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalizes_case_and_whitespace() {
        let email = Email::parse("  Ravi.Tailor@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "ravi.tailor@example.com");
    }

    #[test]
    fn test_email_rejects_malformed() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("nobody"), Err(EmailError::MissingAtSymbol));
        assert_eq!(Email::parse("@shop.in"), Err(EmailError::EmptyLocalPart));
        assert_eq!(Email::parse("ravi@"), Err(EmailError::EmptyDomain));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(Email::parse(&long), Err(EmailError::TooLong { .. })));
    }

    #[test]
    fn test_email_deserialize_validates() {
        assert!(serde_json::from_str::<Email>("\"nobody\"").is_err());
        let email: Email = serde_json::from_str("\"A@B.C\"").unwrap();
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"a@b.c\"");
    }

    #[test]
    fn test_phone_accepts_common_formats() {
        for raw in ["555-1", "+91 98765 43210", "(022) 2345-6789", "0"] {
            assert!(PhoneNumber::parse(raw).is_ok(), "{raw}");
        }
        assert_eq!(PhoneNumber::parse(" 555-1 ").unwrap().as_str(), "555-1");
    }

    #[test]
    fn test_phone_rejects_garbage() {
        assert_eq!(PhoneNumber::parse(""), Err(PhoneError::Empty));
        assert_eq!(
            PhoneNumber::parse("555-CALL"),
            Err(PhoneError::InvalidCharacter('C'))
        );
        assert_eq!(PhoneNumber::parse("+-()"), Err(PhoneError::NoDigits));
        assert!(matches!(
            PhoneNumber::parse(&"1".repeat(33)),
            Err(PhoneError::TooLong { max: 32 })
        ));
    }

    #[test]
    fn test_phone_deserialize_validates() {
        assert!(serde_json::from_str::<PhoneNumber>("\"abc\"").is_err());
        let phone: PhoneNumber = serde_json::from_str("\"555-1\"").unwrap();
        assert_eq!(phone.to_string(), "555-1");
    }
}
