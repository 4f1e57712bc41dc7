use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing an e-mail address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address '{0}' is missing the '@' separator")]
    MissingSeparator(String),

    #[error("address '{0}' has an empty local part")]
    EmptyLocalPart(String),

    #[error("address '{0}' has an invalid domain")]
    InvalidDomain(String),
}

/// A validated e-mail address, split into its local part and domain.
///
/// The domain is what the delivery engine resolves MX records for, so it is
/// validated up front rather than at resolution time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    local_part: String,
    domain: String,
}

impl EmailAddress {
    /// The part before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// The part after the `@`, lowercased.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (local_part, domain) = trimmed
            .rsplit_once('@')
            .ok_or_else(|| AddressError::MissingSeparator(trimmed.to_string()))?;

        if local_part.is_empty() || local_part.chars().any(char::is_whitespace) {
            return Err(AddressError::EmptyLocalPart(trimmed.to_string()));
        }

        let domain_valid = !domain.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

        if !domain_valid {
            return Err(AddressError::InvalidDomain(trimmed.to_string()));
        }

        Ok(Self {
            local_part: local_part.to_string(),
            domain: domain.to_ascii_lowercase(),
        })
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn valid_address() {
        let address: EmailAddress = "user@example.com".parse().unwrap();
        assert_eq!(address.local_part(), "user");
        assert_eq!(address.domain(), "example.com");
        assert_eq!(address.to_string(), "user@example.com");
    }

    #[test]
    fn domain_is_lowercased() {
        let address: EmailAddress = "User@Example.COM".parse().unwrap();
        assert_eq!(address.domain(), "example.com");
        assert_eq!(address.local_part(), "User");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let address: EmailAddress = "  user@example.com \r\n".parse().unwrap();
        assert_eq!(address.to_string(), "user@example.com");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("no-separator".parse::<EmailAddress>().is_err());
        assert!("@example.com".parse::<EmailAddress>().is_err());
        assert!("user@".parse::<EmailAddress>().is_err());
        assert!("user@localhost".parse::<EmailAddress>().is_err());
        assert!("user@.example.com".parse::<EmailAddress>().is_err());
        assert!("user@exa mple.com".parse::<EmailAddress>().is_err());
        assert!("us er@example.com".parse::<EmailAddress>().is_err());
    }
}
