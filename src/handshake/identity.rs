//! Identity and code handle value types.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::error::HandshakeError;

static E164: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").ok());

fn valid_e164(phone: &str) -> bool {
    E164.as_ref().is_some_and(|re| re.is_match(phone))
}

/// A normalized phone number in E.164 form, the key of every store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Normalize and validate a phone number.
    ///
    /// Spaces, dashes, dots and parentheses are stripped and a leading `00`
    /// international prefix becomes `+`.
    ///
    /// # Errors
    /// Returns `HandshakeError::InvalidIdentity` if the result is not E.164.
    pub fn parse(raw: &str) -> Result<Self, HandshakeError> {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();

        let normalized = match compact.strip_prefix("00") {
            Some(rest) => format!("+{rest}"),
            None => compact,
        };

        if valid_e164(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(HandshakeError::InvalidIdentity(raw.trim().to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = HandshakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

/// Opaque provider token binding a verification to the code request that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeHandle(String);

impl CodeHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_formatting() {
        let identity = Identity::parse(" +1 (555) 123-0000 ").unwrap();
        assert_eq!(identity.as_str(), "+15551230000");
    }

    #[test]
    fn parse_rewrites_international_prefix() {
        let identity = Identity::parse("0044 20.7946.0000").unwrap();
        assert_eq!(identity.as_str(), "+442079460000");
    }

    #[test]
    fn e164_pattern_is_compiled_once() {
        let first = E164.as_ref().unwrap();
        assert!(first.is_match("+15551230000"));
        assert!(std::ptr::eq(first, E164.as_ref().unwrap()));
    }

    #[test]
    fn parse_rejects_garbage() {
        for raw in ["", "12ab", "5551230000", "+0123456789", "+1234", "+1234567890123456"] {
            assert!(
                matches!(Identity::parse(raw), Err(HandshakeError::InvalidIdentity(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn identity_deserializes_through_parse() {
        let identity: Identity = serde_json::from_str("\"+1 555 123 0000\"").unwrap();
        assert_eq!(identity.to_string(), "+15551230000");
        assert!(serde_json::from_str::<Identity>("\"nope\"").is_err());
    }
}
