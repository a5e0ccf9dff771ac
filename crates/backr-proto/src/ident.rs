//! User identifiers: the 5-digit username and the 8-character password.

use crate::ProtoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A username: exactly 5 ASCII decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Username {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 5 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_owned()))
        } else {
            Err(ProtoError::Malformed("username"))
        }
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A password: exactly 8 ASCII alphanumeric characters. Set once at first
/// authentication and never rotated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Password {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 8 && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(s.to_owned()))
        } else {
            Err(ProtoError::Malformed("password"))
        }
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_must_be_five_digits() {
        assert!("12345".parse::<Username>().is_ok());
        assert!("1234".parse::<Username>().is_err());
        assert!("123456".parse::<Username>().is_err());
        assert!("12a45".parse::<Username>().is_err());
        assert!("".parse::<Username>().is_err());
    }

    #[test]
    fn password_must_be_eight_alphanumerics() {
        assert!("abcd1234".parse::<Password>().is_ok());
        assert!("ABCDEFGH".parse::<Password>().is_ok());
        assert!("abc123".parse::<Password>().is_err());
        assert!("abcd12345".parse::<Password>().is_err());
        assert!("abcd 234".parse::<Password>().is_err());
        assert!("abcd12_4".parse::<Password>().is_err());
    }
}
