//! Stored credential algorithms
//!
//! Subjects keep their passwords as hex-encoded digests (or ciphertexts)
//! tagged with the algorithm that produced them. Connectors declare which
//! algorithm they expect; this module decides whether the two agree and
//! re-encodes the stored value for the target.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};

/// Algorithm a stored credential was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CipherAlgorithm {
    Sha,
    Sha1,
    Sha256,
    Sha512,
    Ssha,
    Ssha1,
    Ssha256,
    Ssha512,
    Smd5,
    Aes,
    Bcrypt,
}

impl CipherAlgorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherAlgorithm::Sha => "SHA",
            CipherAlgorithm::Sha1 => "SHA1",
            CipherAlgorithm::Sha256 => "SHA256",
            CipherAlgorithm::Sha512 => "SHA512",
            CipherAlgorithm::Ssha => "SSHA",
            CipherAlgorithm::Ssha1 => "SSHA1",
            CipherAlgorithm::Ssha256 => "SSHA256",
            CipherAlgorithm::Ssha512 => "SSHA512",
            CipherAlgorithm::Smd5 => "SMD5",
            CipherAlgorithm::Aes => "AES",
            CipherAlgorithm::Bcrypt => "BCRYPT",
        }
    }

    /// Whether the stored value is hex-encoded binary.
    ///
    /// BCRYPT values are kept in their modular crypt format instead.
    #[must_use]
    pub fn is_hex_encoded(&self) -> bool {
        !matches!(self, CipherAlgorithm::Bcrypt)
    }

    /// Whether a connector configured with `connector_algorithm` accepts
    /// credentials produced by this algorithm.
    ///
    /// `SHA` and `SHA1` name the same digest and are treated as equal.
    #[must_use]
    pub fn matches_connector(&self, connector_algorithm: &str) -> bool {
        let Ok(configured) = connector_algorithm.trim().parse::<CipherAlgorithm>() else {
            return false;
        };
        configured == *self
            || matches!(
                (configured, *self),
                (CipherAlgorithm::Sha, CipherAlgorithm::Sha1)
                    | (CipherAlgorithm::Sha1, CipherAlgorithm::Sha)
            )
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "").as_str() {
            "SHA" => Ok(CipherAlgorithm::Sha),
            "SHA1" => Ok(CipherAlgorithm::Sha1),
            "SHA256" => Ok(CipherAlgorithm::Sha256),
            "SHA512" => Ok(CipherAlgorithm::Sha512),
            "SSHA" => Ok(CipherAlgorithm::Ssha),
            "SSHA1" => Ok(CipherAlgorithm::Ssha1),
            "SSHA256" => Ok(CipherAlgorithm::Ssha256),
            "SSHA512" => Ok(CipherAlgorithm::Ssha512),
            "SMD5" => Ok(CipherAlgorithm::Smd5),
            "AES" => Ok(CipherAlgorithm::Aes),
            "BCRYPT" => Ok(CipherAlgorithm::Bcrypt),
            _ => Err(ConnectorError::InvalidConfiguration {
                message: format!("unknown cipher algorithm '{s}'"),
            }),
        }
    }
}

/// Re-encode a hex string as standard base64.
pub fn hex_to_base64(hex_value: &str) -> ConnectorResult<String> {
    let bytes = hex::decode(hex_value.trim().to_lowercase()).map_err(|e| {
        ConnectorError::InvalidData {
            message: format!("stored credential is not valid hex: {e}"),
        }
    })?;
    Ok(STANDARD.encode(bytes))
}

/// Render a stored digest as a directory-style `{alg}base64` password value.
pub fn directory_password_value(
    algorithm: CipherAlgorithm,
    hex_value: &str,
) -> ConnectorResult<String> {
    if !algorithm.is_hex_encoded() {
        return Err(ConnectorError::InvalidData {
            message: format!("{algorithm} credentials cannot be transcoded"),
        });
    }
    let encoded = hex_to_base64(hex_value)?;
    Ok(format!("{{{}}}{encoded}", algorithm.as_str().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha_alias_matches() {
        assert!(CipherAlgorithm::Sha1.matches_connector("SHA"));
        assert!(CipherAlgorithm::Sha.matches_connector("SHA1"));
        assert!(CipherAlgorithm::Sha.matches_connector("sha"));
        assert!(CipherAlgorithm::Sha256.matches_connector("SHA-256"));
    }

    #[test]
    fn test_mismatch() {
        assert!(!CipherAlgorithm::Sha256.matches_connector("SHA"));
        assert!(!CipherAlgorithm::Ssha.matches_connector("SHA"));
        assert!(!CipherAlgorithm::Aes.matches_connector("CLEARTEXT"));
        assert!(!CipherAlgorithm::Sha1.matches_connector(""));
    }

    #[test]
    fn test_hex_to_base64() {
        // "hello" in hex
        assert_eq!(hex_to_base64("68656C6C6F").unwrap(), "aGVsbG8=");
        assert!(hex_to_base64("xyz").is_err());
    }

    #[test]
    fn test_directory_password_value() {
        let value = directory_password_value(CipherAlgorithm::Sha1, "68656c6c6f").unwrap();
        assert_eq!(value, "{sha1}aGVsbG8=");

        assert!(directory_password_value(CipherAlgorithm::Bcrypt, "$2a$10$abc").is_err());
    }
}
