//! # Identifiers
//!
//! Every registrant is addressed by the MD5 digest of the decimal text of their
//! government ID. The digest is stable across restarts (no seed), so a ticket
//! printed today still resolves after a redeploy.
//!
//! The lowercase hex form is public: it ends up inside the QR code and in the
//! `/users/{identifier}` path. It carries nothing but the digest.
use std::{fmt, str::FromStr};

use md5::{Digest, Md5};
use thiserror::Error;

pub const IDENTIFIER_LEN: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier must be {expected} hex characters, got {0}", expected = IDENTIFIER_LEN * 2)]
    Length(usize),

    #[error("identifier is not valid hex")]
    Hex,
}

impl Identifier {
    pub fn from_government_id(government_id: u64) -> Self {
        let digest = Md5::digest(government_id.to_string().as_bytes());

        Self(digest.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; IDENTIFIER_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != IDENTIFIER_LEN * 2 {
            return Err(IdentifierError::Length(s.len()));
        }

        let mut bytes = [0u8; IDENTIFIER_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| IdentifierError::Hex)?;

        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let id = Identifier::from_government_id(12345);
        assert_eq!(id.to_string(), "827ccb0eea8a706c4c34a16891f84e7b");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            Identifier::from_government_id(99999),
            Identifier::from_government_id(99999)
        );
        assert_ne!(
            Identifier::from_government_id(12345),
            Identifier::from_government_id(12346)
        );
    }

    #[test]
    fn test_parse_display() {
        let id = Identifier::from_government_id(1_023_456_789);
        let parsed: Identifier = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let upper: Identifier = id.to_string().to_uppercase().parse().unwrap();
        assert_eq!(upper, id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("abc".parse::<Identifier>(), Err(IdentifierError::Length(3)));
        assert_eq!(
            "zz7ccb0eea8a706c4c34a16891f84e7b".parse::<Identifier>(),
            Err(IdentifierError::Hex)
        );
    }

    #[test]
    fn test_from_slice() {
        let id = Identifier::from_government_id(7);
        assert_eq!(Identifier::from_slice(id.as_bytes()), Some(id));
        assert_eq!(Identifier::from_slice(&[0u8; 15]), None);
    }
}
