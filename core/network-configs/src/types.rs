use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

pub use primitive_types::U256;

/// Native balance width of the chain.
pub type Balance = U256;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {0:?} must be 40 hexadecimal characters, optionally prefixed with 0x")]
    InvalidLength(String),
    #[error("address {0:?} is not valid hex")]
    InvalidHex(String),
}

/// A 20-byte account address.
///
/// Always rendered in its EIP-55 mixed-case checksum form, which makes the rendered string
/// usable as a normalized map key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Address of the account controlled by an uncompressed secp256k1 public key (64 bytes,
    /// without the `0x04` tag): the last 20 bytes of its Keccak-256 hash.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let hash = Keccak256::digest(public_key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    /// Checks whether `s` looks like an address token, without allocating.
    pub fn is_address_token(s: &str) -> bool {
        let s = strip_hex_prefix(s);
        s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = strip_hex_prefix(s);
        if hex_part.len() != 40 {
            return Err(AddressError::InvalidLength(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());
        f.write_str("0x")?;
        for (i, c) in lower.chars().enumerate() {
            let shift = if i % 2 == 0 { 4 } else { 0 };
            let nibble = (hash[i / 2] >> shift) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                write!(f, "{}", c.to_ascii_uppercase())?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a decimal balance, rejecting anything wider than [`Balance`].
pub fn parse_balance(digits: &str) -> Option<Balance> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_dec_str(digits).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_vectors() {
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let addr: Address = expected.to_lowercase().parse().unwrap();
            assert_eq!(addr.to_string(), expected);
        }
    }

    #[test]
    fn accepts_unprefixed_tokens() {
        let a: Address = "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let b: Address = "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_of_public_key() {
        // Public key of the secret key 1, i.e. the generator point.
        let public_key = hex::decode(
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        assert_eq!(
            Address::from_public_key(&public_key).to_string(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn address_token_agrees_with_parsing() {
        for token in [
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0X5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0x1234",
            "0Xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed",
        ] {
            assert_eq!(Address::is_address_token(token), token.parse::<Address>().is_ok(), "{token}");
        }
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!("0x1234".parse::<Address>(), Err(AddressError::InvalidLength(_))));
        assert!(matches!(
            "0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn balance_width() {
        assert_eq!(parse_balance("1000"), Some(U256::from(1000u64)));
        assert_eq!(parse_balance("12a"), None);
        assert_eq!(parse_balance(""), None);
        let max = U256::MAX.to_string();
        assert_eq!(parse_balance(&max), Some(U256::MAX));
        assert_eq!(parse_balance(&format!("{max}0")), None);
    }
}
