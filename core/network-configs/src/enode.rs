//! Peer identifiers of the form `enode://<node-id>@<ip>:<port>[?<query>]`.
use crate::types::Address;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

const SCHEME: &str = "enode://";
/// Length of the hex-encoded uncompressed secp256k1 public key.
const NODE_ID_HEX_LEN: usize = 128;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnodeError {
    #[error("peer identifier {0:?} does not start with {SCHEME}")]
    MissingScheme(String),
    #[error("peer identifier {0:?} has no '@' separating node id and endpoint")]
    MissingEndpoint(String),
    #[error("peer identifier {0:?} has a malformed node id")]
    InvalidNodeId(String),
    #[error("peer identifier {0:?} has a malformed address")]
    InvalidAddress(String),
    #[error("peer identifier {0:?} has a malformed port")]
    InvalidPort(String),
}

/// Structured peer identifier.
///
/// Only the endpoint is ever rewritten; the node id is carried through untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enode {
    node_id: String,
    pub ip: IpAddr,
    pub port: u16,
    pub query: Option<String>,
}

impl Enode {
    /// Peer identifier of the node with public key `node_id` (hex, no `0x`), reachable at
    /// `ip:port`.
    pub fn new(
        node_id: &str,
        ip: IpAddr,
        port: u16,
        query: Option<String>,
    ) -> Result<Self, EnodeError> {
        if !is_node_id(node_id) {
            return Err(EnodeError::InvalidNodeId(node_id.to_string()));
        }
        Ok(Enode { node_id: node_id.to_ascii_lowercase(), ip, port, query })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Address derived from the node's public key, which is how the consensus engine names
    /// the node.
    pub fn node_address(&self) -> Address {
        // Checked to be hex on construction.
        let public_key = hex::decode(&self.node_id).unwrap_or_default();
        Address::from_public_key(&public_key)
    }

    /// Same identity, reachable at a different endpoint.
    pub fn with_endpoint(&self, ip: IpAddr, port: u16) -> Enode {
        Enode { node_id: self.node_id.clone(), ip, port, query: self.query.clone() }
    }
}

impl FromStr for Enode {
    type Err = EnodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(SCHEME).ok_or_else(|| EnodeError::MissingScheme(s.into()))?;
        let (node_id, endpoint) =
            rest.split_once('@').ok_or_else(|| EnodeError::MissingEndpoint(s.into()))?;
        if !is_node_id(node_id) {
            return Err(EnodeError::InvalidNodeId(s.into()));
        }
        let (host_port, query) = match endpoint.split_once('?') {
            Some((host_port, query)) => (host_port, Some(query.to_string())),
            None => (endpoint, None),
        };
        let (host, port) =
            host_port.rsplit_once(':').ok_or_else(|| EnodeError::InvalidPort(s.into()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let ip = host.parse().map_err(|_| EnodeError::InvalidAddress(s.into()))?;
        let port = port.parse().map_err(|_| EnodeError::InvalidPort(s.into()))?;
        Ok(Enode { node_id: node_id.to_string(), ip, port, query })
    }
}

fn is_node_id(s: &str) -> bool {
    s.len() == NODE_ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl fmt::Display for Enode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}@", self.node_id)?;
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{ip}")?,
            IpAddr::V6(ip) => write!(f, "[{ip}]")?,
        }
        write!(f, ":{}", self.port)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_id(fill: char) -> String {
        std::iter::repeat(fill).take(NODE_ID_HEX_LEN).collect()
    }

    #[test]
    fn rewrite_keeps_node_id_and_query() {
        let raw = format!("enode://{}@0.0.0.0:30303?discport=0", node_id('a'));
        let enode: Enode = raw.parse().unwrap();
        assert_eq!(enode.to_string(), raw);

        let moved = enode.with_endpoint("10.0.0.4".parse().unwrap(), 30305);
        assert_eq!(moved.to_string(), format!("enode://{}@10.0.0.4:30305?discport=0", node_id('a')));
        assert_eq!(moved.node_id(), enode.node_id());
    }

    #[test]
    fn node_id_containing_port_digits_is_untouched() {
        // A naive substring replace of "30303" would corrupt this id.
        let id = format!("30303{}", &node_id('0')[5..]);
        let enode: Enode = format!("enode://{id}@0.0.0.0:30303").parse().unwrap();
        let moved = enode.with_endpoint("172.16.0.2".parse().unwrap(), 21000);
        assert_eq!(moved.to_string(), format!("enode://{id}@172.16.0.2:21000"));
    }

    #[test]
    fn built_from_public_key() {
        let public_key = "79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798\
                          483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8";
        let enode =
            Enode::new(public_key, "172.16.239.100".parse().unwrap(), 30303, Some("discport=0".into()))
                .unwrap();
        assert_eq!(enode.to_string(), format!("enode://{}@172.16.239.100:30303?discport=0", public_key.to_lowercase()));
        assert_eq!(enode.node_address().to_string(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
        assert!(matches!(
            Enode::new("abc", "127.0.0.1".parse().unwrap(), 1, None),
            Err(EnodeError::InvalidNodeId(_))
        ));
    }

    #[test]
    fn malformed() {
        assert_eq!(
            "http://x".parse::<Enode>(),
            Err(EnodeError::MissingScheme("http://x".into()))
        );
        assert!(matches!("enode://abc@1.2.3.4:1".parse::<Enode>(), Err(EnodeError::InvalidNodeId(_))));
        let no_port = format!("enode://{}@1.2.3.4", node_id('b'));
        assert!(matches!(no_port.parse::<Enode>(), Err(EnodeError::InvalidPort(_))));
        let bad_ip = format!("enode://{}@host:1", node_id('b'));
        assert!(matches!(bad_ip.parse::<Enode>(), Err(EnodeError::InvalidAddress(_))));
    }
}
